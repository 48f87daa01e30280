//! Parquet persistence of the historical table.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, Float64Array, Float64Builder, StringArray, StringBuilder, UInt32Array,
    UInt32Builder,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::info;

use crate::error::StorageError;
use crate::models::{Edition, NormalizedRecord};
use crate::table::{HistoricalRecord, HistoricalTable, LagFeatures, HISTORICAL_COLUMNS};

/// Build the Arrow schema of the historical table.
fn build_schema() -> Schema {
    let fields = HISTORICAL_COLUMNS
        .iter()
        .map(|&name| {
            let (data_type, nullable) = match name {
                "edicao" | "chave_curso" => (DataType::Utf8, false),
                "qt_vagas_concorrencia"
                | "qt_inscricao"
                | "vagas_edicao_anterior"
                | "inscritos_edicao_anterior" => (DataType::UInt32, true),
                "nu_notacorte" | "tendencia_nota" | "demanda_anterior" => {
                    (DataType::Float64, false)
                }
                "nota_edicao_anterior" => (DataType::Float64, true),
                _ => (DataType::Utf8, true),
            };
            Field::new(name, data_type, nullable)
        })
        .collect::<Vec<_>>();

    Schema::new(fields)
}

fn text_column<'a>(
    table: &'a HistoricalTable,
    get: impl Fn(&'a HistoricalRecord) -> Option<&'a str>,
) -> ArrayRef {
    let mut builder = StringBuilder::new();
    for record in table.iter() {
        builder.append_option(get(record));
    }
    Arc::new(builder.finish())
}

fn count_column(
    table: &HistoricalTable,
    get: impl Fn(&HistoricalRecord) -> Option<u32>,
) -> ArrayRef {
    let mut builder = UInt32Builder::with_capacity(table.len());
    for record in table.iter() {
        builder.append_option(get(record));
    }
    Arc::new(builder.finish())
}

fn float_column(
    table: &HistoricalTable,
    get: impl Fn(&HistoricalRecord) -> Option<f64>,
) -> ArrayRef {
    let mut builder = Float64Builder::with_capacity(table.len());
    for record in table.iter() {
        builder.append_option(get(record));
    }
    Arc::new(builder.finish())
}

fn build_record_batch(table: &HistoricalTable, schema: Arc<Schema>) -> Result<RecordBatch, StorageError> {
    let mut editions = StringBuilder::new();
    for record in table.iter() {
        editions.append_value(record.record.edicao.to_string());
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(editions.finish()),
        text_column(table, |r| r.record.co_ies.as_deref()),
        text_column(table, |r| r.record.no_ies.as_deref()),
        text_column(table, |r| r.record.sg_ies.as_deref()),
        text_column(table, |r| r.record.no_campus.as_deref()),
        text_column(table, |r| r.record.co_curso.as_deref()),
        text_column(table, |r| r.record.no_curso.as_deref()),
        text_column(table, |r| r.record.ds_grau.as_deref()),
        text_column(table, |r| r.record.ds_turno.as_deref()),
        text_column(table, |r| r.record.ds_mod_concorrencia.as_deref()),
        count_column(table, |r| r.record.qt_vagas_concorrencia),
        count_column(table, |r| r.record.qt_inscricao),
        float_column(table, |r| Some(r.record.nu_notacorte)),
        text_column(table, |r| Some(r.chave_curso.as_str())),
        float_column(table, |r| r.lags.nota_edicao_anterior),
        count_column(table, |r| r.lags.vagas_edicao_anterior),
        float_column(table, |r| Some(r.lags.tendencia_nota)),
        count_column(table, |r| r.lags.inscritos_edicao_anterior),
        float_column(table, |r| Some(r.lags.demanda_anterior)),
    ];

    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Write the historical table, replacing any previous file.
pub fn write_historical_table<P: AsRef<Path>>(
    table: &HistoricalTable,
    path: P,
) -> Result<(), StorageError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let schema = Arc::new(build_schema());
    let batch = build_record_batch(table, schema.clone())?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    info!(path = %path.display(), rows = table.len(), "historical table written");
    Ok(())
}

fn column<'a, T: 'static>(
    batch: &'a RecordBatch,
    name: &str,
    expected: &'static str,
) -> Result<&'a T, StorageError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| StorageError::MissingColumn(name.to_string()))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| StorageError::ColumnType {
            column: name.to_string(),
            expected,
        })
}

struct BatchColumns<'a> {
    text: Vec<&'a StringArray>,
    counts: Vec<&'a UInt32Array>,
    floats: Vec<&'a Float64Array>,
}

const TEXT_COLUMNS: &[&str] = &[
    "edicao",
    "co_ies",
    "no_ies",
    "sg_ies",
    "no_campus",
    "co_curso",
    "no_curso",
    "ds_grau",
    "ds_turno",
    "ds_mod_concorrencia",
    "chave_curso",
];

const COUNT_COLUMNS: &[&str] = &[
    "qt_vagas_concorrencia",
    "qt_inscricao",
    "vagas_edicao_anterior",
    "inscritos_edicao_anterior",
];

const FLOAT_COLUMNS: &[&str] = &[
    "nu_notacorte",
    "nota_edicao_anterior",
    "tendencia_nota",
    "demanda_anterior",
];

impl<'a> BatchColumns<'a> {
    fn locate(batch: &'a RecordBatch) -> Result<Self, StorageError> {
        Ok(Self {
            text: TEXT_COLUMNS
                .iter()
                .map(|name| column::<StringArray>(batch, name, "Utf8"))
                .collect::<Result<_, _>>()?,
            counts: COUNT_COLUMNS
                .iter()
                .map(|name| column::<UInt32Array>(batch, name, "UInt32"))
                .collect::<Result<_, _>>()?,
            floats: FLOAT_COLUMNS
                .iter()
                .map(|name| column::<Float64Array>(batch, name, "Float64"))
                .collect::<Result<_, _>>()?,
        })
    }

    fn text(&self, column: usize, row: usize) -> Option<String> {
        let array = self.text[column];
        (!array.is_null(row)).then(|| array.value(row).to_string())
    }

    fn count(&self, column: usize, row: usize) -> Option<u32> {
        let array = self.counts[column];
        (!array.is_null(row)).then(|| array.value(row))
    }

    fn float(&self, column: usize, row: usize) -> Option<f64> {
        let array = self.floats[column];
        (!array.is_null(row)).then(|| array.value(row))
    }

    fn record(&self, row: usize) -> HistoricalRecord {
        let record = NormalizedRecord {
            edicao: Edition::parse(&self.text(0, row).unwrap_or_default()),
            co_ies: self.text(1, row),
            no_ies: self.text(2, row),
            sg_ies: self.text(3, row),
            no_campus: self.text(4, row),
            co_curso: self.text(5, row),
            no_curso: self.text(6, row),
            ds_grau: self.text(7, row),
            ds_turno: self.text(8, row),
            ds_mod_concorrencia: self.text(9, row),
            qt_vagas_concorrencia: self.count(0, row),
            qt_inscricao: self.count(1, row),
            nu_notacorte: self.float(0, row).unwrap_or(f64::NAN),
        };

        HistoricalRecord {
            chave_curso: self.text(10, row).unwrap_or_default(),
            record,
            lags: LagFeatures {
                nota_edicao_anterior: self.float(1, row),
                vagas_edicao_anterior: self.count(2, row),
                tendencia_nota: self.float(2, row).unwrap_or(0.0),
                inscritos_edicao_anterior: self.count(3, row),
                demanda_anterior: self.float(3, row).unwrap_or(0.0),
            },
        }
    }
}

/// Load a historical table written by [`write_historical_table`].
pub fn read_historical_table<P: AsRef<Path>>(path: P) -> Result<HistoricalTable, StorageError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch?;
        let columns = BatchColumns::locate(&batch)?;
        records.extend((0..batch.num_rows()).map(|row| columns.record(row)));
    }

    info!(path = %path.display(), rows = records.len(), "historical table loaded");
    Ok(HistoricalTable::new(records))
}
