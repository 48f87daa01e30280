use crate::error::SchemaError;
use crate::models::{normalize_identity, Edition, NormalizedRecord};
use crate::schema::{self, MappedSheet};
use crate::source::{Cell, RawSheet};
use tracing::{debug, warn};

pub const SCORE_COLUMN: &str = "nu_notacorte";
pub const SEATS_COLUMN: &str = "qt_vagas_concorrencia";

/// How many rejected rows are kept verbatim in a report.
const REJECTION_SAMPLE_SIZE: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    /// 1-based line in the source sheet, header included.
    pub line: usize,
    pub edition: String,
    pub raw_score: String,
}

/// Rows excluded because their cut-off score is not numeric.
#[derive(Debug, Clone, Default)]
pub struct RejectionReport {
    pub count: usize,
    pub samples: Vec<RejectedRow>,
}

impl RejectionReport {
    fn record(&mut self, row: RejectedRow) {
        self.count += 1;
        if self.samples.len() < REJECTION_SAMPLE_SIZE {
            self.samples.push(row);
        }
    }
}

/// Output of normalizing one source sheet.
#[derive(Debug, Clone, Default)]
pub struct NormalizedSheet {
    pub mapping_version: u32,
    pub rows_read: usize,
    pub records: Vec<NormalizedRecord>,
    pub rejected: RejectionReport,
}

/// Column positions of one mapped sheet.
struct Columns {
    edicao: Option<usize>,
    co_ies: Option<usize>,
    no_ies: Option<usize>,
    sg_ies: Option<usize>,
    no_campus: Option<usize>,
    co_curso: Option<usize>,
    no_curso: Option<usize>,
    ds_grau: Option<usize>,
    ds_turno: Option<usize>,
    ds_mod_concorrencia: Option<usize>,
    qt_vagas_concorrencia: usize,
    qt_inscricao: Option<usize>,
    nu_notacorte: usize,
}

impl Columns {
    fn locate(sheet: &MappedSheet) -> Result<Self, SchemaError> {
        Ok(Self {
            edicao: sheet.column("edicao"),
            co_ies: sheet.column("co_ies"),
            no_ies: sheet.column("no_ies"),
            sg_ies: sheet.column("sg_ies"),
            no_campus: sheet.column("no_campus"),
            co_curso: sheet.column("co_curso"),
            no_curso: sheet.column("no_curso"),
            ds_grau: sheet.column("ds_grau"),
            ds_turno: sheet.column("ds_turno"),
            ds_mod_concorrencia: sheet.column("ds_mod_concorrencia"),
            qt_vagas_concorrencia: sheet
                .column(SEATS_COLUMN)
                .ok_or(SchemaError::MissingColumn(SEATS_COLUMN))?,
            qt_inscricao: sheet.column("qt_inscricao"),
            nu_notacorte: sheet
                .column(SCORE_COLUMN)
                .ok_or(SchemaError::MissingColumn(SCORE_COLUMN))?,
        })
    }
}

fn cell(row: &[Cell], idx: Option<usize>) -> Option<&Cell> {
    idx.and_then(|i| row.get(i))
}

fn text(row: &[Cell], idx: Option<usize>) -> Option<String> {
    cell(row, idx).and_then(Cell::as_text).map(|t| t.trim().to_string())
}

fn identity(row: &[Cell], idx: Option<usize>) -> Option<String> {
    cell(row, idx)
        .and_then(Cell::as_text)
        .map(|t| normalize_identity(&t))
}

/// Cleans one source sheet into normalized records.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowNormalizer;

impl RowNormalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, sheet: RawSheet, source: &str) -> Result<NormalizedSheet, SchemaError> {
        // Step 1: map the detected layout onto canonical column names
        let mapping = schema::detect(&sheet.headers)?;
        debug!(
            source,
            version = mapping.version,
            shape = ?mapping.shape,
            "detected source layout"
        );
        let mapped = mapping.apply(sheet)?;

        // Step 2: score and seat columns must exist somewhere in the sheet
        let columns = Columns::locate(&mapped)?;

        // Step 3: build records, excluding rows whose score is not numeric
        let mut records = Vec::with_capacity(mapped.rows.len());
        let mut rejected = RejectionReport::default();

        for (idx, row) in mapped.rows.iter().enumerate() {
            let edition_text = text(row, columns.edicao).unwrap_or_default();

            let score_cell = row.get(columns.nu_notacorte).unwrap_or(&Cell::Empty);
            let Some(nu_notacorte) = score_cell.as_number() else {
                rejected.record(RejectedRow {
                    line: idx + 2,
                    edition: edition_text,
                    raw_score: score_cell.as_text().unwrap_or_default(),
                });
                continue;
            };

            records.push(NormalizedRecord {
                edicao: Edition::parse(&edition_text),
                co_ies: text(row, columns.co_ies),
                no_ies: identity(row, columns.no_ies),
                sg_ies: identity(row, columns.sg_ies),
                no_campus: identity(row, columns.no_campus),
                co_curso: text(row, columns.co_curso),
                no_curso: identity(row, columns.no_curso),
                ds_grau: identity(row, columns.ds_grau),
                ds_turno: identity(row, columns.ds_turno),
                ds_mod_concorrencia: identity(row, columns.ds_mod_concorrencia),
                qt_vagas_concorrencia: cell(row, Some(columns.qt_vagas_concorrencia))
                    .and_then(Cell::as_count),
                qt_inscricao: cell(row, columns.qt_inscricao).and_then(Cell::as_count),
                nu_notacorte,
            });
        }

        if rejected.count > 0 {
            warn!(
                source,
                rejected = rejected.count,
                "excluded rows with a non-numeric cut-off score"
            );
        }

        Ok(NormalizedSheet {
            mapping_version: mapping.version,
            rows_read: mapped.rows.len(),
            records,
            rejected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RawSheet;

    const HEADERS: &[&str] = &[
        "EDICAO",
        "CO_IES",
        "NO_IES",
        "SG_IES",
        "CO_IES_CURSO",
        "NO_CURSO",
        "DS_GRAU",
        "DS_TURNO",
        "DS_MOD_CONCORRENCIA",
        "QT_VAGAS_CONCORRENCIA",
        "QT_INSCRICAO",
        "NU_NOTACORTE",
    ];

    fn row<'a>(score: &'a str, course: &'a str) -> Vec<&'a str> {
        vec![
            "2023_1",
            "1",
            " Universidade Federal ",
            "ufx",
            "10",
            course,
            "Bacharelado",
            " integral",
            "Ampla concorrência",
            "20",
            "1200",
            score,
        ]
    }

    #[test]
    fn upper_cases_identity_columns() {
        let sheet = RawSheet::from_strings(HEADERS, &[row("700", " Medicina ")]);
        let out = RowNormalizer::new().normalize(sheet, "test").unwrap();

        let record = &out.records[0];
        assert_eq!(record.no_ies.as_deref(), Some("UNIVERSIDADE FEDERAL"));
        assert_eq!(record.sg_ies.as_deref(), Some("UFX"));
        assert_eq!(record.no_curso.as_deref(), Some("MEDICINA"));
        assert_eq!(record.ds_turno.as_deref(), Some("INTEGRAL"));
        assert_eq!(record.ds_mod_concorrencia.as_deref(), Some("AMPLA CONCORRÊNCIA"));
        assert_eq!(record.co_curso.as_deref(), Some("10"));
        assert_eq!(record.qt_vagas_concorrencia, Some(20));
        assert_eq!(record.qt_inscricao, Some(1200));
    }

    #[test]
    fn normalizing_twice_changes_nothing() {
        let sheet = RawSheet::from_strings(HEADERS, &[row("700", " medicina  ")]);
        let once = RowNormalizer::new().normalize(sheet, "test").unwrap();

        let r = &once.records[0];
        let edition = r.edicao.to_string();
        let again_row = vec![
            edition.as_str(),
            r.co_ies.as_deref().unwrap(),
            r.no_ies.as_deref().unwrap(),
            r.sg_ies.as_deref().unwrap(),
            r.co_curso.as_deref().unwrap(),
            r.no_curso.as_deref().unwrap(),
            r.ds_grau.as_deref().unwrap(),
            r.ds_turno.as_deref().unwrap(),
            r.ds_mod_concorrencia.as_deref().unwrap(),
            "20",
            "1200",
            "700",
        ];
        let sheet = RawSheet::from_strings(HEADERS, &[again_row]);
        let twice = RowNormalizer::new().normalize(sheet, "test").unwrap();

        assert_eq!(once.records, twice.records);
    }

    #[test]
    fn drops_rows_with_unparseable_scores() {
        let sheet = RawSheet::from_strings(
            HEADERS,
            &[
                row("700", "MEDICINA"),
                row("-", "DIREITO"),
                row("", "FISICA"),
                row("650,5", "QUIMICA"),
                row("n/a", "LETRAS"),
            ],
        );
        let out = RowNormalizer::new().normalize(sheet, "test").unwrap();

        assert_eq!(out.rows_read, 5);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.rejected.count, 3);
        assert_eq!(out.rejected.samples[0].line, 3);
        assert_eq!(out.rejected.samples[0].raw_score, "-");
        assert_eq!(out.records[1].nu_notacorte, 650.5);
    }

    #[test]
    fn missing_score_column_is_a_schema_error() {
        let sheet = RawSheet::from_strings(&["EDICAO", "QT_VAGAS_CONCORRENCIA"], &[vec!["2023_1", "20"]]);
        let err = RowNormalizer::new().normalize(sheet, "test").unwrap_err();
        assert!(matches!(err, SchemaError::MissingColumn(SCORE_COLUMN)));
    }

    #[test]
    fn missing_seat_column_is_a_schema_error() {
        let sheet = RawSheet::from_strings(&["EDICAO", "NU_NOTACORTE"], &[vec!["2023_1", "700"]]);
        let err = RowNormalizer::new().normalize(sheet, "test").unwrap_err();
        assert!(matches!(err, SchemaError::MissingColumn(SEATS_COLUMN)));
    }

    #[test]
    fn legacy_seat_column_is_accepted() {
        let sheet = RawSheet::from_strings(
            &["NU_ANO", "NU_EDICAO", "QT_VAGAS_OFERTADAS", "NU_NOTACORTE"],
            &[vec!["2019", "2", "35", "610.4"]],
        );
        let out = RowNormalizer::new().normalize(sheet, "test").unwrap();

        assert_eq!(out.mapping_version, 1);
        assert_eq!(out.records[0].edicao, Edition::parse("2019_2"));
        assert_eq!(out.records[0].qt_vagas_concorrencia, Some(35));
        assert_eq!(out.records[0].qt_inscricao, None);
    }
}
