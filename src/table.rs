//! The historical table: every normalized record plus its lag features.

use crate::models::{CourseQuery, Edition, NormalizedRecord};

/// Column names of the historical table, in stored order.
pub const HISTORICAL_COLUMNS: &[&str] = &[
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
    "qt_vagas_concorrencia",
    "qt_inscricao",
    "nu_notacorte",
    "chave_curso",
    "nota_edicao_anterior",
    "vagas_edicao_anterior",
    "tendencia_nota",
    "inscritos_edicao_anterior",
    "demanda_anterior",
];

/// Values carried over from earlier editions of the same course and modality.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LagFeatures {
    pub nota_edicao_anterior: Option<f64>,
    pub vagas_edicao_anterior: Option<u32>,
    /// Previous score minus the one before it; 0 without two earlier editions.
    pub tendencia_nota: f64,
    pub inscritos_edicao_anterior: Option<u32>,
    /// Previous applicants per previous seat (+1); 0 when not computable.
    pub demanda_anterior: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalRecord {
    pub chave_curso: String,
    pub record: NormalizedRecord,
    pub lags: LagFeatures,
}

/// A single cell of the historical table, borrowed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnValue<'a> {
    Edition(&'a Edition),
    Text(&'a str),
    Number(f64),
    Missing,
}

fn text(value: &Option<String>) -> ColumnValue<'_> {
    value
        .as_deref()
        .map(ColumnValue::Text)
        .unwrap_or(ColumnValue::Missing)
}

fn number<T: Into<f64>>(value: Option<T>) -> ColumnValue<'static> {
    value
        .map(|v| ColumnValue::Number(v.into()))
        .unwrap_or(ColumnValue::Missing)
}

impl HistoricalRecord {
    /// Look a column up by name; `None` when the table has no such column.
    pub fn value(&self, column: &str) -> Option<ColumnValue<'_>> {
        let r = &self.record;
        let value = match column {
            "edicao" => ColumnValue::Edition(&r.edicao),
            "co_ies" => text(&r.co_ies),
            "no_ies" => text(&r.no_ies),
            "sg_ies" => text(&r.sg_ies),
            "no_campus" => text(&r.no_campus),
            "co_curso" => text(&r.co_curso),
            "no_curso" => text(&r.no_curso),
            "ds_grau" => text(&r.ds_grau),
            "ds_turno" => text(&r.ds_turno),
            "ds_mod_concorrencia" => text(&r.ds_mod_concorrencia),
            "qt_vagas_concorrencia" => number(r.qt_vagas_concorrencia),
            "qt_inscricao" => number(r.qt_inscricao),
            "nu_notacorte" => ColumnValue::Number(r.nu_notacorte),
            "chave_curso" => ColumnValue::Text(&self.chave_curso),
            "nota_edicao_anterior" => number(self.lags.nota_edicao_anterior),
            "vagas_edicao_anterior" => number(self.lags.vagas_edicao_anterior),
            "tendencia_nota" => ColumnValue::Number(self.lags.tendencia_nota),
            "inscritos_edicao_anterior" => number(self.lags.inscritos_edicao_anterior),
            "demanda_anterior" => ColumnValue::Number(self.lags.demanda_anterior),
            _ => return None,
        };
        Some(value)
    }

    /// Open-competition style population filter shared by training and serving.
    pub fn in_population(&self, modality: &str, min_seats: u32) -> bool {
        self.record.ds_mod_concorrencia.as_deref() == Some(modality)
            && self.record.qt_vagas_concorrencia.unwrap_or(0) >= min_seats
    }

    /// Whether the record is the offer a serving query asks for.
    pub fn matches(&self, query: &CourseQuery) -> bool {
        let r = &self.record;
        r.sg_ies.as_deref() == Some(query.institution.as_str())
            && r.no_curso.as_deref() == Some(query.course.as_str())
            && r.ds_grau.as_deref() == Some(query.degree.as_str())
            && r.ds_turno.as_deref() == Some(query.shift.as_str())
    }

    pub fn edition(&self) -> &Edition {
        &self.record.edicao
    }
}

/// Immutable once built; shared read-only by training and serving.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricalTable {
    records: Vec<HistoricalRecord>,
}

impl HistoricalTable {
    pub fn new(records: Vec<HistoricalRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[HistoricalRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoricalRecord> {
        self.records.iter()
    }
}
