//! Training dataset contract shared by training and serving.
//!
//! Features are every historical column that is not in [`EXCLUDED_COLUMNS`];
//! [`CATEGORICAL_COLUMNS`] are handed to the regressor as categories. Serving
//! rebuilds feature rows through the same [`FeatureSchema`], so the two sides
//! cannot drift apart.

use crate::error::{DatasetError, PredictError};
use crate::models::TrainingConfig;
use crate::table::{ColumnValue, HistoricalRecord, HistoricalTable, HISTORICAL_COLUMNS};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const TARGET_COLUMN: &str = "nu_notacorte";

/// Identifier and leakage columns never used as features.
pub const EXCLUDED_COLUMNS: &[&str] = &[
    "edicao",
    "co_ies",
    "no_ies",
    "no_campus",
    "co_curso",
    "chave_curso",
    "qt_inscricao",
    TARGET_COLUMN,
    "ds_mod_concorrencia",
];

pub const CATEGORICAL_COLUMNS: &[&str] = &["sg_ies", "no_curso", "ds_grau", "ds_turno"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Numeric,
    Categorical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub kind: FeatureKind,
}

/// One feature cell handed to the regressor.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Numeric(Option<f64>),
    Category(Option<String>),
}

impl FeatureValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FeatureValue::Numeric(value) => *value,
            FeatureValue::Category(_) => None,
        }
    }

    pub fn as_category(&self) -> Option<&str> {
        match self {
            FeatureValue::Category(value) => value.as_deref(),
            FeatureValue::Numeric(_) => None,
        }
    }
}

pub type FeatureRow = Vec<FeatureValue>;

/// Ordered feature columns with their kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    columns: Vec<FeatureColumn>,
}

fn kind_of(name: &str) -> FeatureKind {
    if CATEGORICAL_COLUMNS.contains(&name) {
        FeatureKind::Categorical
    } else {
        FeatureKind::Numeric
    }
}

impl FeatureSchema {
    /// Training schema: historical columns minus the excluded ones.
    pub fn training() -> Self {
        let columns = HISTORICAL_COLUMNS
            .iter()
            .filter(|name| !EXCLUDED_COLUMNS.contains(*name))
            .map(|&name| FeatureColumn {
                name: name.to_string(),
                kind: kind_of(name),
            })
            .collect();
        Self { columns }
    }

    /// Schema for the feature list a trained model declares.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, PredictError> {
        let columns = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                if HISTORICAL_COLUMNS.contains(&name) {
                    Ok(FeatureColumn {
                        name: name.to_string(),
                        kind: kind_of(name),
                    })
                } else {
                    Err(PredictError::UnknownFeature(name.to_string()))
                }
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Project one historical record onto this schema. The row is a private
    /// copy, so concurrent callers never share mutable state.
    pub fn project(&self, record: &HistoricalRecord) -> FeatureRow {
        self.columns
            .iter()
            .map(|column| {
                let value = record.value(&column.name).unwrap_or(ColumnValue::Missing);
                match column.kind {
                    FeatureKind::Categorical => FeatureValue::Category(match value {
                        ColumnValue::Text(text) => Some(text.to_string()),
                        ColumnValue::Number(number) => Some(number.to_string()),
                        ColumnValue::Edition(edition) => Some(edition.to_string()),
                        ColumnValue::Missing => None,
                    }),
                    FeatureKind::Numeric => FeatureValue::Numeric(match value {
                        ColumnValue::Number(number) => Some(number),
                        _ => None,
                    }),
                }
            })
            .collect()
    }
}

/// Feature matrix and target of the modeling population.
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    pub schema: FeatureSchema,
    pub rows: Vec<FeatureRow>,
    pub targets: Vec<f64>,
}

impl TrainingDataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Filters the historical table down to the rows a model can learn from.
#[derive(Debug, Clone)]
pub struct TrainingDatasetBuilder {
    modality: String,
    min_seats: u32,
}

impl TrainingDatasetBuilder {
    pub fn new(modality: impl Into<String>, min_seats: u32) -> Self {
        Self {
            modality: modality.into(),
            min_seats,
        }
    }

    pub fn from_config(config: &TrainingConfig) -> Self {
        Self::new(config.open_competition_modality.clone(), config.min_seats)
    }

    /// Whether a record belongs to the training population.
    pub fn accepts(&self, record: &HistoricalRecord) -> bool {
        record.record.nu_notacorte != 0.0
            && record.in_population(&self.modality, self.min_seats)
            && record.lags.nota_edicao_anterior.is_some()
            && record.lags.vagas_edicao_anterior.is_some()
    }

    pub fn build(&self, table: &HistoricalTable) -> Result<TrainingDataset, DatasetError> {
        let schema = FeatureSchema::training();

        let (rows, targets): (Vec<FeatureRow>, Vec<f64>) = table
            .iter()
            .filter(|record| self.accepts(record))
            .map(|record| (schema.project(record), record.record.nu_notacorte))
            .unzip();

        if rows.is_empty() {
            return Err(DatasetError::Empty {
                modality: self.modality.clone(),
                min_seats: self.min_seats,
            });
        }

        info!(
            rows = rows.len(),
            features = schema.len(),
            "training dataset built"
        );

        Ok(TrainingDataset {
            schema,
            rows,
            targets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::consolidate;
    use crate::features::compute_lag_features;
    use crate::models::{Edition, NormalizedRecord, OPEN_COMPETITION};

    fn record(edition: &str, course: &str, modality: &str, seats: u32, score: f64) -> NormalizedRecord {
        NormalizedRecord {
            edicao: Edition::parse(edition),
            co_ies: Some("1".to_string()),
            no_ies: Some("UNIVERSIDADE".to_string()),
            sg_ies: Some("UNI".to_string()),
            no_campus: Some("SEDE".to_string()),
            co_curso: Some(course.to_string()),
            no_curso: Some(format!("CURSO {}", course)),
            ds_grau: Some("BACHARELADO".to_string()),
            ds_turno: Some("NOTURNO".to_string()),
            ds_mod_concorrencia: Some(modality.to_string()),
            qt_vagas_concorrencia: Some(seats),
            qt_inscricao: Some(300),
            nu_notacorte: score,
        }
    }

    fn table() -> HistoricalTable {
        compute_lag_features(consolidate(vec![vec![
            // Two editions, open competition: second edition trains
            record("2022_1", "10", OPEN_COMPETITION, 20, 650.0),
            record("2023_1", "10", OPEN_COMPETITION, 20, 700.0),
            // Quota modality never trains
            record("2022_1", "10", "COTA", 20, 600.0),
            record("2023_1", "10", "COTA", 20, 610.0),
            // Too few seats
            record("2022_1", "20", OPEN_COMPETITION, 5, 640.0),
            record("2023_1", "20", OPEN_COMPETITION, 5, 660.0),
            // Zero cut-off is excluded
            record("2022_1", "30", OPEN_COMPETITION, 15, 620.0),
            record("2023_1", "30", OPEN_COMPETITION, 15, 0.0),
            // Single edition: no lag history
            record("2023_1", "40", OPEN_COMPETITION, 40, 710.0),
        ]]))
        .unwrap()
    }

    #[test]
    fn training_schema_excludes_identifiers_and_target() {
        let schema = FeatureSchema::training();
        let names = schema.names();
        assert_eq!(
            names,
            vec![
                "sg_ies",
                "no_curso",
                "ds_grau",
                "ds_turno",
                "qt_vagas_concorrencia",
                "nota_edicao_anterior",
                "vagas_edicao_anterior",
                "tendencia_nota",
                "inscritos_edicao_anterior",
                "demanda_anterior",
            ]
        );
        let categorical: Vec<&str> = schema
            .columns()
            .iter()
            .filter(|c| c.kind == FeatureKind::Categorical)
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(categorical, CATEGORICAL_COLUMNS);
    }

    #[test]
    fn keeps_only_open_competition_rows_with_history() {
        let table = table();
        let dataset = TrainingDatasetBuilder::new(OPEN_COMPETITION, 10)
            .build(&table)
            .unwrap();

        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.targets, vec![700.0]);

        let row = &dataset.rows[0];
        assert_eq!(row[0], FeatureValue::Category(Some("UNI".to_string())));
        assert_eq!(row[1], FeatureValue::Category(Some("CURSO 10".to_string())));
        assert_eq!(row[5], FeatureValue::Numeric(Some(650.0)));
        assert_eq!(row[6], FeatureValue::Numeric(Some(20.0)));
    }

    #[test]
    fn single_edition_course_stays_in_table_but_not_in_training() {
        let table = table();
        assert!(table
            .iter()
            .any(|r| r.record.co_curso.as_deref() == Some("40")));

        let builder = TrainingDatasetBuilder::new(OPEN_COMPETITION, 10);
        assert!(table
            .iter()
            .filter(|r| r.record.co_curso.as_deref() == Some("40"))
            .all(|r| !builder.accepts(r)));
    }

    #[test]
    fn every_training_row_has_required_lags() {
        let table = table();
        let builder = TrainingDatasetBuilder::new(OPEN_COMPETITION, 10);
        for record in table.iter().filter(|r| builder.accepts(r)) {
            assert!(record.lags.nota_edicao_anterior.is_some());
            assert!(record.lags.vagas_edicao_anterior.is_some());
            assert_eq!(record.record.ds_mod_concorrencia.as_deref(), Some(OPEN_COMPETITION));
            assert!(record.record.qt_vagas_concorrencia.unwrap() >= 10);
        }
    }

    #[test]
    fn empty_population_is_an_error() {
        let err = TrainingDatasetBuilder::new("MODALIDADE INEXISTENTE", 10)
            .build(&table())
            .unwrap_err();
        assert!(matches!(err, DatasetError::Empty { .. }));
    }

    #[test]
    fn unknown_model_feature_is_rejected() {
        let err = FeatureSchema::from_names(&["sg_ies", "nota_enem"]).unwrap_err();
        assert!(matches!(err, PredictError::UnknownFeature(name) if name == "nota_enem"));
    }
}
