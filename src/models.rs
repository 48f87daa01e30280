use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Data source configuration
    pub raw_data_directory: String,
    pub file_suffixes: Vec<String>,
    // Artifacts shared by training and serving
    pub historical_table_path: String,
    pub model_path: String,
    pub output_directory: Option<String>,
    pub training: TrainingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub open_competition_modality: String,
    pub min_seats: u32,
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub min_samples_leaf: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            raw_data_directory: "data/raw".to_string(),
            file_suffixes: vec![
                "_notasdecorte.xlsx".to_string(),
                // Sheets already exported to CSV
                "_notasdecorte.csv".to_string(),
            ],
            historical_table_path: "data/processed/final_data.parquet".to_string(),
            model_path: "saved_models/sisu_predictor.json".to_string(),
            output_directory: Some("output".to_string()),
            training: TrainingConfig::default(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            open_competition_modality: OPEN_COMPETITION.to_string(),
            min_seats: 10,
            n_estimators: 5000,
            learning_rate: 0.01,
            min_samples_leaf: 20,
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)
            .with_context(|| format!("failed to read config file {}", file_path))?;
        toml::from_str(&content).with_context(|| format!("invalid config file {}", file_path))
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)
            .with_context(|| format!("failed to write config file {}", file_path))
    }
}

/// Modality label of the open competition (non-quota) seats.
pub const OPEN_COMPETITION: &str = "AMPLA CONCORRÊNCIA";

/// One run of the selection cycle.
///
/// `YEAR_NUMBER` identifiers (also `YEAR/NUMBER`) order numerically, so `2022_10`
/// comes after `2022_2`. Anything else is kept as a label and orders after every
/// numbered edition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Edition {
    Numbered { year: u16, number: u16 },
    Label(String),
}

fn edition_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*(\d{4})\s*[_/]\s*(\d{1,3})\s*$").unwrap())
}

impl Edition {
    pub fn parse(raw: &str) -> Self {
        let numbered = edition_pattern().captures(raw).and_then(|caps| {
            let year = caps.get(1)?.as_str().parse::<u16>().ok()?;
            let number = caps.get(2)?.as_str().parse::<u16>().ok()?;
            Some(Edition::Numbered { year, number })
        });

        numbered.unwrap_or_else(|| Edition::Label(raw.trim().replace('/', "_")))
    }
}

impl fmt::Display for Edition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edition::Numbered { year, number } => write!(f, "{}_{}", year, number),
            Edition::Label(label) => f.write_str(label),
        }
    }
}

/// A source row after cleaning. Text identity fields are already trimmed and
/// upper-cased; fields a source file did not carry are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub edicao: Edition,
    pub co_ies: Option<String>,
    pub no_ies: Option<String>,
    pub sg_ies: Option<String>,
    pub no_campus: Option<String>,
    pub co_curso: Option<String>,
    pub no_curso: Option<String>,
    pub ds_grau: Option<String>,
    pub ds_turno: Option<String>,
    pub ds_mod_concorrencia: Option<String>,
    pub qt_vagas_concorrencia: Option<u32>,
    pub qt_inscricao: Option<u32>,
    pub nu_notacorte: f64,
}

impl NormalizedRecord {
    /// Course key shared by every edition of the same offer:
    /// institution code, course code, degree and shift.
    pub fn course_key(&self) -> String {
        let part = |value: &Option<String>| value.clone().unwrap_or_default();
        format!(
            "{}_{}_{}_{}",
            part(&self.co_ies),
            part(&self.co_curso),
            part(&self.ds_grau),
            part(&self.ds_turno)
        )
    }
}

/// Trim and upper-case a text identity value.
pub fn normalize_identity(value: &str) -> String {
    value.trim().to_uppercase()
}

/// Compare editions newest first, used when picking the latest record.
pub fn newest_first(a: &Edition, b: &Edition) -> Ordering {
    b.cmp(a)
}

/// The four identity filters a serving request selects an offer by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseQuery {
    pub institution: String,
    pub course: String,
    pub degree: String,
    pub shift: String,
}

impl CourseQuery {
    pub fn new(institution: &str, course: &str, degree: &str, shift: &str) -> Self {
        Self {
            institution: normalize_identity(institution),
            course: normalize_identity(course),
            degree: normalize_identity(degree),
            shift: normalize_identity(shift),
        }
    }
}

impl fmt::Display for CourseQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}) at {}",
            self.course, self.degree, self.shift, self.institution
        )
    }
}
