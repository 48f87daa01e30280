//! Error types for each pipeline stage.
//!
//! Row-level score coercion failures are not errors: they are counted in a
//! [`RejectionReport`](crate::normalizer::RejectionReport) instead.

use std::path::PathBuf;

/// A source sheet lacks columns the normalizer cannot do without.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("required column `{0}` is missing")]
    MissingColumn(&'static str),

    #[error("no edition column and no year/edition-number pair to build one")]
    MissingEdition,
}

/// Reading a source file failed before normalization.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to open workbook {path}: {message}")]
    Workbook { path: PathBuf, message: String },

    #[error("workbook {path} has no sheet at index {index}")]
    MissingSheet { path: PathBuf, index: usize },

    #[error("failed to read CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("unsupported source file {0}")]
    Unsupported(PathBuf),

    #[error("source file {0} is empty")]
    Empty(PathBuf),
}

/// Why one file contributed no rows to the consolidation.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
}

/// Run-level ingestion failures.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("no source files ending in {suffixes:?} found in {directory}")]
    NoSourceFiles {
        directory: PathBuf,
        suffixes: Vec<String>,
    },

    #[error("failed to list {directory}: {source}")]
    ReadDir {
        directory: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("none of the source files in {directory} could be ingested: {failed:?}")]
    NoUsableFiles {
        directory: PathBuf,
        failed: Vec<String>,
    },

    #[error("ingestion worker failed: {0}")]
    Worker(String),
}

/// Lag feature computation failed inside the dataframe engine.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

/// Building the historical table failed.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("lag features: {0}")]
    Features(#[from] FeatureError),
}

/// Persisting or loading the historical table failed.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("column `{0}` is missing from the stored table")]
    MissingColumn(String),

    #[error("column `{column}` is not stored as {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
    },
}

/// The training population is empty after filtering.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error(
        "no training rows left for modality `{modality}` with at least {min_seats} seats \
         and a previous edition on record"
    )]
    Empty { modality: String, min_seats: u32 },
}

/// Training, loading or saving the regressor failed.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid model: {0}")]
    Invalid(String),

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// A serving request could not be answered.
#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("no history recorded for {0}")]
    NoHistory(String),

    #[error("model expects feature `{0}` which the historical table does not provide")]
    UnknownFeature(String),
}
