//! Stage wiring shared by the CLI and the integration tests.

use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::consolidate::consolidate;
use crate::dataset::TrainingDatasetBuilder;
use crate::error::{ModelError, PipelineError};
use crate::features::compute_lag_features;
use crate::ingest::{FileIngestor, IngestReport};
use crate::models::TrainingConfig;
use crate::regressor::{mean_absolute_error, BoostedStumps, StumpBooster, TrainableRegressor};
use crate::table::HistoricalTable;

pub struct Consolidation {
    pub table: HistoricalTable,
    pub report: IngestReport,
}

/// Ingest every source file in `directory` and build the historical table.
pub async fn build_historical_table(
    ingestor: &FileIngestor,
    directory: &Path,
) -> Result<Consolidation, PipelineError> {
    let report = ingestor.ingest_directory(directory).await?;

    let sheets = report
        .ingested
        .iter()
        .map(|file| file.sheet.records.clone());
    let table = compute_lag_features(consolidate(sheets))?;

    info!(
        rows = table.len(),
        files = report.ingested.len(),
        failed = report.failed.len(),
        rejected = report.rows_rejected(),
        "historical table built"
    );

    Ok(Consolidation { table, report })
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub rows: usize,
    pub features: usize,
    pub stumps: usize,
    pub in_sample_mae: f64,
}

/// Build the training dataset from `table` and fit the bundled regressor.
pub fn train_model(
    table: &HistoricalTable,
    config: &TrainingConfig,
) -> Result<(BoostedStumps, TrainingSummary), ModelError> {
    let dataset = TrainingDatasetBuilder::from_config(config).build(table)?;
    let model = StumpBooster::from_config(config).fit(&dataset)?;

    let summary = TrainingSummary {
        rows: dataset.len(),
        features: dataset.schema.len(),
        stumps: model.n_stumps(),
        in_sample_mae: mean_absolute_error(&model, &dataset),
    };
    Ok((model, summary))
}
