//! Serving-time feature reconstruction and prediction.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::dataset::{FeatureRow, FeatureSchema};
use crate::error::PredictError;
use crate::models::{newest_first, CourseQuery, Edition, TrainingConfig};
use crate::regressor::Regressor;
use crate::table::{HistoricalRecord, HistoricalTable};

/// One point of a course's cut-off history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub edition: String,
    pub cutoff: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Edition of the row the features were taken from.
    pub edition: String,
    pub predicted_score: f64,
    pub last_score: f64,
    pub delta: f64,
    /// Ascending by edition.
    pub history: Vec<HistoryPoint>,
}

impl Prediction {
    /// Fewer than two points cannot draw a trend.
    pub fn has_trend(&self) -> bool {
        self.history.len() > 1
    }
}

/// Answers serving queries against a read-only historical table.
///
/// Cheap to clone; clones share the table and the model.
#[derive(Clone)]
pub struct CutoffPredictor {
    table: Arc<HistoricalTable>,
    model: Arc<dyn Regressor>,
    schema: FeatureSchema,
    modality: String,
    min_seats: u32,
}

impl CutoffPredictor {
    pub fn new(
        table: Arc<HistoricalTable>,
        model: Arc<dyn Regressor>,
        config: &TrainingConfig,
    ) -> Result<Self, PredictError> {
        let schema = FeatureSchema::from_names(model.feature_names())?;
        Ok(Self {
            table,
            model,
            schema,
            modality: config.open_competition_modality.clone(),
            min_seats: config.min_seats,
        })
    }

    pub fn table(&self) -> &HistoricalTable {
        &self.table
    }

    fn matching<'a, 'q>(
        &'a self,
        query: &'q CourseQuery,
    ) -> impl Iterator<Item = &'a HistoricalRecord> + 'q
    where
        'a: 'q,
    {
        self.table
            .iter()
            .filter(move |r| r.in_population(&self.modality, self.min_seats) && r.matches(query))
    }

    /// Most recent row of the offer; ties keep table order.
    pub fn latest(&self, query: &CourseQuery) -> Option<&HistoricalRecord> {
        self.matching(query)
            .min_by(|a, b| newest_first(a.edition(), b.edition()))
    }

    /// Cut-off series of the offer, ascending by edition.
    pub fn history(&self, query: &CourseQuery) -> Vec<HistoryPoint> {
        let mut rows: Vec<(&Edition, f64)> = self
            .matching(query)
            .map(|r| (r.edition(), r.record.nu_notacorte))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(b.0));
        rows.into_iter()
            .map(|(edition, cutoff)| HistoryPoint {
                edition: edition.to_string(),
                cutoff,
            })
            .collect()
    }

    /// Feature row the model would score for this offer.
    pub fn features(&self, query: &CourseQuery) -> Result<FeatureRow, PredictError> {
        self.latest(query)
            .map(|record| self.schema.project(record))
            .ok_or_else(|| PredictError::NoHistory(query.to_string()))
    }

    pub fn predict(&self, query: &CourseQuery) -> Result<Prediction, PredictError> {
        let latest = self
            .latest(query)
            .ok_or_else(|| PredictError::NoHistory(query.to_string()))?;

        let row = self.schema.project(latest);
        let predicted_score = self.model.predict(&row);
        let last_score = latest.record.nu_notacorte;

        debug!(
            query = %query,
            edition = %latest.edition(),
            model = self.model.name(),
            predicted_score,
            "prediction served"
        );

        Ok(Prediction {
            edition: latest.edition().to_string(),
            predicted_score,
            last_score,
            delta: predicted_score - last_score,
            history: self.history(query),
        })
    }
}
