//! Regressor seam and the bundled gradient-boosted stump ensemble.
//!
//! # JSON Format
//!
//! ```json
//! {
//!   "model_type": "boosted_stumps",
//!   "feature_names": ["sg_ies", "no_curso", "...", "demanda_anterior"],
//!   "categorical_features": ["sg_ies", "no_curso", "ds_grau", "ds_turno"],
//!   "init_value": 652.4,
//!   "learning_rate": 0.01,
//!   "stumps": [
//!     { "split": { "threshold": { "feature": 5, "threshold": 701.3 } }, "left": -12.0, "right": 18.5 },
//!     { "split": { "category": { "feature": 1, "value": "MEDICINA" } }, "left": 40.2, "right": -0.7 }
//!   ]
//! }
//! ```
//!
//! # Prediction
//!
//! Start from `init_value`; every stump adds `learning_rate * leaf`. Threshold
//! splits send `<= threshold` and missing values left, category splits send the
//! matching category left.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::{FeatureKind, FeatureRow, FeatureValue, TrainingDataset};
use crate::error::ModelError;
use crate::models::TrainingConfig;

const MODEL_TYPE: &str = "boosted_stumps";

/// A trained model able to score one feature row.
pub trait Regressor: Send + Sync {
    fn name(&self) -> &str;

    /// Ordered column names the model expects in a feature row.
    fn feature_names(&self) -> &[String];

    fn predict(&self, row: &FeatureRow) -> f64;
}

/// Something that can fit a [`Regressor`] on a training dataset.
pub trait TrainableRegressor {
    type Model: Regressor;

    fn fit(&self, dataset: &TrainingDataset) -> Result<Self::Model, ModelError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Threshold { feature: usize, threshold: f64 },
    Category { feature: usize, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stump {
    pub split: Split,
    pub left: f64,
    pub right: f64,
}

impl Stump {
    fn goes_left(&self, row: &FeatureRow) -> bool {
        match &self.split {
            Split::Threshold { feature, threshold } => {
                match row.get(*feature).and_then(FeatureValue::as_number) {
                    Some(value) => value <= *threshold,
                    None => true,
                }
            }
            Split::Category { feature, value } => {
                row.get(*feature).and_then(FeatureValue::as_category) == Some(value.as_str())
            }
        }
    }

    fn output(&self, row: &FeatureRow) -> f64 {
        if self.goes_left(row) {
            self.left
        } else {
            self.right
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BoostedStumpsJson {
    model_type: String,
    feature_names: Vec<String>,
    categorical_features: Vec<String>,
    init_value: f64,
    learning_rate: f64,
    stumps: Vec<Stump>,
}

/// Additive ensemble of depth-one regression trees.
#[derive(Debug, Clone)]
pub struct BoostedStumps {
    name: String,
    feature_names: Vec<String>,
    categorical_features: Vec<String>,
    init_value: f64,
    learning_rate: f64,
    stumps: Vec<Stump>,
}

impl BoostedStumps {
    pub fn n_stumps(&self) -> usize {
        self.stumps.len()
    }

    pub fn categorical_features(&self) -> &[String] {
        &self.categorical_features
    }

    /// Load a model from a JSON file. The name is derived from the file stem.
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();
        Self::from_json_str_with_name(&content, name)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
        Self::from_json_str_with_name(json, MODEL_TYPE.to_string())
    }

    fn from_json_str_with_name(json: &str, name: String) -> Result<Self, ModelError> {
        let model: BoostedStumpsJson = serde_json::from_str(json)?;

        if model.model_type != MODEL_TYPE {
            return Err(ModelError::Invalid(format!(
                "expected model_type '{}', got '{}'",
                MODEL_TYPE, model.model_type
            )));
        }

        if model.feature_names.is_empty() {
            return Err(ModelError::Invalid("model declares no features".to_string()));
        }

        if model.learning_rate <= 0.0 || model.learning_rate > 1.0 {
            return Err(ModelError::Invalid(format!(
                "invalid learning_rate: {} (should be 0 < lr <= 1)",
                model.learning_rate
            )));
        }

        for (i, stump) in model.stumps.iter().enumerate() {
            let feature = match &stump.split {
                Split::Threshold { feature, .. } | Split::Category { feature, .. } => *feature,
            };
            if feature >= model.feature_names.len() {
                return Err(ModelError::Invalid(format!(
                    "stump {} splits on feature {} but the model has {} features",
                    i,
                    feature,
                    model.feature_names.len()
                )));
            }
        }

        Ok(Self {
            name,
            feature_names: model.feature_names,
            categorical_features: model.categorical_features,
            init_value: model.init_value,
            learning_rate: model.learning_rate,
            stumps: model.stumps,
        })
    }

    pub fn to_json_string(&self) -> Result<String, ModelError> {
        let model = BoostedStumpsJson {
            model_type: MODEL_TYPE.to_string(),
            feature_names: self.feature_names.clone(),
            categorical_features: self.categorical_features.clone(),
            init_value: self.init_value,
            learning_rate: self.learning_rate,
            stumps: self.stumps.clone(),
        };
        Ok(serde_json::to_string_pretty(&model)?)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json_string()?)?;
        info!(path = %path.display(), stumps = self.stumps.len(), "model saved");
        Ok(())
    }
}

impl Regressor for BoostedStumps {
    fn name(&self) -> &str {
        &self.name
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, row: &FeatureRow) -> f64 {
        self.init_value
            + self
                .stumps
                .iter()
                .map(|stump| self.learning_rate * stump.output(row))
                .sum::<f64>()
    }
}

/// Hyperparameters for fitting [`BoostedStumps`].
#[derive(Debug, Clone)]
pub struct StumpBooster {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub min_samples_leaf: usize,
}

impl Default for StumpBooster {
    fn default() -> Self {
        Self::from_config(&TrainingConfig::default())
    }
}

/// Column-wise view of the training rows prepared once before boosting.
enum FeatureIndex {
    /// Row indices with a value, sorted by value, plus rows without one.
    Numeric {
        sorted: Vec<(usize, f64)>,
        missing: Vec<usize>,
    },
    /// Category id per row and the category labels.
    Categorical {
        codes: Vec<Option<usize>>,
        labels: Vec<String>,
    },
}

struct Candidate {
    gain: f64,
    split: Split,
    left_sum: f64,
    left_count: usize,
}

impl FeatureIndex {
    fn build(dataset: &TrainingDataset, feature: usize, kind: FeatureKind) -> Self {
        match kind {
            FeatureKind::Numeric => {
                let mut sorted = Vec::new();
                let mut missing = Vec::new();
                for (i, row) in dataset.rows.iter().enumerate() {
                    match row.get(feature).and_then(FeatureValue::as_number) {
                        Some(value) => sorted.push((i, value)),
                        None => missing.push(i),
                    }
                }
                sorted.sort_by(|a, b| a.1.total_cmp(&b.1));
                FeatureIndex::Numeric { sorted, missing }
            }
            FeatureKind::Categorical => {
                let mut labels: Vec<String> = Vec::new();
                let codes = dataset
                    .rows
                    .iter()
                    .map(|row| {
                        row.get(feature).and_then(FeatureValue::as_category).map(|label| {
                            match labels.iter().position(|l| l == label) {
                                Some(code) => code,
                                None => {
                                    labels.push(label.to_string());
                                    labels.len() - 1
                                }
                            }
                        })
                    })
                    .collect();
                FeatureIndex::Categorical { codes, labels }
            }
        }
    }

    /// Best split of this feature for the current residuals.
    fn best_split(&self, feature: usize, residuals: &[f64], min_leaf: usize) -> Option<Candidate> {
        let total: f64 = residuals.iter().sum();
        let n = residuals.len();
        let score = |left_sum: f64, left_count: usize| {
            let right_sum = total - left_sum;
            let right_count = n - left_count;
            left_sum * left_sum / left_count as f64 + right_sum * right_sum / right_count as f64
        };
        let mut best: Option<Candidate> = None;
        let mut consider = |left_sum: f64, left_count: usize, split: Split| {
            if left_count < min_leaf || n - left_count < min_leaf {
                return;
            }
            let gain = score(left_sum, left_count);
            if best.as_ref().map_or(true, |b| gain > b.gain) {
                best = Some(Candidate {
                    gain,
                    split,
                    left_sum,
                    left_count,
                });
            }
        };

        match self {
            FeatureIndex::Numeric { sorted, missing } => {
                let mut left_sum: f64 = missing.iter().map(|&i| residuals[i]).sum();
                let mut left_count = missing.len();
                for pair in sorted.windows(2) {
                    let (i, value) = pair[0];
                    left_sum += residuals[i];
                    left_count += 1;
                    let next = pair[1].1;
                    if next > value {
                        let threshold = value + (next - value) / 2.0;
                        consider(left_sum, left_count, Split::Threshold { feature, threshold });
                    }
                }
            }
            FeatureIndex::Categorical { codes, labels } => {
                let mut sums = vec![0.0; labels.len()];
                let mut counts = vec![0usize; labels.len()];
                for (i, code) in codes.iter().enumerate() {
                    if let Some(code) = code {
                        sums[*code] += residuals[i];
                        counts[*code] += 1;
                    }
                }
                for (code, label) in labels.iter().enumerate() {
                    consider(
                        sums[code],
                        counts[code],
                        Split::Category {
                            feature,
                            value: label.clone(),
                        },
                    );
                }
            }
        }

        best
    }
}

impl StumpBooster {
    pub fn from_config(config: &TrainingConfig) -> Self {
        Self {
            n_estimators: config.n_estimators,
            learning_rate: config.learning_rate,
            min_samples_leaf: config.min_samples_leaf.max(1),
        }
    }
}

impl TrainableRegressor for StumpBooster {
    type Model = BoostedStumps;

    fn fit(&self, dataset: &TrainingDataset) -> Result<BoostedStumps, ModelError> {
        if dataset.is_empty() {
            return Err(ModelError::Invalid("cannot fit on an empty dataset".to_string()));
        }
        if self.learning_rate <= 0.0 || self.learning_rate > 1.0 {
            return Err(ModelError::Invalid(format!(
                "invalid learning_rate: {} (should be 0 < lr <= 1)",
                self.learning_rate
            )));
        }

        let columns = dataset.schema.columns();
        let indexes: Vec<FeatureIndex> = columns
            .iter()
            .enumerate()
            .map(|(feature, column)| FeatureIndex::build(dataset, feature, column.kind))
            .collect();

        let n = dataset.targets.len() as f64;
        let init_value = dataset.targets.iter().sum::<f64>() / n;
        let mut predictions = vec![init_value; dataset.targets.len()];
        let mut stumps = Vec::with_capacity(self.n_estimators);

        for round in 0..self.n_estimators {
            let residuals: Vec<f64> = dataset
                .targets
                .iter()
                .zip(&predictions)
                .map(|(y, p)| y - p)
                .collect();
            let total: f64 = residuals.iter().sum();
            let baseline = total * total / n;

            let best = indexes
                .iter()
                .enumerate()
                .filter_map(|(feature, index)| {
                    index.best_split(feature, &residuals, self.min_samples_leaf)
                })
                .max_by(|a, b| a.gain.total_cmp(&b.gain));

            let Some(best) = best.filter(|c| c.gain > baseline + 1e-9) else {
                debug!(round, "no split improves the fit, stopping early");
                break;
            };

            let right_count = dataset.targets.len() - best.left_count;
            let stump = Stump {
                split: best.split,
                left: best.left_sum / best.left_count as f64,
                right: (total - best.left_sum) / right_count as f64,
            };

            for (prediction, row) in predictions.iter_mut().zip(&dataset.rows) {
                *prediction += self.learning_rate * stump.output(row);
            }
            stumps.push(stump);
        }

        let mae = dataset
            .targets
            .iter()
            .zip(&predictions)
            .map(|(y, p)| (y - p).abs())
            .sum::<f64>()
            / n;
        info!(stumps = stumps.len(), in_sample_mae = mae, "boosting finished");

        let categorical_features = columns
            .iter()
            .filter(|c| c.kind == FeatureKind::Categorical)
            .map(|c| c.name.clone())
            .collect();

        Ok(BoostedStumps {
            name: MODEL_TYPE.to_string(),
            feature_names: dataset.schema.names(),
            categorical_features,
            init_value,
            learning_rate: self.learning_rate,
            stumps,
        })
    }
}

/// Mean absolute error of a model over a dataset.
pub fn mean_absolute_error(model: &dyn Regressor, dataset: &TrainingDataset) -> f64 {
    if dataset.is_empty() {
        return 0.0;
    }
    dataset
        .rows
        .iter()
        .zip(&dataset.targets)
        .map(|(row, target)| (model.predict(row) - target).abs())
        .sum::<f64>()
        / dataset.len() as f64
}
