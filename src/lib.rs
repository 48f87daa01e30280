pub mod catalog;
pub mod consolidate;
pub mod dataset;
pub mod error;
pub mod features;
pub mod ingest;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod predictor;
pub mod regressor;
pub mod schema;
pub mod source;
pub mod storage;
pub mod table;

pub use models::{Config, CourseQuery, Edition, NormalizedRecord, TrainingConfig};
pub use predictor::{CutoffPredictor, Prediction};
pub use table::{HistoricalRecord, HistoricalTable};
