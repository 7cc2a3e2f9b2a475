//! partwatch: predictive maintenance for equipment parts
//!
//! Turns historian sensor signals into an early-failure signal and a
//! percent-degradation score per part.
//!
//! ## Architecture
//!
//! - **Envelope Extractor**: local extrema of the resampled signal become the
//!   part's feature series
//! - **Order Selector**: parallel AIC grid search over ARIMA orders
//! - **Forecaster**: ARIMA fit on a training prefix, timestamped horizon with
//!   prediction intervals
//! - **Condition Classifier**: threshold status plus percent condition
//! - **Pipeline**: per-part orchestration over a [`storage::PartStore`]

pub mod acquisition;
pub mod condition;
pub mod config;
pub mod envelope;
pub mod forecast;
pub mod pipeline;
pub mod storage;
pub mod types;

pub use condition::{classify, percent_condition, ConditionClassifier, ConditionError};
pub use config::{ConfigError, PipelineConfig};
pub use envelope::{extract, Envelopes};
pub use forecast::{select_order, ArimaOrder, FittedArima, Forecaster, OrderGrid, OrderSelector};
pub use pipeline::{ErrorClass, Pipeline, PipelineError, RunSummary};
pub use storage::{InMemoryStore, PartStore, SledStore, StorageError};
pub use types::{
    ConditionState, ConditionStatus, FeaturePoint, ForecastBatch, ForecastPoint,
    PercentCondition, Sample, ThresholdProfile, Verdict,
};
