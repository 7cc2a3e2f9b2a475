//! Part storage: signals, feature series, forecasts, profiles and condition state
//!
//! The pipeline talks to storage only through [`PartStore`], so backends can be
//! swapped without touching pipeline code:
//! - [`InMemoryStore`]: tests and one-shot runs
//! - [`SledStore`]: durable embedded store with atomic forecast replacement

mod memory;
mod sled_store;

pub use memory::InMemoryStore;
pub use sled_store::SledStore;

use chrono::{DateTime, Utc};

use crate::types::{
    ConditionState, ForecastBatch, PercentCondition, Sample, ThresholdProfile, Verdict,
};

/// Storage operations consumed by the pipeline.
///
/// Implementations must be thread-safe (Send + Sync). Every series is returned
/// in ascending timestamp order.
pub trait PartStore: Send + Sync {
    /// Every part with a signal or a threshold profile, sorted
    fn list_parts(&self) -> Result<Vec<String>, StorageError>;

    /// Raw historian readings for a part
    fn read_signal(&self, part_id: &str) -> Result<Vec<Sample>, StorageError>;

    /// Add readings; a reading at an existing timestamp overwrites it.
    /// Returns the number of readings written.
    fn append_signal(&self, part_id: &str, samples: &[Sample]) -> Result<usize, StorageError>;

    /// Persisted feature points of one kind
    fn read_feature_series(
        &self,
        part_id: &str,
        feature_kind: &str,
    ) -> Result<Vec<Sample>, StorageError>;

    /// Append feature points, keyed by timestamp (re-writing a point is a no-op
    /// apart from its value). Returns the number of points written.
    fn write_feature_points(
        &self,
        part_id: &str,
        feature_kind: &str,
        points: &[Sample],
    ) -> Result<usize, StorageError>;

    /// Remove every feature point of one kind. Returns the number removed.
    fn delete_feature_points(&self, part_id: &str, feature_kind: &str)
        -> Result<usize, StorageError>;

    /// The live forecast batch for a key, if any
    fn read_forecast_batch(
        &self,
        part_id: &str,
        feature_kind: &str,
    ) -> Result<Option<ForecastBatch>, StorageError>;

    /// Replace the live batch for `(batch.part_id, batch.feature_kind)`.
    /// Readers observe either the previous batch or the new one, never a mix.
    fn replace_forecast_batch(&self, batch: &ForecastBatch) -> Result<(), StorageError>;

    fn read_threshold_profile(&self, part_id: &str)
        -> Result<Option<ThresholdProfile>, StorageError>;

    fn write_threshold_profile(&self, profile: &ThresholdProfile) -> Result<(), StorageError>;

    fn read_condition_state(&self, part_id: &str) -> Result<Option<ConditionState>, StorageError>;

    /// Commit a classification verdict. Clears any percent condition recorded
    /// for the previous verdict.
    fn write_condition_state(
        &self,
        part_id: &str,
        verdict: &Verdict,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// Attach degradation metrics to the part's current condition record.
    fn write_percent_condition(
        &self,
        part_id: &str,
        percent: PercentCondition,
    ) -> Result<(), StorageError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("no condition record for part {0}")]
    NoConditionRecord(String),

    #[error("identifier {0:?} contains a NUL byte")]
    InvalidKey(String),

    #[error("corrupt entry in tree {0}")]
    Corrupt(&'static str),
}
