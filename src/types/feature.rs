//! Feature points (envelope extraction output) and forecast batches

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConditionStatus, Sample};
use crate::forecast::ArimaOrder;

/// A value selected as a local maximum of a part's resampled signal.
///
/// Immutable once written; recomputation supersedes points by deleting and
/// re-inserting the whole series for the `(part_id, feature_kind)` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePoint {
    pub part_id: String,
    /// Extraction configuration that produced this point
    pub feature_kind: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl FeaturePoint {
    pub fn sample(&self) -> Sample {
        Sample::new(self.timestamp, self.value)
    }
}

/// One step of a forecast horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    /// Point forecast
    pub value: f64,
    /// Lower bound of the prediction interval
    pub lower: f64,
    /// Upper bound of the prediction interval
    pub upper: f64,
    /// Predicted value classified against the part's thresholds
    /// (`None` when the part has no threshold profile)
    pub status: Option<ConditionStatus>,
}

/// A complete forecast horizon for one `(part_id, feature_kind)` key.
///
/// Batches are replaced wholesale; only one batch is live per key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastBatch {
    pub part_id: String,
    pub feature_kind: String,
    /// Model order used to produce this batch
    pub order: ArimaOrder,
    /// AIC of the fitted model
    pub aic: f64,
    /// Confidence level of the prediction intervals (e.g. 0.95)
    pub confidence_level: f64,
    pub generated_at: DateTime<Utc>,
    pub points: Vec<ForecastPoint>,
}

impl ForecastBatch {
    /// Earliest forecast point tagged as predicted-failed, if any.
    pub fn first_failure(&self) -> Option<&ForecastPoint> {
        self.points
            .iter()
            .find(|p| p.status == Some(ConditionStatus::PredictedFailed))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
