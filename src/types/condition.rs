//! Threshold profiles, condition status and the per-part condition record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discrete health classification of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionStatus {
    /// Latest value below the warning boundary
    Normal,
    /// Latest value at or above the warning boundary, below the failure boundary
    Warning,
    /// Latest value at or above the failure boundary
    PredictedFailed,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::Normal => write!(f, "normal"),
            ConditionStatus::Warning => write!(f, "warning"),
            ConditionStatus::PredictedFailed => write!(f, "predicted failed"),
        }
    }
}

/// Per-part threshold configuration. Owned by configuration, read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdProfile {
    pub part_id: String,
    /// Failure boundary
    pub upper: f64,
    /// Warning boundary
    pub lower: f64,
    /// Feature value that corresponds to 100% condition
    pub baseline: f64,
}

/// Outcome of one classification run, as committed to the condition record.
///
/// The failure timestamp and value exist only on `PredictedFailed`, so a record
/// can never carry a time-of-failure without the failed status (or vice versa).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Normal,
    Warning,
    PredictedFailed {
        /// Timestamp of the feature value that crossed the failure boundary
        at: DateTime<Utc>,
        /// The crossing value
        value: f64,
    },
}

impl Verdict {
    pub fn status(&self) -> ConditionStatus {
        match self {
            Verdict::Normal => ConditionStatus::Normal,
            Verdict::Warning => ConditionStatus::Warning,
            Verdict::PredictedFailed { .. } => ConditionStatus::PredictedFailed,
        }
    }

    pub fn time_of_failure(&self) -> Option<DateTime<Utc>> {
        match self {
            Verdict::PredictedFailed { at, .. } => Some(*at),
            _ => None,
        }
    }

    pub fn failure_value(&self) -> Option<f64> {
        match self {
            Verdict::PredictedFailed { value, .. } => Some(*value),
            _ => None,
        }
    }
}

/// Degradation metrics, rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentCondition {
    /// Remaining margin to the failure boundary, relative to the baseline span
    pub percent_condition: f64,
    /// Equal to `percent_condition` while in the safe zone, otherwise 100
    pub warning_percent: f64,
}

impl PercentCondition {
    pub const FAILED: PercentCondition = PercentCondition {
        percent_condition: 0.0,
        warning_percent: 0.0,
    };
}

/// Mutable per-part condition record. Last write wins; no history is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionState {
    pub part_id: String,
    pub verdict: Verdict,
    #[serde(default)]
    pub percent: Option<PercentCondition>,
    pub updated_at: DateTime<Utc>,
}

impl ConditionState {
    pub fn status(&self) -> ConditionStatus {
        self.verdict.status()
    }

    pub fn time_of_failure(&self) -> Option<DateTime<Utc>> {
        self.verdict.time_of_failure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_failure_fields_follow_status() {
        let at = Utc::now();
        let failed = Verdict::PredictedFailed { at, value: 101.0 };
        assert_eq!(failed.status(), ConditionStatus::PredictedFailed);
        assert_eq!(failed.time_of_failure(), Some(at));
        assert_eq!(failed.failure_value(), Some(101.0));

        for v in [Verdict::Normal, Verdict::Warning] {
            assert!(v.time_of_failure().is_none());
            assert!(v.failure_value().is_none());
        }
    }

    #[test]
    fn test_verdict_serde_tagged() {
        let json = serde_json::to_string(&Verdict::Warning).unwrap();
        assert_eq!(json, r#"{"status":"warning"}"#);
        let back: Verdict = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Verdict::Warning);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ConditionStatus::PredictedFailed.to_string(), "predicted failed");
    }
}
