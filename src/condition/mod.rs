//! Condition Classifier
//!
//! Classifies the latest feature value of a part against its threshold profile
//! and derives a percent-degradation score.
//!
//! ## Status precedence
//! 1. `value >= upper` → predicted failed
//! 2. `lower <= value < upper` → warning
//! 3. otherwise → normal
//!
//! ## Percent condition
//! `|upper - value| / |upper - baseline| × 100`, rounded to two decimals.
//! The warning percent equals it while `value <= lower` and is 100 otherwise.
//! A predicted-failed part scores 0 / 0. The score is unbounded unless clamping
//! to [0, 100] is enabled.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::storage::{PartStore, StorageError};
use crate::types::{ConditionStatus, PercentCondition, Sample, ThresholdProfile, Verdict};

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("no threshold profile for part {0}")]
    MissingProfile(String),

    #[error("no {feature_kind} feature history for part {part_id}")]
    MissingFeatureHistory {
        part_id: String,
        feature_kind: String,
    },

    #[error("threshold profile for part {0} has upper == baseline; percent condition is undefined")]
    DegenerateProfile(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Classify one value against a profile.
pub fn classify(value: f64, profile: &ThresholdProfile) -> ConditionStatus {
    if value >= profile.upper {
        ConditionStatus::PredictedFailed
    } else if value >= profile.lower {
        ConditionStatus::Warning
    } else {
        ConditionStatus::Normal
    }
}

/// Classify a time-stamped value; a failure records the sample's timestamp and value.
pub fn verdict_for(latest: Sample, profile: &ThresholdProfile) -> Verdict {
    match classify(latest.value, profile) {
        ConditionStatus::Normal => Verdict::Normal,
        ConditionStatus::Warning => Verdict::Warning,
        ConditionStatus::PredictedFailed => Verdict::PredictedFailed {
            at: latest.timestamp,
            value: latest.value,
        },
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Degradation metrics for `current` under `status`.
pub fn percent_condition(
    profile: &ThresholdProfile,
    current: f64,
    status: ConditionStatus,
    clamp: bool,
) -> Result<PercentCondition, ConditionError> {
    if status == ConditionStatus::PredictedFailed {
        return Ok(PercentCondition::FAILED);
    }

    let span = (profile.upper - profile.baseline).abs();
    if span == 0.0 || !span.is_finite() {
        return Err(ConditionError::DegenerateProfile(profile.part_id.clone()));
    }

    let mut percent = (profile.upper - current).abs() / span * 100.0;
    if clamp {
        percent = percent.clamp(0.0, 100.0);
    }
    let warning = if current <= profile.lower { percent } else { 100.0 };

    Ok(PercentCondition {
        percent_condition: round2(percent),
        warning_percent: round2(warning),
    })
}

/// What one classification run committed for a part.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub part_id: String,
    pub latest: Sample,
    pub verdict: Verdict,
    pub percent: PercentCondition,
}

/// Store-backed classifier for one feature kind.
#[derive(Debug, Clone)]
pub struct ConditionClassifier {
    feature_kind: String,
    clamp_percent: bool,
}

impl ConditionClassifier {
    pub fn new(feature_kind: impl Into<String>, clamp_percent: bool) -> Self {
        Self {
            feature_kind: feature_kind.into(),
            clamp_percent,
        }
    }

    pub fn feature_kind(&self) -> &str {
        &self.feature_kind
    }

    fn latest_feature<S: PartStore + ?Sized>(
        &self,
        store: &S,
        part_id: &str,
    ) -> Result<Sample, ConditionError> {
        store
            .read_feature_series(part_id, &self.feature_kind)?
            .last()
            .copied()
            .ok_or_else(|| ConditionError::MissingFeatureHistory {
                part_id: part_id.to_string(),
                feature_kind: self.feature_kind.clone(),
            })
    }

    fn profile<S: PartStore + ?Sized>(
        &self,
        store: &S,
        part_id: &str,
    ) -> Result<ThresholdProfile, ConditionError> {
        store
            .read_threshold_profile(part_id)?
            .ok_or_else(|| ConditionError::MissingProfile(part_id.to_string()))
    }

    /// Classify the part's latest feature value and commit the verdict.
    pub fn classify_part<S: PartStore + ?Sized>(
        &self,
        store: &S,
        part_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Verdict, ConditionError> {
        let profile = self.profile(store, part_id)?;
        let latest = self.latest_feature(store, part_id)?;
        let verdict = verdict_for(latest, &profile);
        store.write_condition_state(part_id, &verdict, now)?;

        match &verdict {
            Verdict::PredictedFailed { at, value } => warn!(
                part_id,
                value,
                upper = profile.upper,
                at = %at,
                "🚨 Part predicted to fail"
            ),
            v => info!(part_id, status = %v.status(), value = latest.value, "Condition classified"),
        }
        Ok(verdict)
    }

    /// Compute and commit the percent condition for `status`.
    pub fn compute_percent<S: PartStore + ?Sized>(
        &self,
        store: &S,
        part_id: &str,
        status: ConditionStatus,
    ) -> Result<PercentCondition, ConditionError> {
        let percent = if status == ConditionStatus::PredictedFailed {
            PercentCondition::FAILED
        } else {
            let profile = self.profile(store, part_id)?;
            let latest = self.latest_feature(store, part_id)?;
            percent_condition(&profile, latest.value, status, self.clamp_percent)?
        };
        store.write_percent_condition(part_id, percent)?;
        Ok(percent)
    }

    /// Classification followed by the percent computation.
    pub fn run<S: PartStore + ?Sized>(
        &self,
        store: &S,
        part_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Classification, ConditionError> {
        let latest = self.latest_feature(store, part_id)?;
        let verdict = self.classify_part(store, part_id, now)?;
        let percent = self.compute_percent(store, part_id, verdict.status())?;
        Ok(Classification {
            part_id: part_id.to_string(),
            latest,
            verdict,
            percent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use chrono::TimeZone;

    fn profile() -> ThresholdProfile {
        ThresholdProfile {
            part_id: "P-1".into(),
            upper: 100.0,
            lower: 80.0,
            baseline: 50.0,
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_classify_precedence() {
        let p = profile();
        assert_eq!(classify(70.0, &p), ConditionStatus::Normal);
        assert_eq!(classify(80.0, &p), ConditionStatus::Warning);
        assert_eq!(classify(85.0, &p), ConditionStatus::Warning);
        assert_eq!(classify(100.0, &p), ConditionStatus::PredictedFailed);
        assert_eq!(classify(101.0, &p), ConditionStatus::PredictedFailed);
    }

    #[test]
    fn test_failed_verdict_records_input_timestamp() {
        let v = verdict_for(Sample::new(at(), 101.0), &profile());
        assert_eq!(v.time_of_failure(), Some(at()));
        assert_eq!(v.failure_value(), Some(101.0));
        assert_eq!(verdict_for(Sample::new(at(), 85.0), &profile()), Verdict::Warning);
    }

    #[test]
    fn test_percent_in_safe_zone() {
        let pc = percent_condition(&profile(), 75.0, ConditionStatus::Normal, false).unwrap();
        assert_eq!(pc.percent_condition, 50.0);
        assert_eq!(pc.warning_percent, 50.0);
    }

    #[test]
    fn test_percent_in_warning_zone() {
        let pc = percent_condition(&profile(), 90.0, ConditionStatus::Warning, false).unwrap();
        assert_eq!(pc.percent_condition, 20.0);
        assert_eq!(pc.warning_percent, 100.0);
    }

    #[test]
    fn test_percent_failed_is_zero() {
        let pc = percent_condition(&profile(), 20.0, ConditionStatus::PredictedFailed, false).unwrap();
        assert_eq!(pc, PercentCondition::FAILED);
    }

    #[test]
    fn test_percent_unbounded_unless_clamped() {
        let below_baseline = 20.0;
        let raw = percent_condition(&profile(), below_baseline, ConditionStatus::Normal, false).unwrap();
        assert_eq!(raw.percent_condition, 160.0);
        let clamped = percent_condition(&profile(), below_baseline, ConditionStatus::Normal, true).unwrap();
        assert_eq!(clamped.percent_condition, 100.0);
        assert_eq!(clamped.warning_percent, 100.0);
    }

    #[test]
    fn test_percent_rounds_to_two_decimals() {
        let pc = percent_condition(&profile(), 66.666, ConditionStatus::Normal, false).unwrap();
        assert_eq!(pc.percent_condition, 66.67);
    }

    #[test]
    fn test_degenerate_profile() {
        let p = ThresholdProfile { baseline: 100.0, ..profile() };
        assert!(matches!(
            percent_condition(&p, 70.0, ConditionStatus::Normal, false),
            Err(ConditionError::DegenerateProfile(_))
        ));
        // failed parts never need the span
        assert!(percent_condition(&p, 170.0, ConditionStatus::PredictedFailed, false).is_ok());
    }

    #[test]
    fn test_run_commits_state_and_percent() {
        let store = InMemoryStore::new();
        store.write_threshold_profile(&profile()).unwrap();
        store
            .write_feature_points("P-1", "high-envelope", &[Sample::new(at(), 101.0)])
            .unwrap();

        let classifier = ConditionClassifier::new("high-envelope", false);
        let out = classifier.run(&store, "P-1", at()).unwrap();
        assert_eq!(out.verdict.status(), ConditionStatus::PredictedFailed);

        let state = store.read_condition_state("P-1").unwrap().unwrap();
        assert_eq!(state.time_of_failure(), Some(at()));
        assert_eq!(state.percent, Some(PercentCondition::FAILED));
    }

    #[test]
    fn test_normal_run_clears_failure() {
        let store = InMemoryStore::new();
        store.write_threshold_profile(&profile()).unwrap();
        store
            .write_condition_state("P-1", &Verdict::PredictedFailed { at: at(), value: 120.0 }, at())
            .unwrap();
        store
            .write_feature_points("P-1", "high-envelope", &[Sample::new(at(), 75.0)])
            .unwrap();

        let out = ConditionClassifier::new("high-envelope", false)
            .run(&store, "P-1", at())
            .unwrap();
        assert_eq!(out.verdict, Verdict::Normal);
        let state = store.read_condition_state("P-1").unwrap().unwrap();
        assert!(state.time_of_failure().is_none());
        assert_eq!(state.percent.unwrap().percent_condition, 50.0);
    }

    #[test]
    fn test_missing_preconditions() {
        let store = InMemoryStore::new();
        let classifier = ConditionClassifier::new("high-envelope", false);
        assert!(matches!(
            classifier.classify_part(&store, "P-1", at()),
            Err(ConditionError::MissingProfile(_))
        ));
        store.write_threshold_profile(&profile()).unwrap();
        assert!(matches!(
            classifier.classify_part(&store, "P-1", at()),
            Err(ConditionError::MissingFeatureHistory { .. })
        ));
        assert!(store.read_condition_state("P-1").unwrap().is_none());
    }
}
