//! In-memory store for tests and one-shot runs
//!
//! Thread-safe via `RwLock`. Not durable: data is lost on drop.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::{PartStore, StorageError};
use crate::types::{
    ConditionState, ForecastBatch, PercentCondition, Sample, ThresholdProfile, Verdict,
};

type Series = BTreeMap<DateTime<Utc>, f64>;
type FeatureKey = (String, String);

#[derive(Default)]
pub struct InMemoryStore {
    signals: RwLock<HashMap<String, Series>>,
    features: RwLock<HashMap<FeatureKey, Series>>,
    forecasts: RwLock<HashMap<FeatureKey, ForecastBatch>>,
    profiles: RwLock<HashMap<String, ThresholdProfile>>,
    conditions: RwLock<HashMap<String, ConditionState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Storage(e.to_string())
}

fn to_samples(series: Option<&Series>) -> Vec<Sample> {
    series
        .map(|s| s.iter().map(|(ts, v)| Sample::new(*ts, *v)).collect())
        .unwrap_or_default()
}

fn key(part_id: &str, feature_kind: &str) -> FeatureKey {
    (part_id.to_string(), feature_kind.to_string())
}

impl PartStore for InMemoryStore {
    fn list_parts(&self) -> Result<Vec<String>, StorageError> {
        let signals = self.signals.read().map_err(poisoned)?;
        let profiles = self.profiles.read().map_err(poisoned)?;
        let parts: BTreeSet<String> = signals.keys().chain(profiles.keys()).cloned().collect();
        Ok(parts.into_iter().collect())
    }

    fn read_signal(&self, part_id: &str) -> Result<Vec<Sample>, StorageError> {
        let signals = self.signals.read().map_err(poisoned)?;
        Ok(to_samples(signals.get(part_id)))
    }

    fn append_signal(&self, part_id: &str, samples: &[Sample]) -> Result<usize, StorageError> {
        let mut signals = self.signals.write().map_err(poisoned)?;
        let series = signals.entry(part_id.to_string()).or_default();
        for s in samples {
            series.insert(s.timestamp, s.value);
        }
        Ok(samples.len())
    }

    fn read_feature_series(
        &self,
        part_id: &str,
        feature_kind: &str,
    ) -> Result<Vec<Sample>, StorageError> {
        let features = self.features.read().map_err(poisoned)?;
        Ok(to_samples(features.get(&key(part_id, feature_kind))))
    }

    fn write_feature_points(
        &self,
        part_id: &str,
        feature_kind: &str,
        points: &[Sample],
    ) -> Result<usize, StorageError> {
        let mut features = self.features.write().map_err(poisoned)?;
        let series = features.entry(key(part_id, feature_kind)).or_default();
        for p in points {
            series.insert(p.timestamp, p.value);
        }
        Ok(points.len())
    }

    fn delete_feature_points(
        &self,
        part_id: &str,
        feature_kind: &str,
    ) -> Result<usize, StorageError> {
        let mut features = self.features.write().map_err(poisoned)?;
        Ok(features
            .remove(&key(part_id, feature_kind))
            .map(|s| s.len())
            .unwrap_or(0))
    }

    fn read_forecast_batch(
        &self,
        part_id: &str,
        feature_kind: &str,
    ) -> Result<Option<ForecastBatch>, StorageError> {
        let forecasts = self.forecasts.read().map_err(poisoned)?;
        Ok(forecasts.get(&key(part_id, feature_kind)).cloned())
    }

    fn replace_forecast_batch(&self, batch: &ForecastBatch) -> Result<(), StorageError> {
        let mut forecasts = self.forecasts.write().map_err(poisoned)?;
        forecasts.insert(key(&batch.part_id, &batch.feature_kind), batch.clone());
        Ok(())
    }

    fn read_threshold_profile(
        &self,
        part_id: &str,
    ) -> Result<Option<ThresholdProfile>, StorageError> {
        let profiles = self.profiles.read().map_err(poisoned)?;
        Ok(profiles.get(part_id).cloned())
    }

    fn write_threshold_profile(&self, profile: &ThresholdProfile) -> Result<(), StorageError> {
        let mut profiles = self.profiles.write().map_err(poisoned)?;
        profiles.insert(profile.part_id.clone(), profile.clone());
        Ok(())
    }

    fn read_condition_state(&self, part_id: &str) -> Result<Option<ConditionState>, StorageError> {
        let conditions = self.conditions.read().map_err(poisoned)?;
        Ok(conditions.get(part_id).cloned())
    }

    fn write_condition_state(
        &self,
        part_id: &str,
        verdict: &Verdict,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut conditions = self.conditions.write().map_err(poisoned)?;
        conditions.insert(
            part_id.to_string(),
            ConditionState {
                part_id: part_id.to_string(),
                verdict: verdict.clone(),
                percent: None,
                updated_at,
            },
        );
        Ok(())
    }

    fn write_percent_condition(
        &self,
        part_id: &str,
        percent: PercentCondition,
    ) -> Result<(), StorageError> {
        let mut conditions = self.conditions.write().map_err(poisoned)?;
        let state = conditions
            .get_mut(part_id)
            .ok_or_else(|| StorageError::NoConditionRecord(part_id.to_string()))?;
        state.percent = Some(percent);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}

#[cfg(test)]
mod tests {
    use super::super::conformance;
    use super::*;

    #[test]
    fn test_signal_round_trip() {
        conformance::signal_round_trip(&InMemoryStore::new());
    }

    #[test]
    fn test_feature_points() {
        conformance::feature_points_are_keyed_by_kind(&InMemoryStore::new());
    }

    #[test]
    fn test_forecast_replace() {
        conformance::forecast_replace_is_wholesale(&InMemoryStore::new());
    }

    #[test]
    fn test_condition_record() {
        conformance::condition_record_lifecycle(&InMemoryStore::new());
    }

    #[test]
    fn test_profiles() {
        conformance::profiles_register_parts(&InMemoryStore::new());
    }

    #[test]
    fn test_trait_object() {
        let store: Box<dyn PartStore> = Box::new(InMemoryStore::new());
        assert_eq!(store.backend_name(), "InMemory");
        store
            .append_signal("P-1", &[Sample::new(conformance::t(0), 1.0)])
            .unwrap();
        assert_eq!(store.read_signal("P-1").unwrap().len(), 1);
    }
}
