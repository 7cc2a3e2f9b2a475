//! Per-part pipeline runner
//!
//! ```text
//! signal ─► resample ─► envelope extraction ─► feature points
//!                                                  │
//!                     order search + fit ◄─────────┤
//!                            │                     │
//!                            ▼                     ▼
//!                     forecast batch        condition classifier
//!                    (atomic replace)     (verdict + percent record)
//! ```
//!
//! Every stage of every part is isolated, and so is every forecast kind: a
//! failure is logged and recorded in the [`PartReport`], then the run carries
//! on with the next kind, stage and part.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::error::{ErrorClass, PipelineError};
use crate::condition::{Classification, ConditionClassifier};
use crate::config::{FeatureKindConfig, PipelineConfig};
use crate::envelope::high_envelope_points;
use crate::forecast::Forecaster;
use crate::storage::PartStore;
use crate::types::{resample, ForecastBatch, Sample};

/// Fewest resampled readings envelope extraction can work with.
const MIN_SIGNAL_LEN: usize = 3;

/// Feature points written for one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindExtraction {
    pub feature_kind: String,
    pub written: usize,
    /// Points removed before re-insertion (full-history kinds only)
    pub replaced: usize,
}

/// Forecast outcome for one kind.
#[derive(Debug)]
pub struct KindForecast {
    pub feature_kind: String,
    pub batch: Result<ForecastBatch, PipelineError>,
}

/// Outcome of every stage for one part.
#[derive(Debug)]
pub struct PartReport {
    pub part_id: String,
    pub extraction: Result<Vec<KindExtraction>, PipelineError>,
    pub forecast: Vec<KindForecast>,
    pub condition: Result<Classification, PipelineError>,
}

impl PartReport {
    pub fn errors(&self) -> Vec<&PipelineError> {
        self.extraction
            .as_ref()
            .err()
            .into_iter()
            .chain(self.forecast.iter().filter_map(|k| k.batch.as_ref().err()))
            .chain(self.condition.as_ref().err())
            .collect()
    }

    pub fn is_ok(&self) -> bool {
        self.errors().is_empty()
    }
}

/// Result of [`Pipeline::run_all`].
#[derive(Debug)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub parts: Vec<PartReport>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.parts.iter().filter(|p| p.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.parts.len() - self.succeeded()
    }

    /// Number of failed stages of the given class across all parts.
    pub fn count(&self, class: ErrorClass) -> usize {
        self.parts
            .iter()
            .flat_map(|p| p.errors())
            .filter(|e| e.class() == class)
            .count()
    }

    pub fn part(&self, part_id: &str) -> Option<&PartReport> {
        self.parts.iter().find(|p| p.part_id == part_id)
    }
}

/// Pipeline over a part store, driven by a loaded configuration.
pub struct Pipeline<'a, S: PartStore + ?Sized> {
    store: &'a S,
    config: &'a PipelineConfig,
    forecaster: Forecaster,
    classifier: ConditionClassifier,
}

impl<'a, S: PartStore + ?Sized> Pipeline<'a, S> {
    pub fn new(store: &'a S, config: &'a PipelineConfig) -> Self {
        Self {
            store,
            config,
            forecaster: Forecaster::new(config.forecast_settings()),
            classifier: ConditionClassifier::new(
                config.condition.feature_kind.clone(),
                config.condition.clamp_percent,
            ),
        }
    }

    pub fn store(&self) -> &S {
        self.store
    }

    /// Write every configured threshold profile into the store.
    pub fn seed_profiles(&self) -> Result<usize, PipelineError> {
        for profile in &self.config.parts {
            self.store.write_threshold_profile(profile)?;
        }
        info!(count = self.config.parts.len(), backend = self.store.backend_name(), "Threshold profiles seeded");
        Ok(self.config.parts.len())
    }

    /// Extract every configured feature kind from the part's signal.
    pub fn extract_features(
        &self,
        part_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<KindExtraction>, PipelineError> {
        let signal = resample(&self.store.read_signal(part_id)?, self.config.forecast.step());
        if signal.len() < MIN_SIGNAL_LEN {
            return Err(PipelineError::InsufficientSignal {
                part_id: part_id.to_string(),
                needed: MIN_SIGNAL_LEN,
                got: signal.len(),
            });
        }

        self.config
            .feature_kinds
            .iter()
            .map(|kind| self.extract_kind(part_id, kind, &signal, now))
            .collect()
    }

    fn extract_kind(
        &self,
        part_id: &str,
        kind: &FeatureKindConfig,
        signal: &[Sample],
        now: DateTime<Utc>,
    ) -> Result<KindExtraction, PipelineError> {
        let (series, replaced) = match kind.window() {
            Some(window) => {
                let start = now - window;
                let windowed: Vec<Sample> = signal
                    .iter()
                    .filter(|s| s.timestamp > start && s.timestamp <= now)
                    .copied()
                    .collect();
                (windowed, 0)
            }
            None => {
                let removed = self.store.delete_feature_points(part_id, &kind.id)?;
                (signal.to_vec(), removed)
            }
        };

        let points: Vec<Sample> = high_envelope_points(part_id, &kind.id, &series, kind.envelope_params())
            .iter()
            .map(|p| p.sample())
            .collect();
        let written = self.store.write_feature_points(part_id, &kind.id, &points)?;

        debug!(part_id, feature_kind = %kind.id, input = series.len(), written, replaced, "features extracted");
        Ok(KindExtraction {
            feature_kind: kind.id.clone(),
            written,
            replaced,
        })
    }

    /// Forecast every feature kind flagged for forecasting.
    ///
    /// Kinds are independent: one failing does not skip the rest. A failed
    /// fit leaves that key's previous batch untouched.
    pub fn forecast(&self, part_id: &str, now: DateTime<Utc>) -> Vec<KindForecast> {
        self.config
            .feature_kinds
            .iter()
            .filter(|k| k.forecast)
            .map(|kind| KindForecast {
                feature_kind: kind.id.clone(),
                batch: self.forecast_kind(part_id, &kind.id, now),
            })
            .collect()
    }

    fn forecast_kind(
        &self,
        part_id: &str,
        feature_kind: &str,
        now: DateTime<Utc>,
    ) -> Result<ForecastBatch, PipelineError> {
        let profile = self.store.read_threshold_profile(part_id)?;
        let series = self.store.read_feature_series(part_id, feature_kind)?;
        let batch = self
            .forecaster
            .forecast_series(part_id, feature_kind, &series, profile.as_ref(), now)
            .map_err(|source| PipelineError::Forecast {
                part_id: part_id.to_string(),
                feature_kind: feature_kind.to_string(),
                source,
            })?;

        self.store.replace_forecast_batch(&batch)?;
        if let Some(failure) = batch.first_failure() {
            warn!(
                part_id,
                feature_kind,
                at = %failure.timestamp,
                value = failure.value,
                "⚠️ Forecast crosses the failure threshold"
            );
        }
        Ok(batch)
    }

    /// Classify the part's latest feature value and record its percent condition.
    pub fn classify(
        &self,
        part_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Classification, PipelineError> {
        if self.config.feature_kind(self.classifier.feature_kind()).is_none() {
            return Err(PipelineError::UnknownFeatureKind(
                self.classifier.feature_kind().to_string(),
            ));
        }
        self.classifier
            .run(self.store, part_id, now)
            .map_err(|source| PipelineError::Condition {
                part_id: part_id.to_string(),
                source,
            })
    }

    /// Run every stage for one part; each stage runs regardless of the others.
    pub fn run_part(&self, part_id: &str, now: DateTime<Utc>) -> PartReport {
        let report = PartReport {
            part_id: part_id.to_string(),
            extraction: self.extract_features(part_id, now),
            forecast: self.forecast(part_id, now),
            condition: self.classify(part_id, now),
        };

        for e in report.errors() {
            warn!(part_id, class = %e.class(), error = %e, "Stage failed");
        }
        if let Ok(c) = &report.condition {
            info!(
                part_id,
                status = %c.verdict.status(),
                percent = c.percent.percent_condition,
                warning_percent = c.percent.warning_percent,
                "✅ Part processed"
            );
        }
        report
    }

    /// Run every part known to the store, one after another.
    pub fn run_all(&self, now: DateTime<Utc>) -> Result<RunSummary, PipelineError> {
        let part_ids = self.store.list_parts()?;
        info!(parts = part_ids.len(), backend = self.store.backend_name(), "🚀 Pipeline run started");

        let parts: Vec<PartReport> = part_ids.iter().map(|id| self.run_part(id, now)).collect();
        let summary = RunSummary {
            started_at: now,
            parts,
        };

        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            data_insufficiency = summary.count(ErrorClass::DataInsufficiency),
            fit_failure = summary.count(ErrorClass::FitFailure),
            "Pipeline run finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use crate::types::ThresholdProfile;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 21, 0, 0, 0).unwrap()
    }

    fn oscillating(hours: i64) -> Vec<Sample> {
        (0..hours)
            .map(|h| {
                let x = h as f64;
                Sample::new(t0() + Duration::hours(h), 60.0 + 0.05 * x + 5.0 * (x * 0.9).sin())
            })
            .collect()
    }

    fn config() -> PipelineConfig {
        let mut c = PipelineConfig::default();
        c.forecast.horizon_steps = 24;
        c.order_search.p = [0, 2];
        c.order_search.q = [0, 2];
        c.parts.push(ThresholdProfile {
            part_id: "P-1".into(),
            upper: 100.0,
            lower: 80.0,
            baseline: 50.0,
        });
        c
    }

    #[test]
    fn test_windowed_kind_only_sees_window() {
        let store = InMemoryStore::new();
        store.append_signal("P-1", &oscillating(200)).unwrap();
        let cfg = config();
        let pipeline = Pipeline::new(&store, &cfg);
        let now = t0() + Duration::hours(199);

        let out = pipeline.extract_features("P-1", now).unwrap();
        assert_eq!(out.len(), 2);

        let windowed = store.read_feature_series("P-1", "high-envelope-6h").unwrap();
        assert!(windowed.iter().all(|s| s.timestamp > now - Duration::hours(6)));
        let full = store.read_feature_series("P-1", "high-envelope").unwrap();
        assert!(full.len() > windowed.len());
    }

    #[test]
    fn test_full_kind_is_replaced_not_appended() {
        let store = InMemoryStore::new();
        store.append_signal("P-1", &oscillating(100)).unwrap();
        let cfg = config();
        let pipeline = Pipeline::new(&store, &cfg);

        let first = pipeline.extract_features("P-1", t0()).unwrap();
        let second = pipeline.extract_features("P-1", t0()).unwrap();
        assert_eq!(second[0].replaced, first[0].written);
        assert_eq!(
            store.read_feature_series("P-1", "high-envelope").unwrap().len(),
            first[0].written
        );
    }

    #[test]
    fn test_short_signal_is_data_insufficiency() {
        let store = InMemoryStore::new();
        store.append_signal("P-1", &oscillating(2)).unwrap();
        let cfg = config();
        let err = Pipeline::new(&store, &cfg)
            .extract_features("P-1", t0())
            .unwrap_err();
        assert_eq!(err.class(), ErrorClass::DataInsufficiency);
    }

    #[test]
    fn test_run_part_end_to_end() {
        let store = InMemoryStore::new();
        store.append_signal("P-1", &oscillating(240)).unwrap();
        let cfg = config();
        let pipeline = Pipeline::new(&store, &cfg);
        pipeline.seed_profiles().unwrap();

        let report = pipeline.run_part("P-1", t0() + Duration::hours(240));
        assert!(report.is_ok(), "{:?}", report.errors());

        let batch = store.read_forecast_batch("P-1", "high-envelope").unwrap().unwrap();
        assert_eq!(batch.len(), 24);
        let state = store.read_condition_state("P-1").unwrap().unwrap();
        assert!(state.percent.is_some());
    }

    #[test]
    fn test_failed_forecast_keeps_previous_batch() {
        let store = InMemoryStore::new();
        store.append_signal("P-1", &oscillating(240)).unwrap();
        let cfg = config();
        let pipeline = Pipeline::new(&store, &cfg);
        pipeline.extract_features("P-1", t0()).unwrap();
        let good = pipeline.forecast("P-1", t0()).remove(0).batch.unwrap();

        // wipe the features so the next forecast has nothing to fit
        store.delete_feature_points("P-1", "high-envelope").unwrap();
        let err = pipeline.forecast("P-1", t0()).remove(0).batch.unwrap_err();
        assert_eq!(err.class(), ErrorClass::DataInsufficiency);

        let live = store.read_forecast_batch("P-1", "high-envelope").unwrap().unwrap();
        assert_eq!(live, good);
    }

    #[test]
    fn test_failing_kind_does_not_skip_later_kinds() {
        let store = InMemoryStore::new();
        store.append_signal("P-1", &oscillating(240)).unwrap();
        let mut cfg = config();
        let kind = |id: &str| FeatureKindConfig {
            id: id.into(),
            window_hours: None,
            chunk_size: 1,
            split_at_mean: false,
            forecast: true,
        };
        cfg.feature_kinds = vec![kind("a-empty"), kind("b-good")];
        cfg.condition.feature_kind = "b-good".into();
        let pipeline = Pipeline::new(&store, &cfg);

        pipeline.extract_features("P-1", t0()).unwrap();
        store.delete_feature_points("P-1", "a-empty").unwrap();

        let out = pipeline.forecast("P-1", t0());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].feature_kind, "a-empty");
        assert_eq!(
            out[0].batch.as_ref().unwrap_err().class(),
            ErrorClass::DataInsufficiency
        );
        assert_eq!(out[1].feature_kind, "b-good");
        let good = out[1].batch.as_ref().unwrap();
        assert_eq!(good.len(), 24);

        assert!(store.read_forecast_batch("P-1", "a-empty").unwrap().is_none());
        let stored = store.read_forecast_batch("P-1", "b-good").unwrap().unwrap();
        assert_eq!(&stored, good);
    }

    #[test]
    fn test_run_all_isolates_parts() {
        let store = InMemoryStore::new();
        store.append_signal("P-1", &oscillating(240)).unwrap();
        store.append_signal("P-2", &oscillating(2)).unwrap();
        let cfg = config();
        let pipeline = Pipeline::new(&store, &cfg);
        pipeline.seed_profiles().unwrap();

        let summary = pipeline.run_all(t0() + Duration::hours(240)).unwrap();
        assert_eq!(summary.parts.len(), 2);
        assert!(summary.part("P-1").unwrap().is_ok());

        let p2 = summary.part("P-2").unwrap();
        assert!(p2.extraction.is_err());
        assert!(p2.forecast[0].batch.is_err());
        assert_eq!(p2.errors().len(), 3);
        assert_eq!(
            p2.condition.as_ref().unwrap_err().class(),
            ErrorClass::ClassificationPrecondition
        );
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed(), 1);
    }
}
