//! Forecaster: order search, training-prefix fit and a timestamped horizon

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::arima::{FitError, FittedArima};
use super::order_search::{OrderGrid, OrderSearchError, OrderSelector};
use crate::condition::classify;
use crate::types::{resample, values_of, ForecastBatch, ForecastPoint, Sample, ThresholdProfile};

/// Where the forecast horizon starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastAnchor {
    /// One step after the last training observation
    #[default]
    TrainingEnd,
    /// One step after the last observation of the full history
    HistoryEnd,
}

/// Tunables for one forecasting run.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSettings {
    pub min_observations: usize,
    /// Leading share of the series the order search runs on
    pub search_fraction: f64,
    /// Leading share of the series the final model is fitted on
    pub train_fraction: f64,
    pub horizon_steps: usize,
    pub step: Duration,
    pub anchor: ForecastAnchor,
    pub confidence_level: f64,
    pub grid: OrderGrid,
    pub workers: Option<usize>,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            min_observations: 10,
            search_fraction: 0.5,
            train_fraction: 0.66,
            horizon_steps: 24 * 7,
            step: Duration::hours(1),
            anchor: ForecastAnchor::TrainingEnd,
            confidence_level: 0.95,
            grid: OrderGrid::default(),
            workers: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("feature series too short to forecast: have {got} points, need {needed}")]
    InsufficientData { needed: usize, got: usize },

    #[error("order search failed: {0}")]
    Search(#[from] OrderSearchError),

    #[error("no candidate order could be fitted ({tried} tried)")]
    NoViableOrder { tried: usize },

    #[error("model fit failed: {0}")]
    Fit(#[from] FitError),

    #[error("forecast horizon of {horizon} steps of {step_secs}s runs past the representable time range")]
    HorizonOutOfRange { horizon: usize, step_secs: i64 },
}

/// Length of the leading share of `len` items, rounded down, at least one.
fn prefix_len(len: usize, fraction: f64) -> usize {
    ((len as f64 * fraction).floor() as usize).clamp(1, len.max(1))
}

/// `horizon` timestamps spaced by `step`, starting one step after `last`.
pub fn horizon_timestamps(
    last: DateTime<Utc>,
    step: Duration,
    horizon: usize,
) -> Result<Vec<DateTime<Utc>>, ForecastError> {
    (1..=horizon)
        .map(|i| {
            i32::try_from(i)
                .ok()
                .and_then(|i| step.checked_mul(i))
                .and_then(|offset| last.checked_add_signed(offset))
                .ok_or(ForecastError::HorizonOutOfRange {
                    horizon,
                    step_secs: step.num_seconds(),
                })
        })
        .collect()
}

pub struct Forecaster {
    settings: ForecastSettings,
    selector: OrderSelector,
}

impl Forecaster {
    pub fn new(settings: ForecastSettings) -> Self {
        let selector = OrderSelector::new(settings.workers);
        Self { settings, selector }
    }

    pub fn settings(&self) -> &ForecastSettings {
        &self.settings
    }

    /// Forecast a feature series for `(part_id, feature_kind)`.
    ///
    /// At least `min_observations` feature points are required before the
    /// series is resampled onto the step grid. The order is chosen on the
    /// search prefix and the model is fitted on the training prefix. Each
    /// point is tagged by classifying its predicted value when `profile` is
    /// given.
    pub fn forecast_series(
        &self,
        part_id: &str,
        feature_kind: &str,
        series: &[Sample],
        profile: Option<&ThresholdProfile>,
        generated_at: DateTime<Utc>,
    ) -> Result<ForecastBatch, ForecastError> {
        let s = &self.settings;
        // forward-filled grid points are not observations
        if series.len() < s.min_observations {
            return Err(ForecastError::InsufficientData {
                needed: s.min_observations,
                got: series.len(),
            });
        }
        let grid_series = resample(series, s.step);
        if grid_series.len() < s.min_observations {
            return Err(ForecastError::InsufficientData {
                needed: s.min_observations,
                got: grid_series.len(),
            });
        }
        let values = values_of(&grid_series);

        let search_len = prefix_len(values.len(), s.search_fraction);
        let search = self.selector.select(&values[..search_len], &s.grid)?;
        if !search.is_reliable() {
            return Err(ForecastError::NoViableOrder {
                tried: search.candidates.len(),
            });
        }
        debug!(
            part_id,
            feature_kind,
            order = %search.best,
            aic = search.best_score,
            failed = search.failed_count(),
            "order selected"
        );

        let train_len = prefix_len(values.len(), s.train_fraction);
        let model = FittedArima::fit(&values[..train_len], search.best)?;

        let anchor = match s.anchor {
            ForecastAnchor::TrainingEnd => grid_series[train_len - 1].timestamp,
            ForecastAnchor::HistoryEnd => grid_series[grid_series.len() - 1].timestamp,
        };
        // from the history end the model must first cover the held-out steps
        let skip = match s.anchor {
            ForecastAnchor::TrainingEnd => 0,
            ForecastAnchor::HistoryEnd => grid_series.len() - train_len,
        };

        let timestamps = horizon_timestamps(anchor, s.step, s.horizon_steps)?;
        let predicted = model.forecast_with_intervals(skip + s.horizon_steps, s.confidence_level);
        let points: Vec<ForecastPoint> = timestamps
            .into_iter()
            .zip(predicted.into_iter().skip(skip))
            .map(|(timestamp, f)| ForecastPoint {
                timestamp,
                value: f.value,
                lower: f.lower,
                upper: f.upper,
                status: profile.map(|p| classify(f.value, p)),
            })
            .collect();

        info!(
            part_id,
            feature_kind,
            order = %model.order(),
            aic = model.aic(),
            train = train_len,
            horizon = points.len(),
            "📈 Forecast produced"
        );

        Ok(ForecastBatch {
            part_id: part_id.to_string(),
            feature_kind: feature_kind.to_string(),
            order: model.order(),
            aic: model.aic(),
            confidence_level: s.confidence_level,
            generated_at,
            points,
        })
    }
}
