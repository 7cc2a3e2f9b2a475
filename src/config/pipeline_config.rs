//! Pipeline configuration loaded from TOML
//!
//! Every section is optional; an empty file yields the built-in defaults.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;
use super::validation::{validate_unknown_keys, validate_value_ranges};
use crate::envelope::EnvelopeParams;
use crate::forecast::{ForecastAnchor, ForecastSettings, OrderGrid};
use crate::types::ThresholdProfile;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration.
///
/// Load with [`PipelineConfig::load`], which searches:
/// 1. `$PARTWATCH_CONFIG`
/// 2. `./partwatch.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    /// Envelope extraction configurations, one per feature kind
    #[serde(default = "default_feature_kinds")]
    pub feature_kinds: Vec<FeatureKindConfig>,

    #[serde(default)]
    pub forecast: ForecastConfig,

    #[serde(default)]
    pub order_search: OrderSearchConfig,

    #[serde(default)]
    pub condition: ConditionConfig,

    /// Per-part threshold profiles
    #[serde(default)]
    pub parts: Vec<ThresholdProfile>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            feature_kinds: default_feature_kinds(),
            forecast: ForecastConfig::default(),
            order_search: OrderSearchConfig::default(),
            condition: ConditionConfig::default(),
            parts: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Load using the standard search order, falling back on any failure.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), parts = config.parts.len(), "Loaded config from {}", defaults::CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", defaults::CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", defaults::CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(defaults::LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(parts = config.parts.len(), "Loaded config from ./{}", defaults::LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", defaults::LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No config file found, using built-in defaults");
        Self::default()
    }

    /// An explicitly named file must load; otherwise use [`load`](Self::load).
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => {
                let config = Self::load_from_file(path)?;
                info!(path = %path.display(), parts = config.parts.len(), "Loaded config");
                Ok(config)
            }
            None => Ok(Self::load()),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate TOML text. Unknown keys are logged, not rejected.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Reject impossible values; log suspicious ones.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (errors, warnings) = validate_value_ranges(self);
        for w in &warnings {
            warn!("{}", w);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    pub fn feature_kind(&self, id: &str) -> Option<&FeatureKindConfig> {
        self.feature_kinds.iter().find(|k| k.id == id)
    }

    pub fn profile(&self, part_id: &str) -> Option<&ThresholdProfile> {
        self.parts.iter().find(|p| p.part_id == part_id)
    }

    pub fn forecast_settings(&self) -> ForecastSettings {
        let f = &self.forecast;
        ForecastSettings {
            min_observations: f.min_observations,
            search_fraction: f.search_fraction,
            train_fraction: f.train_fraction,
            horizon_steps: f.horizon_steps,
            step: f.step(),
            anchor: f.anchor,
            confidence_level: f.confidence_level,
            grid: self.order_search.grid(),
            workers: self.order_search.workers,
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of the sled database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(defaults::DATA_DIR)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// One envelope-extraction configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureKindConfig {
    pub id: String,

    /// Extract over the trailing window only (append-only); absent means the
    /// full history, recomputed and replaced on every run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_hours: Option<u32>,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default)]
    pub split_at_mean: bool,

    /// Produce forecasts for this kind
    #[serde(default)]
    pub forecast: bool,
}

fn default_chunk_size() -> usize {
    defaults::CHUNK_SIZE
}

impl FeatureKindConfig {
    pub fn envelope_params(&self) -> EnvelopeParams {
        EnvelopeParams {
            chunk_size: self.chunk_size,
            split_at_mean: self.split_at_mean,
        }
    }

    pub fn window(&self) -> Option<Duration> {
        self.window_hours.map(|h| Duration::hours(i64::from(h)))
    }
}

fn default_feature_kinds() -> Vec<FeatureKindConfig> {
    vec![
        FeatureKindConfig {
            id: defaults::PRIMARY_FEATURE_KIND.to_string(),
            window_hours: None,
            chunk_size: defaults::CHUNK_SIZE,
            split_at_mean: false,
            forecast: true,
        },
        FeatureKindConfig {
            id: defaults::WINDOWED_FEATURE_KIND.to_string(),
            window_hours: Some(defaults::WINDOWED_FEATURE_HOURS),
            chunk_size: defaults::CHUNK_SIZE,
            split_at_mean: false,
            forecast: false,
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,

    #[serde(default = "default_search_fraction")]
    pub search_fraction: f64,

    #[serde(default = "default_train_fraction")]
    pub train_fraction: f64,

    #[serde(default = "default_horizon_steps")]
    pub horizon_steps: usize,

    /// Resampling grid and forecast step width
    #[serde(default = "default_step_secs")]
    pub step_secs: u64,

    #[serde(default)]
    pub anchor: ForecastAnchor,

    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
}

fn default_min_observations() -> usize { defaults::MIN_OBSERVATIONS }
fn default_search_fraction() -> f64 { defaults::SEARCH_FRACTION }
fn default_train_fraction() -> f64 { defaults::TRAIN_FRACTION }
fn default_horizon_steps() -> usize { defaults::HORIZON_STEPS }
fn default_step_secs() -> u64 { defaults::STEP_SECS }
fn default_confidence_level() -> f64 { defaults::CONFIDENCE_LEVEL }

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_observations: default_min_observations(),
            search_fraction: default_search_fraction(),
            train_fraction: default_train_fraction(),
            horizon_steps: default_horizon_steps(),
            step_secs: default_step_secs(),
            anchor: ForecastAnchor::default(),
            confidence_level: default_confidence_level(),
        }
    }
}

impl ForecastConfig {
    pub fn step(&self) -> Duration {
        i64::try_from(self.step_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }
}

/// Half-open `[start, end)` ranges of the order grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSearchConfig {
    #[serde(default = "default_p_range")]
    pub p: [usize; 2],

    #[serde(default = "default_d_range")]
    pub d: [usize; 2],

    #[serde(default = "default_q_range")]
    pub q: [usize; 2],

    /// Worker threads; absent uses every core
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

fn default_p_range() -> [usize; 2] { defaults::P_RANGE }
fn default_d_range() -> [usize; 2] { defaults::D_RANGE }
fn default_q_range() -> [usize; 2] { defaults::Q_RANGE }

impl Default for OrderSearchConfig {
    fn default() -> Self {
        Self {
            p: default_p_range(),
            d: default_d_range(),
            q: default_q_range(),
            workers: None,
        }
    }
}

impl OrderSearchConfig {
    pub fn grid(&self) -> OrderGrid {
        OrderGrid::new(self.p[0]..self.p[1], self.d[0]..self.d[1], self.q[0]..self.q[1])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionConfig {
    /// Feature kind whose latest value is classified
    #[serde(default = "default_condition_feature_kind")]
    pub feature_kind: String,

    /// Clamp the percent condition to [0, 100]
    #[serde(default)]
    pub clamp_percent: bool,
}

fn default_condition_feature_kind() -> String {
    defaults::PRIMARY_FEATURE_KIND.to_string()
}

impl Default for ConditionConfig {
    fn default() -> Self {
        Self {
            feature_kind: default_condition_feature_kind(),
            clamp_percent: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.feature_kinds.len(), 2);
        assert!(config.feature_kind("high-envelope").unwrap().forecast);
        assert_eq!(
            config.feature_kind("high-envelope-6h").unwrap().window(),
            Some(Duration::hours(6))
        );
    }

    #[test]
    fn test_forecast_settings_follow_config() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [forecast]
            horizon_steps = 48
            step_secs = 1800
            anchor = "history_end"

            [order_search]
            p = [0, 2]
            workers = 4
            "#,
        )
        .unwrap();
        let s = config.forecast_settings();
        assert_eq!(s.horizon_steps, 48);
        assert_eq!(s.step, Duration::minutes(30));
        assert_eq!(s.anchor, ForecastAnchor::HistoryEnd);
        assert_eq!(s.grid.len(), 2 * 2 * 3);
        assert_eq!(s.workers, Some(4));
        assert_eq!(s.train_fraction, defaults::TRAIN_FRACTION);
    }

    #[test]
    fn test_round_trip_through_toml() {
        let mut config = PipelineConfig::default();
        config.parts.push(ThresholdProfile {
            part_id: "P-1".into(),
            upper: 100.0,
            lower: 80.0,
            baseline: 50.0,
        });
        let text = config.to_toml().unwrap();
        assert_eq!(PipelineConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_validation_error_lists_every_problem() {
        let err = PipelineConfig::from_toml_str(
            r#"
            [forecast]
            train_fraction = 1.5
            horizon_steps = 0
            "#,
        )
        .unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            PipelineConfig::from_toml_str("[forecast\nhorizon_steps = 3"),
            Err(ConfigError::Parse(..))
        ));
    }
}
