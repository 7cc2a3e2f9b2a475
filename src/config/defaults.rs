//! Built-in configuration defaults.
//!
//! Grouped by section of `partwatch.toml`.

// ============================================================================
// Loading
// ============================================================================

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "PARTWATCH_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "partwatch.toml";

/// Maximum edit distance for "did you mean" suggestions on unknown keys.
pub const MAX_SUGGESTION_DISTANCE: usize = 3;

// ============================================================================
// Storage
// ============================================================================

pub const DATA_DIR: &str = "./data/partwatch";

// ============================================================================
// Feature kinds
// ============================================================================

/// Full-history high envelope: forecasted and classified.
pub const PRIMARY_FEATURE_KIND: &str = "high-envelope";

/// Rolling-window high envelope.
pub const WINDOWED_FEATURE_KIND: &str = "high-envelope-6h";

pub const WINDOWED_FEATURE_HOURS: u32 = 6;

pub const CHUNK_SIZE: usize = 1;

// ============================================================================
// Forecasting
// ============================================================================

/// Feature observations (after resampling) required before forecasting.
pub const MIN_OBSERVATIONS: usize = 10;

/// Leading share of the series used for the order search.
pub const SEARCH_FRACTION: f64 = 0.5;

/// Leading share of the series used to fit the forecasting model.
pub const TRAIN_FRACTION: f64 = 0.66;

/// One week of hourly steps.
pub const HORIZON_STEPS: usize = 24 * 7;

pub const STEP_SECS: u64 = 3_600;

/// Upper bounds keeping every horizon timestamp inside chrono's range.
pub const MAX_STEP_SECS: u64 = 366 * 24 * 3_600;
pub const MAX_HORIZON_STEPS: usize = 100_000;

pub const CONFIDENCE_LEVEL: f64 = 0.95;

// ============================================================================
// Order search (half-open ranges)
// ============================================================================

pub const P_RANGE: [usize; 2] = [0, 3];
pub const D_RANGE: [usize; 2] = [0, 2];
pub const Q_RANGE: [usize; 2] = [0, 3];
