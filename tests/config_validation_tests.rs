//! Config Validation Tests
//!
//! Typo detection on the raw TOML and range validation on the typed config,
//! exercised independently from the rest of the pipeline.

use partwatch::config::validation::{
    known_config_keys, suggest_correction, validate_unknown_keys, validate_value_ranges,
};
use partwatch::config::{ConfigError, PipelineConfig};
use partwatch::forecast::ForecastAnchor;

const FULL_CONFIG: &str = r#"
[storage]
data_dir = "/var/lib/partwatch"

[[feature_kinds]]
id = "high-envelope"
chunk_size = 1
split_at_mean = false
forecast = true

[[feature_kinds]]
id = "high-envelope-6h"
window_hours = 6
chunk_size = 1

[forecast]
min_observations = 12
search_fraction = 0.5
train_fraction = 0.66
horizon_steps = 168
step_secs = 3600
anchor = "history_end"
confidence_level = 0.9

[order_search]
p = [0, 3]
d = [0, 2]
q = [0, 3]
workers = 4

[condition]
feature_kind = "high-envelope"
clamp_percent = true

[[parts]]
part_id = "P-1"
upper = 100.0
lower = 80.0
baseline = 50.0

[[parts]]
part_id = "P-2"
upper = 12.5
lower = 10.0
baseline = 4.0
"#;

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn full_config_produces_zero_warnings() {
    let warnings = validate_unknown_keys(FULL_CONFIG);
    assert!(
        warnings.is_empty(),
        "Valid config should produce 0 warnings, got: {:?}",
        warnings.iter().map(|w| &w.field).collect::<Vec<_>>()
    );
}

#[test]
fn typo_in_section_key_warns_with_suggestion() {
    let warnings = validate_unknown_keys(
        r#"
[forecast]
horizn_steps = 24
"#,
    );
    assert_eq!(warnings.len(), 1, "Expected exactly 1 warning");
    assert_eq!(warnings[0].field, "forecast.horizn_steps");
    assert_eq!(warnings[0].suggestion.as_deref(), Some("forecast.horizon_steps"));
}

#[test]
fn typo_inside_array_of_tables_warns() {
    let warnings = validate_unknown_keys(
        r#"
[[parts]]
part_id = "P-1"
uper = 100.0
lower = 80.0
baseline = 50.0
"#,
    );
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].field, "parts.uper");
    assert_eq!(warnings[0].suggestion.as_deref(), Some("parts.upper"));
}

#[test]
fn unknown_section_warns_without_suggestion() {
    let warnings = validate_unknown_keys(
        r#"
[dashboard]
refresh_interval_seconds = 5
"#,
    );
    assert!(warnings.iter().any(|w| w.field == "dashboard"));
    assert!(warnings.iter().all(|w| w.suggestion.is_none()));
}

#[test]
fn malformed_toml_is_left_to_the_typed_parse() {
    assert!(validate_unknown_keys("[forecast\nhorizon_steps = ").is_empty());
    assert!(matches!(
        PipelineConfig::from_toml_str("[forecast\nhorizon_steps = "),
        Err(ConfigError::Parse(..))
    ));
}

#[test]
fn suggestion_respects_distance_limit() {
    let known = known_config_keys();
    assert_eq!(
        suggest_correction("condition.clamp_percnt", &known).as_deref(),
        Some("condition.clamp_percent")
    );
    assert!(suggest_correction("completely_unrelated_key", &known).is_none());
}

// ============================================================================
// Typed Parse + Range Validation
// ============================================================================

#[test]
fn full_config_round_trips() {
    let config = PipelineConfig::from_toml_str(FULL_CONFIG).unwrap();
    assert_eq!(config.forecast.anchor, ForecastAnchor::HistoryEnd);
    assert_eq!(config.order_search.workers, Some(4));
    assert_eq!(config.parts.len(), 2);
    assert_eq!(config.feature_kind("high-envelope-6h").unwrap().window_hours, Some(6));
    assert!(config.condition.clamp_percent);

    let again = PipelineConfig::from_toml_str(&config.to_toml().unwrap()).unwrap();
    assert_eq!(again, config);
}

#[test]
fn empty_config_is_the_default() {
    let config = PipelineConfig::from_toml_str("").unwrap();
    assert_eq!(config, PipelineConfig::default());
    let (errors, _) = validate_value_ranges(&config);
    assert!(errors.is_empty(), "{errors:?}");
}

#[test]
fn degenerate_profile_is_rejected() {
    let err = PipelineConfig::from_toml_str(
        r#"
[[parts]]
part_id = "P-1"
upper = 100.0
lower = 80.0
baseline = 100.0
"#,
    )
    .unwrap_err();
    match err {
        ConfigError::Validation(errors) => {
            assert_eq!(errors.len(), 1);
            assert!(errors[0].contains("baseline must differ from upper"));
        }
        other => panic!("expected validation error, got {other}"),
    }
}

#[test]
fn every_range_error_is_reported_at_once() {
    let mut config = PipelineConfig::default();
    config.forecast.train_fraction = 0.0;
    config.forecast.confidence_level = 1.0;
    config.order_search.q = [2, 2];
    config.order_search.workers = Some(0);
    config.condition.feature_kind = "missing".into();

    let (errors, _) = validate_value_ranges(&config);
    assert_eq!(errors.len(), 5, "{errors:#?}");
    assert!(errors.iter().any(|e| e.contains("train_fraction")));
    assert!(errors.iter().any(|e| e.contains("confidence_level")));
    assert!(errors.iter().any(|e| e.contains("order_search.q")));
    assert!(errors.iter().any(|e| e.contains("workers")));
    assert!(errors.iter().any(|e| e.contains("'missing'")));
}

#[test]
fn duplicate_parts_are_rejected() {
    let err = PipelineConfig::from_toml_str(
        r#"
[[parts]]
part_id = "P-1"
upper = 100.0
lower = 80.0
baseline = 50.0

[[parts]]
part_id = "P-1"
upper = 90.0
lower = 70.0
baseline = 40.0
"#,
    )
    .unwrap_err();
    assert!(err.to_string().contains("defined more than once"));
}

#[test]
fn load_from_missing_file_is_io_error() {
    let err = PipelineConfig::load_from_file(std::path::Path::new("/nonexistent/partwatch.toml"))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Io(..)));
}

#[test]
fn resolve_prefers_the_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "[forecast]\nhorizon_steps = 12\n").unwrap();

    let config = PipelineConfig::resolve(Some(&path)).unwrap();
    assert_eq!(config.forecast.horizon_steps, 12);
    assert_eq!(config.forecast_settings().horizon_steps, 12);
}
