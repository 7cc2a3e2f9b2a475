//! Config validation: unknown-key detection with Levenshtein suggestions
//! and value range checks.
//!
//! Unknown keys are found by walking the raw `toml::Value` tree before serde
//! sees it. They only produce warnings, so a typo never stops a run, but the
//! operator is told which known key was probably meant.

use std::collections::{HashMap, HashSet};

use super::defaults::{MAX_HORIZON_STEPS, MAX_STEP_SECS, MAX_SUGGESTION_DISTANCE};
use super::PipelineConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Every valid dotted key path of [`PipelineConfig`].
///
/// Keys inside arrays of tables (`[[parts]]`, `[[feature_kinds]]`) are listed
/// under the array name. Must be kept in step with `pipeline_config.rs`.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [storage]
        "storage",
        "storage.data_dir",
        // [[feature_kinds]]
        "feature_kinds",
        "feature_kinds.id",
        "feature_kinds.window_hours",
        "feature_kinds.chunk_size",
        "feature_kinds.split_at_mean",
        "feature_kinds.forecast",
        // [forecast]
        "forecast",
        "forecast.min_observations",
        "forecast.search_fraction",
        "forecast.train_fraction",
        "forecast.horizon_steps",
        "forecast.step_secs",
        "forecast.anchor",
        "forecast.confidence_level",
        // [order_search]
        "order_search",
        "order_search.p",
        "order_search.d",
        "order_search.q",
        "order_search.workers",
        // [condition]
        "condition",
        "condition.feature_kind",
        "condition.clamp_percent",
        // [[parts]]
        "parts",
        "parts.part_id",
        "parts.upper",
        "parts.lower",
        "parts.baseline",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Collect every dotted key path of a `toml::Value` tree.
///
/// `{ a = { b = 1 } }` yields `["a", "a.b"]`. Tables inside arrays are walked
/// under the array's own path, so `[[parts]] upper = 1` yields `"parts.upper"`.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    let Some(table) = value.as_table() else {
        return keys;
    };
    for (k, v) in table {
        let path = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        keys.push(path.clone());
        match v {
            toml::Value::Table(_) => keys.extend(walk_toml_keys(v, &path)),
            toml::Value::Array(items) => {
                for item in items.iter().filter(|i| i.is_table()) {
                    for key in walk_toml_keys(item, &path) {
                        if !keys.contains(&key) {
                            keys.push(key);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Closest known key within the suggestion distance; ties go to the
/// lexicographically smaller key.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (levenshtein(unknown, k), *k))
        .filter(|(dist, _)| *dist <= MAX_SUGGESTION_DISTANCE)
        .min()
        .map(|(_, k)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Warnings for every key of `raw_toml` that the config does not define.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // reported by the typed parse
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Value Range Validation
// ============================================================================

fn check_fraction(value: f64, name: &str, errors: &mut Vec<String>) {
    if !(value > 0.0 && value <= 1.0) {
        errors.push(format!("{name} = {value} must be in (0, 1]"));
    }
}

fn check_range(range: [usize; 2], name: &str, errors: &mut Vec<String>) {
    if range[0] >= range[1] {
        errors.push(format!(
            "order_search.{name} = [{}, {}] is empty (end is exclusive)",
            range[0], range[1]
        ));
    }
}

/// Validate a parsed config.
///
/// Returns (errors, warnings): errors are values the pipeline cannot run
/// with; warnings are legal but probably unintended.
pub fn validate_value_ranges(config: &PipelineConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    // Feature kinds
    let mut kind_ids = HashSet::new();
    for kind in &config.feature_kinds {
        if kind.id.trim().is_empty() || kind.id.contains('\0') {
            errors.push(format!("feature_kinds.id {:?} is not a usable identifier", kind.id));
        }
        if !kind_ids.insert(kind.id.as_str()) {
            errors.push(format!("feature_kinds.id '{}' is defined more than once", kind.id));
        }
        if kind.chunk_size == 0 {
            errors.push(format!("feature_kinds '{}': chunk_size must be >= 1", kind.id));
        }
        if kind.window_hours == Some(0) {
            errors.push(format!("feature_kinds '{}': window_hours must be > 0", kind.id));
        }
        if kind.forecast && kind.window_hours.is_some() {
            warnings.push(ValidationWarning {
                field: format!("feature_kinds.{}.forecast", kind.id),
                message: format!(
                    "feature kind '{}' is windowed; forecasts will only see its trailing window",
                    kind.id
                ),
                suggestion: None,
            });
        }
    }
    if !kind_ids.contains(config.condition.feature_kind.as_str()) {
        errors.push(format!(
            "condition.feature_kind '{}' is not a configured feature kind",
            config.condition.feature_kind
        ));
    }

    // Forecasting
    let f = &config.forecast;
    check_fraction(f.search_fraction, "forecast.search_fraction", &mut errors);
    check_fraction(f.train_fraction, "forecast.train_fraction", &mut errors);
    if f.horizon_steps == 0 {
        errors.push("forecast.horizon_steps must be >= 1".to_string());
    }
    if f.step_secs == 0 {
        errors.push("forecast.step_secs must be >= 1".to_string());
    }
    if f.step_secs > MAX_STEP_SECS {
        errors.push(format!(
            "forecast.step_secs = {} exceeds the maximum of {MAX_STEP_SECS}",
            f.step_secs
        ));
    }
    if f.horizon_steps > MAX_HORIZON_STEPS {
        errors.push(format!(
            "forecast.horizon_steps = {} exceeds the maximum of {MAX_HORIZON_STEPS}",
            f.horizon_steps
        ));
    }
    if f.min_observations < 3 {
        errors.push(format!(
            "forecast.min_observations = {} must be >= 3",
            f.min_observations
        ));
    }
    if !(f.confidence_level > 0.0 && f.confidence_level < 1.0) {
        errors.push(format!(
            "forecast.confidence_level = {} must be in (0, 1)",
            f.confidence_level
        ));
    }
    if f.horizon_steps > 24 * 90 {
        warnings.push(ValidationWarning {
            field: "forecast.horizon_steps".to_string(),
            message: format!(
                "forecast.horizon_steps = {} is unusually long; intervals will be very wide",
                f.horizon_steps
            ),
            suggestion: None,
        });
    }

    // Order search
    let o = &config.order_search;
    check_range(o.p, "p", &mut errors);
    check_range(o.d, "d", &mut errors);
    check_range(o.q, "q", &mut errors);
    if o.workers == Some(0) {
        errors.push("order_search.workers must be >= 1 (omit it to use every core)".to_string());
    }
    if o.d[1] > 3 {
        warnings.push(ValidationWarning {
            field: "order_search.d".to_string(),
            message: format!("order_search.d allows {} differences; more than 2 is rarely useful", o.d[1] - 1),
            suggestion: None,
        });
    }

    // Threshold profiles
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for p in &config.parts {
        *seen.entry(p.part_id.as_str()).or_default() += 1;
        let name = format!("parts '{}'", p.part_id);
        if p.part_id.trim().is_empty() || p.part_id.contains('\0') {
            errors.push(format!("parts.part_id {:?} is not a usable identifier", p.part_id));
        }
        if ![p.upper, p.lower, p.baseline].iter().all(|v| v.is_finite()) {
            errors.push(format!("{name}: thresholds must be finite"));
            continue;
        }
        if p.lower > p.upper {
            errors.push(format!(
                "{name}: lower ({}) must be <= upper ({})",
                p.lower, p.upper
            ));
        }
        if p.upper == p.baseline {
            errors.push(format!(
                "{name}: baseline must differ from upper ({}); percent condition divides by their gap",
                p.upper
            ));
        }
        if (p.baseline - p.upper).signum() != (p.lower - p.upper).signum() && p.lower != p.upper {
            warnings.push(ValidationWarning {
                field: format!("parts.{}.baseline", p.part_id),
                message: format!(
                    "{name}: baseline ({}) lies beyond upper ({}); percent condition will exceed 100 near the warning band",
                    p.baseline, p.upper
                ),
                suggestion: None,
            });
        }
    }
    let mut duplicates: Vec<&str> = seen
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(id, _)| id)
        .collect();
    duplicates.sort_unstable();
    for id in duplicates {
        errors.push(format!("parts '{id}' is defined more than once"));
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ThresholdProfile;

    fn profile(id: &str, upper: f64, lower: f64, baseline: f64) -> ThresholdProfile {
        ThresholdProfile {
            part_id: id.into(),
            upper,
            lower,
            baseline,
        }
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("horizon", "horizon"), 0);
        assert_eq!(levenshtein("horzon", "horizon"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_arrays_of_tables() {
        let value: toml::Value = r#"
            [[parts]]
            part_id = "A"
            upper = 1.0

            [[parts]]
            part_id = "B"
            lower = 0.5
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&value, "");
        assert!(keys.contains(&"parts".to_string()));
        assert!(keys.contains(&"parts.upper".to_string()));
        assert!(keys.contains(&"parts.lower".to_string()));
        assert_eq!(keys.iter().filter(|k| *k == "parts.part_id").count(), 1);
    }

    #[test]
    fn test_typo_key_produces_suggestion() {
        let warnings = validate_unknown_keys(
            r#"
            [forecast]
            horizon_step = 24
            "#,
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].suggestion.as_deref(), Some("forecast.horizon_steps"));
        assert!(warnings[0].to_string().contains("did you mean"));
    }

    #[test]
    fn test_valid_keys_produce_no_warnings() {
        let warnings = validate_unknown_keys(
            r#"
            [storage]
            data_dir = "/var/lib/partwatch"

            [[feature_kinds]]
            id = "high-envelope"
            forecast = true

            [order_search]
            p = [0, 3]
            workers = 2

            [[parts]]
            part_id = "P-1"
            upper = 100.0
            lower = 80.0
            baseline = 50.0
            "#,
        );
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn test_garbage_has_no_suggestion() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key_xyz", &known).is_none());
    }

    #[test]
    fn test_defaults_are_clean() {
        let (errors, warnings) = validate_value_ranges(&PipelineConfig::default());
        assert!(errors.is_empty(), "{errors:?}");
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn test_profile_errors() {
        let mut config = PipelineConfig::default();
        config.parts = vec![
            profile("A", 100.0, 120.0, 50.0),
            profile("B", 100.0, 80.0, 100.0),
            profile("C", 100.0, 80.0, 50.0),
            profile("C", 90.0, 80.0, 50.0),
        ];
        let (errors, _) = validate_value_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("'A'") && e.contains("lower")));
        assert!(errors.iter().any(|e| e.contains("'B'") && e.contains("baseline")));
        assert!(errors.iter().any(|e| e.contains("'C' is defined more than once")));
    }

    #[test]
    fn test_baseline_beyond_upper_warns() {
        let mut config = PipelineConfig::default();
        config.parts = vec![profile("A", 100.0, 80.0, 120.0)];
        let (errors, warnings) = validate_value_ranges(&config);
        assert!(errors.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_empty_order_range() {
        let mut config = PipelineConfig::default();
        config.order_search.d = [1, 1];
        let (errors, _) = validate_value_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("order_search.d")));
    }

    #[test]
    fn test_forecast_span_upper_bounds() {
        let mut config = PipelineConfig::default();
        config.forecast.step_secs = MAX_STEP_SECS;
        config.forecast.horizon_steps = MAX_HORIZON_STEPS;
        let (errors, _) = validate_value_ranges(&config);
        assert!(errors.is_empty(), "{errors:?}");

        config.forecast.step_secs = u64::MAX;
        config.forecast.horizon_steps = usize::MAX;
        let (errors, _) = validate_value_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("forecast.step_secs")));
        assert!(errors.iter().any(|e| e.contains("forecast.horizon_steps")));
        // clamped rather than panicking on out-of-range input
        assert_eq!(config.forecast.step(), chrono::Duration::MAX);
    }

    #[test]
    fn test_condition_kind_must_exist() {
        let mut config = PipelineConfig::default();
        config.condition.feature_kind = "nope".into();
        let (errors, _) = validate_value_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("condition.feature_kind")));
    }
}
