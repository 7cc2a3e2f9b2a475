//! Envelope Extraction
//!
//! Locates the local extrema of a discrete signal with a second-difference
//! sign test: the slope sign flips from rising to falling at a crest (high
//! envelope) and from falling to rising at a trough (low envelope).
//!
//! Two optional refinements:
//! - **Split at mean**: keep only troughs below and crests above the signal mean
//! - **Coarse-graining**: from each run of `chunk_size` consecutive candidates keep
//!   only the most extreme one, bounding envelope density to
//!   `ceil(candidates / chunk_size)` points per side
//!
//! The high envelope of the resampled signal is the feature series that the
//! forecaster consumes.

use serde::{Deserialize, Serialize};

use crate::types::{FeaturePoint, Sample};

/// Indices of the low (minima) and high (maxima) envelopes of a signal.
///
/// Both lists index into the original signal, are strictly increasing and
/// never share an index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelopes {
    pub min_indices: Vec<usize>,
    pub max_indices: Vec<usize>,
}

/// Extraction parameters for one feature kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeParams {
    /// Candidates per coarse-graining run (1 keeps every extremum)
    pub chunk_size: usize,
    /// Drop troughs at/above and crests at/below the signal mean
    pub split_at_mean: bool,
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self {
            chunk_size: 1,
            split_at_mean: false,
        }
    }
}

fn slope_sign(delta: f64) -> i8 {
    if delta > 0.0 {
        1
    } else if delta < 0.0 {
        -1
    } else {
        0
    }
}

/// Find the low and high envelopes of `signal`.
///
/// A `chunk_size` of 0 is treated as 1. Signals shorter than three points have
/// no second difference and yield empty envelopes.
pub fn extract(signal: &[f64], chunk_size: usize, split_at_mean: bool) -> Envelopes {
    if signal.len() < 3 {
        return Envelopes::default();
    }

    let signs: Vec<i8> = signal.windows(2).map(|w| slope_sign(w[1] - w[0])).collect();

    let mut min_candidates = Vec::new();
    let mut max_candidates = Vec::new();
    for (i, pair) in signs.windows(2).enumerate() {
        let curvature = pair[1] - pair[0];
        // second difference at i sits on signal index i + 1
        if curvature > 0 {
            min_candidates.push(i + 1);
        } else if curvature < 0 {
            max_candidates.push(i + 1);
        }
    }

    if split_at_mean {
        let mean = signal.iter().sum::<f64>() / signal.len() as f64;
        min_candidates.retain(|&i| signal[i] < mean);
        max_candidates.retain(|&i| signal[i] > mean);
    }

    let chunk = chunk_size.max(1);
    Envelopes {
        min_indices: coarse_grain(signal, &min_candidates, chunk, |a, b| a < b),
        max_indices: coarse_grain(signal, &max_candidates, chunk, |a, b| a > b),
    }
}

/// Keep the most extreme candidate of each run; ties go to the first occurrence.
fn coarse_grain(
    signal: &[f64],
    candidates: &[usize],
    chunk_size: usize,
    more_extreme: impl Fn(f64, f64) -> bool,
) -> Vec<usize> {
    if chunk_size == 1 {
        return candidates.to_vec();
    }
    candidates
        .chunks(chunk_size)
        .filter_map(|run| {
            run.iter().copied().reduce(|best, i| {
                if more_extreme(signal[i], signal[best]) {
                    i
                } else {
                    best
                }
            })
        })
        .collect()
}

/// Run extraction on a time-stamped series and return the high envelope as
/// feature points for `(part_id, feature_kind)`.
pub fn high_envelope_points(
    part_id: &str,
    feature_kind: &str,
    series: &[Sample],
    params: EnvelopeParams,
) -> Vec<FeaturePoint> {
    let values: Vec<f64> = series.iter().map(|s| s.value).collect();
    let envelopes = extract(&values, params.chunk_size, params.split_at_mean);
    envelopes
        .max_indices
        .iter()
        .map(|&i| FeaturePoint {
            part_id: part_id.to_string(),
            feature_kind: feature_kind.to_string(),
            timestamp: series[i].timestamp,
            value: series[i].value,
        })
        .collect()
}
