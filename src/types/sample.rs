//! Time-stamped readings and fixed-grid resampling

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One reading of a part's signal (or one point of a derived series).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Extract the bare values of a series, in order.
pub fn values_of(samples: &[Sample]) -> Vec<f64> {
    samples.iter().map(|s| s.value).collect()
}

/// Floor a timestamp to the start of its `step` bucket (grid anchored at the epoch).
pub fn floor_to_step(ts: DateTime<Utc>, step: Duration) -> DateTime<Utc> {
    let step_ms = step.num_milliseconds().max(1);
    let ms = ts.timestamp_millis();
    let floored = ms - ms.rem_euclid(step_ms);
    Utc.timestamp_millis_opt(floored).single().unwrap_or(ts)
}

/// Resample a series onto a fixed grid.
///
/// Samples are bucketed by `floor_to_step`, each bucket is averaged, and
/// buckets with no readings are forward-filled from the previous bucket.
/// The output spans from the first to the last occupied bucket with no gaps.
pub fn resample(samples: &[Sample], step: Duration) -> Vec<Sample> {
    if samples.is_empty() || step <= Duration::zero() {
        return Vec::new();
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by_key(|s| s.timestamp);

    // (bucket start, sum, count)
    let mut buckets: Vec<(DateTime<Utc>, f64, usize)> = Vec::new();
    for s in &sorted {
        let bucket = floor_to_step(s.timestamp, step);
        match buckets.last_mut() {
            Some(last) if last.0 == bucket => {
                last.1 += s.value;
                last.2 += 1;
            }
            _ => buckets.push((bucket, s.value, 1)),
        }
    }

    let mut out: Vec<Sample> = Vec::with_capacity(buckets.len());
    for (bucket, sum, count) in buckets {
        let mean = sum / count as f64;
        if let Some(prev) = out.last().copied() {
            let mut ts = prev.timestamp + step;
            while ts < bucket {
                out.push(Sample::new(ts, prev.value));
                ts += step;
            }
        }
        out.push(Sample::new(bucket, mean));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: i64, minute: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(0, 0).unwrap() + Duration::hours(hour) + Duration::minutes(minute)
    }

    #[test]
    fn test_floor_to_hour() {
        assert_eq!(floor_to_step(at(5, 42), Duration::hours(1)), at(5, 0));
        assert_eq!(floor_to_step(at(5, 0), Duration::hours(1)), at(5, 0));
    }

    #[test]
    fn test_resample_averages_within_bucket() {
        let samples = vec![
            Sample::new(at(0, 10), 2.0),
            Sample::new(at(0, 50), 4.0),
            Sample::new(at(1, 5), 10.0),
        ];
        let out = resample(&samples, Duration::hours(1));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], Sample::new(at(0, 0), 3.0));
        assert_eq!(out[1], Sample::new(at(1, 0), 10.0));
    }

    #[test]
    fn test_resample_forward_fills_gaps() {
        let samples = vec![Sample::new(at(0, 0), 1.0), Sample::new(at(3, 30), 7.0)];
        let out = resample(&samples, Duration::hours(1));
        let values: Vec<f64> = values_of(&out);
        assert_eq!(values, vec![1.0, 1.0, 1.0, 7.0]);
        assert_eq!(out[3].timestamp, at(3, 0));
    }

    #[test]
    fn test_resample_sorts_input() {
        let samples = vec![Sample::new(at(2, 0), 5.0), Sample::new(at(0, 0), 1.0)];
        let out = resample(&samples, Duration::hours(1));
        assert_eq!(values_of(&out), vec![1.0, 1.0, 5.0]);
    }

    #[test]
    fn test_resample_empty() {
        assert!(resample(&[], Duration::hours(1)).is_empty());
    }
}
