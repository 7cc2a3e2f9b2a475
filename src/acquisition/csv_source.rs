//! `timestamp,value` CSV reader
//!
//! - Timestamps: RFC 3339, or naive `%Y-%m-%d %H:%M:%S[.f]` / `%Y-%m-%dT%H:%M:%S[.f]` taken as UTC
//! - Values: blank, `nan`, `null`, non-finite or unparseable readings are
//!   recorded as 0.0 (historian gaps are zero-filled)
//! - A first line whose timestamp does not parse is treated as a header
//! - Other rows with unparseable timestamps are skipped

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::types::Sample;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("failed to read {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("no readings in {path} ({skipped} rows skipped)")]
    Empty { path: PathBuf, skipped: usize },
}

/// Parsed file contents plus row accounting.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvImport {
    pub samples: Vec<Sample>,
    /// Rows dropped for an unparseable timestamp
    pub skipped_rows: usize,
    /// Readings zero-filled because the value was missing or invalid
    pub zero_filled: usize,
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
];

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim().trim_matches('"');
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.and_utc())
}

/// Parse a reading; `None` means the reading was zero-filled.
pub fn parse_value(s: &str) -> Option<f64> {
    s.trim()
        .trim_matches('"')
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Read a `timestamp,value` file.
pub fn read_csv_signal(path: impl AsRef<Path>) -> Result<CsvImport, AcquisitionError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| AcquisitionError::Io(path.to_path_buf(), e))?;
    let reader = BufReader::new(file);

    let mut samples = Vec::new();
    let mut skipped_rows = 0usize;
    let mut zero_filled = 0usize;

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| AcquisitionError::Io(path.to_path_buf(), e))?;
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.splitn(2, ',');
        let ts_field = fields.next().unwrap_or_default();
        let value_field = fields.next().unwrap_or_default();

        let Some(timestamp) = parse_timestamp(ts_field) else {
            if idx > 0 {
                if skipped_rows < 10 {
                    warn!(line = idx + 1, timestamp = ts_field, "Unparseable timestamp, row skipped");
                }
                skipped_rows += 1;
            }
            continue;
        };

        let value = parse_value(value_field).unwrap_or_else(|| {
            zero_filled += 1;
            0.0
        });
        samples.push(Sample::new(timestamp, value));
    }

    if samples.is_empty() {
        return Err(AcquisitionError::Empty {
            path: path.to_path_buf(),
            skipped: skipped_rows,
        });
    }

    info!(
        file = %path.display(),
        readings = samples.len(),
        skipped = skipped_rows,
        zero_filled,
        "Signal file loaded"
    );

    Ok(CsvImport {
        samples,
        skipped_rows,
        zero_filled,
    })
}
