//! Signal acquisition
//!
//! Historian readings arrive as `timestamp,value` CSV exports. Fetching from the
//! historian itself is an external concern; this module only turns exported
//! files into [`Sample`](crate::types::Sample)s.

mod csv_source;

pub use csv_source::{parse_timestamp, parse_value, read_csv_signal, AcquisitionError, CsvImport};
