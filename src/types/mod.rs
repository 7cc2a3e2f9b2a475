//! Shared data structures for the part-condition pipeline
//!
//! - Signal samples (historian readings, feature series)
//! - Feature points (envelope extraction output)
//! - Forecast points and batches (model output)
//! - Threshold profiles and condition state (classifier input/output)

mod sample;
mod feature;
mod condition;

pub use sample::*;
pub use feature::*;
pub use condition::*;
