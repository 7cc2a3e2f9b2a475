//! Processing pipeline: extraction → forecasting → classification per part
//!
//! Failures are typed ([`PipelineError`]) and mapped to an [`ErrorClass`]
//! that decides how the batch runner treats them. A failing part never stops
//! the others.

mod error;
mod runner;

pub use error::{ErrorClass, PipelineError};
pub use runner::{KindExtraction, KindForecast, PartReport, Pipeline, RunSummary};
