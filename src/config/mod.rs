//! Pipeline Configuration Module
//!
//! Feature kinds, forecasting parameters, the order grid and per-part
//! threshold profiles, loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `--config <path>` on the command line (must load)
//! 2. `PARTWATCH_CONFIG` environment variable (path to TOML file)
//! 3. `partwatch.toml` in the current working directory
//! 4. Built-in defaults
//!
//! The loaded [`PipelineConfig`] is passed by reference to the pipeline;
//! threshold profiles are seeded into the part store and read back from it.

pub mod defaults;
mod pipeline_config;
pub mod validation;

pub use pipeline_config::*;
