//! Shared types, error model, and document loading for the beacon pipeline.
//!
//! This crate is the foundation depended on by all other beacon crates.
//! It provides:
//! - [`BeaconError`]: the unified error type
//! - Domain types ([`Genome`], [`Artifact`], [`Stage`], [`Mode`], [`JobId`], [`Arguments`])
//! - The system configuration ([`Configuration`], config loading)
//! - The per-job parameter document ([`Parameters`], parameter loading)

pub mod config;
pub mod error;
pub mod params;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    Configuration, DBNSFP_SETS, DEFAULT_DBNSFP_SET, asset_key, config_dir, default_config_path, load_config,
    load_config_from,
};
pub use error::{BeaconError, Result};
pub use params::{BffNames, Parameters, PipelineFlags, load_params, load_params_from};
pub use types::{Arguments, Artifact, Genome, JobId, Mode, Stage};
