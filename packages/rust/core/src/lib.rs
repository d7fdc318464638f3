//! Job resolution and stage orchestration for the beacon pipeline.
//!
//! This crate turns the configuration, the parameter document and the
//! command-line arguments into one [`descriptor::JobDescriptor`], prepares the
//! job's project directory and log, then runs the external stages in order
//! (see [`pipeline::run_job`]).

pub mod context;
pub mod descriptor;
pub mod joblog;
pub mod pipeline;
pub mod resolve;
pub mod runner;
