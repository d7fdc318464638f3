//! Error types for the beacon pipeline.
//!
//! Library crates use [`BeaconError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all beacon operations.
///
/// Every variant is fatal: nothing in the pipeline retries.
#[derive(Debug, thiserror::Error)]
pub enum BeaconError {
    /// Configuration document missing, malformed, or inconsistent.
    #[error("config error: {message}")]
    Config { message: String },

    /// Parameter document malformed, or a mode-required field is missing.
    #[error("parameter error: {message}")]
    Parameter { message: String },

    /// Invalid genome selector, or a genome asset key absent from the configuration.
    #[error("path resolution error: {message}")]
    PathResolution { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON encode/decode failure (job log).
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An external stage could not be started or terminated with a failure status.
    #[error("stage {stage} failed ({status}); see {log:?}")]
    StageExecution {
        stage: String,
        status: String,
        log: PathBuf,
    },

    /// An orchestrator was asked to run again after finishing.
    #[error("pipeline already {state}; create a new orchestrator for another run")]
    AlreadyRun { state: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BeaconError>;

impl BeaconError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parameter error from any displayable message.
    pub fn parameter(msg: impl Into<String>) -> Self {
        Self::Parameter {
            message: msg.into(),
        }
    }

    /// Create a path resolution error from any displayable message.
    pub fn path_resolution(msg: impl Into<String>) -> Self {
        Self::PathResolution {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors raised before any stage could have run.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::Parameter { .. } | Self::PathResolution { .. }
        )
    }
}
