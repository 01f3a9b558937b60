//! Error types for the worker pool and the sweep as a whole.

use std::time::Duration;

use thiserror::Error;

use probegrid_core::{ConfigError, ResolveError};

/// Result type alias for sweep operations.
pub type SweepResult<T> = Result<T, SweepError>;

/// Errors from the worker pool's own lifecycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool already started")]
    AlreadyStarted,

    #[error("worker pool is stopped")]
    Closed,

    #[error("submission cancelled")]
    Cancelled,

    /// Informational; results already written stay valid.
    #[error("workers still running after {0:?}")]
    ShutdownTimeout(Duration),
}

/// Errors that make a whole sweep meaningless.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("invalid sweep configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to resolve targets: {0}")]
    Resolve(#[from] ResolveError),

    #[error("group {0} has no members")]
    NoTargets(String),

    #[error("worker pool failed: {0}")]
    Pool(#[from] PoolError),

    #[error("sweep cancelled before any job was submitted")]
    Cancelled,
}
