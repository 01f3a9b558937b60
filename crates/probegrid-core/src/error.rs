//! Error types for probegrid configuration.

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(String),

    #[error("failed to parse config file: {0}")]
    Parse(String),

    #[error("invalid duration {0:?} (expected e.g. \"500ms\", \"5s\", \"2m\")")]
    InvalidDuration(String),

    #[error("invalid output mode {0:?} (expected parsed, raw or json)")]
    InvalidOutput(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}
