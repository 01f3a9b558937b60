//! Error types for tunnel setup and use.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for tunnel operations.
pub type TunnelResult<T> = Result<T, TunnelError>;

/// Errors raised by connectors and tunnels.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TunnelError {
    #[error("target {0} is not ready")]
    TargetNotReady(String),

    #[error("no free local port: {0}")]
    PortAllocation(String),

    /// The allocated port was taken between allocation and bind.
    #[error("local port {0} already in use")]
    PortInUse(u16),

    #[error("tunnel setup failed: {0}")]
    Setup(String),

    #[error("tunnel not ready after {0:?}")]
    ReadyTimeout(Duration),

    #[error("tunnel stream failed: {0}")]
    Stream(String),

    #[error("tunnel teardown failed: {0}")]
    Teardown(String),
}

/// Outcome classes of [`TunnelManager::run`](crate::TunnelManager::run).
#[derive(Debug, Error)]
pub enum TunnelRunError<E> {
    /// The tunnel never became ready; the operation did not run.
    #[error("{0}")]
    Setup(TunnelError),

    /// The operation failed and the tunnel reported a stream error.
    #[error("{0}")]
    Tunnel(TunnelError),

    /// The operation ran on a healthy tunnel and failed.
    #[error("{0}")]
    Operation(E),

    #[error("cancelled")]
    Cancelled,
}
