//! Tunnel facade implemented by control-plane backends.
//!
//! A connector starts forwarding and hands back a [`Tunnel`] in the
//! *opening* state. The manager then waits on [`Tunnel::ready`] and always
//! finishes with [`Tunnel::close`], whatever happened in between.

use std::future::Future;
use std::pin::Pin;

use probegrid_core::Target;

use crate::error::TunnelResult;

/// Boxed future returned by [`TunnelConnector::connect`].
pub type ConnectFuture<'a> =
    Pin<Box<dyn Future<Output = TunnelResult<Box<dyn Tunnel>>> + Send + 'a>>;

/// Boxed future returned by [`Tunnel::ready`].
pub type ReadyFuture<'a> = Pin<Box<dyn Future<Output = TunnelResult<()>> + Send + 'a>>;

/// Boxed future returned by [`Tunnel::close`].
pub type CloseFuture = Pin<Box<dyn Future<Output = TunnelResult<()>> + Send>>;

/// Opens tunnels to targets. Shared by all workers.
pub trait TunnelConnector: Send + Sync {
    /// Begin exposing `remote_port` of `target` on `127.0.0.1:<local_port>`.
    ///
    /// Returns [`TunnelError::PortInUse`](crate::TunnelError::PortInUse)
    /// when the local port cannot be bound, so the caller can retry with
    /// a fresh one. Dropping the returned future must release anything it
    /// acquired.
    fn connect<'a>(
        &'a self,
        target: &'a Target,
        local_port: u16,
        remote_port: u16,
    ) -> ConnectFuture<'a>;
}

/// One open (or opening) tunnel, owned by a single job.
pub trait Tunnel: Send {
    fn local_port(&self) -> u16;

    /// Resolve once forwarding is established, or with the setup error.
    fn ready(&mut self) -> ReadyFuture<'_>;

    /// Tear the tunnel down and wait until it is gone.
    ///
    /// Reports a stream error that happened after the tunnel was ready.
    fn close(self: Box<Self>) -> CloseFuture;
}
