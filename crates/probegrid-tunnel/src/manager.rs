//! Tunnel manager: scoped acquisition of one tunnel per job.
//!
//! [`TunnelManager::run`] is the only way the engine touches a tunnel. It
//! leases a local port, opens the tunnel, waits for it to become ready,
//! runs the caller's operation against the local port, and closes the
//! tunnel before returning. Connecting and waiting for ready share the
//! ready timeout. Close runs on every path once a handle
//! exists: success, operation error, setup error, timeout, cancellation.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use probegrid_core::Target;

use crate::connector::{Tunnel, TunnelConnector};
use crate::error::{TunnelError, TunnelResult, TunnelRunError};
use crate::port::{PortLease, PortRegistry};

/// Upper bound on waiting for a tunnel to tear down.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens, uses and closes tunnels through a shared connector.
#[derive(Clone)]
pub struct TunnelManager {
    connector: Arc<dyn TunnelConnector>,
    ports: PortRegistry,
    ready_timeout: Duration,
}

impl TunnelManager {
    pub fn new(connector: Arc<dyn TunnelConnector>, ready_timeout: Duration) -> Self {
        Self {
            connector,
            ports: PortRegistry::new(),
            ready_timeout,
        }
    }

    /// Ports held by tunnels that are currently open.
    pub fn active_tunnels(&self) -> usize {
        self.ports.active_count()
    }

    /// Run `op` with the local port of a freshly opened tunnel to `target`.
    pub async fn run<F, Fut, T, E>(
        &self,
        target: &Target,
        remote_port: u16,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T, TunnelRunError<E>>
    where
        F: FnOnce(u16) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        if cancel.is_cancelled() {
            return Err(TunnelRunError::Cancelled);
        }
        if !target.ready {
            return Err(TunnelRunError::Setup(TunnelError::TargetNotReady(
                target.id(),
            )));
        }

        // Connect and ready share one deadline.
        let deadline = Instant::now() + self.ready_timeout;

        let (lease, mut tunnel) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TunnelRunError::Cancelled),
            opened = tokio::time::timeout_at(deadline, self.open(target, remote_port)) => match opened {
                Ok(opened) => opened.map_err(TunnelRunError::Setup)?,
                Err(_) => {
                    debug!(instance = %target.id(), timeout = ?self.ready_timeout, "connect did not finish");
                    return Err(TunnelRunError::Setup(TunnelError::ReadyTimeout(self.ready_timeout)));
                }
            },
        };
        let local_port = lease.port();
        let id = target.id();
        debug!(instance = %id, local_port, remote_port, "tunnel opening");

        let ready = if tunnel.local_port() != local_port {
            Err(TunnelRunError::Setup(TunnelError::Setup(format!(
                "tunnel listens on port {} instead of leased port {local_port}",
                tunnel.local_port()
            ))))
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TunnelRunError::Cancelled),
                r = tokio::time::timeout_at(deadline, tunnel.ready()) => match r {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(TunnelRunError::Setup(e)),
                    Err(_) => Err(TunnelRunError::Setup(TunnelError::ReadyTimeout(self.ready_timeout))),
                },
            }
        };

        if let Err(e) = ready {
            debug!(instance = %id, local_port, error = %e, "tunnel never became ready");
            if let Err(close_err) = close(tunnel, lease).await {
                debug!(instance = %id, error = %close_err, "teardown after failed setup");
            }
            return Err(e);
        }

        debug!(instance = %id, local_port, "tunnel ready");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TunnelRunError::Cancelled),
            r = op(local_port) => r.map_err(TunnelRunError::Operation),
        };

        let closed = close(tunnel, lease).await;
        debug!(instance = %id, local_port, "tunnel closed");

        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(value), Err(e)) => {
                warn!(instance = %id, error = %e, "tunnel reported an error after a successful probe");
                Ok(value)
            }
            (Err(TunnelRunError::Operation(_)), Err(e @ TunnelError::Stream(_))) => {
                Err(TunnelRunError::Tunnel(e))
            }
            (Err(e), Err(close_err)) => {
                debug!(instance = %id, error = %close_err, "tunnel teardown error");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
        }
    }

    /// Lease a port and connect, retrying once if the port was taken in
    /// the meantime.
    async fn open(
        &self,
        target: &Target,
        remote_port: u16,
    ) -> TunnelResult<(PortLease, Box<dyn Tunnel>)> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let lease = self.ports.lease()?;
            match self
                .connector
                .connect(target, lease.port(), remote_port)
                .await
            {
                Ok(tunnel) => return Ok((lease, tunnel)),
                Err(TunnelError::PortInUse(port)) if attempt == 1 => {
                    debug!(instance = %target.id(), port, "local port taken, retrying with a new one");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Close the tunnel, then release its port.
async fn close(tunnel: Box<dyn Tunnel>, lease: PortLease) -> TunnelResult<()> {
    let result = match tokio::time::timeout(TEARDOWN_TIMEOUT, tunnel.close()).await {
        Ok(result) => result,
        Err(_) => Err(TunnelError::Teardown(format!(
            "not closed after {TEARDOWN_TIMEOUT:?}"
        ))),
    };
    drop(lease);
    result
}
