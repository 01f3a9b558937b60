//! Local port allocation.
//!
//! Ports come from the OS: bind `127.0.0.1:0`, read the assigned port,
//! release the listener. Someone else may grab the port before the tunnel
//! binds it; the manager retries once in that case. The [`PortRegistry`]
//! additionally guarantees that two live tunnels of this process never
//! hold the same port.

use std::collections::HashSet;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::{TunnelError, TunnelResult};

/// Attempts before giving up on finding a port no live tunnel holds.
const MAX_LEASE_ATTEMPTS: usize = 8;

/// Ask the OS for a currently free local port.
pub fn allocate_port() -> TunnelResult<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .map_err(|e| TunnelError::PortAllocation(e.to_string()))?;
    let port = listener
        .local_addr()
        .map_err(|e| TunnelError::PortAllocation(e.to_string()))?
        .port();
    drop(listener);
    Ok(port)
}

/// Set of ports held by live tunnels.
#[derive(Debug, Clone, Default)]
pub struct PortRegistry {
    active: Arc<Mutex<HashSet<u16>>>,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a port and hold it until the lease is dropped.
    pub fn lease(&self) -> TunnelResult<PortLease> {
        for _ in 0..MAX_LEASE_ATTEMPTS {
            let port = allocate_port()?;
            let inserted = self
                .active
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert(port);
            if inserted {
                return Ok(PortLease {
                    port,
                    active: self.active.clone(),
                });
            }
            debug!(port, "allocated port already leased, retrying");
        }
        Err(TunnelError::PortAllocation(format!(
            "no unleased port after {MAX_LEASE_ATTEMPTS} attempts"
        )))
    }

    /// Number of ports currently leased.
    pub fn active_count(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

/// Exclusive claim on a local port. Released on drop.
#[derive(Debug)]
pub struct PortLease {
    port: u16,
    active: Arc<Mutex<HashSet<u16>>>,
}

impl PortLease {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.port);
    }
}
