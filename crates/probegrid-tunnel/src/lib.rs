//! probegrid-tunnel — one ephemeral tunnel per job, always torn down.
//!
//! # Architecture
//!
//! ```text
//! TunnelManager::run(target, remote_port, cancel, op)
//!   ├── PortRegistry::lease()        → free local port, held until close
//!   ├── TunnelConnector::connect()   → Tunnel (opening)
//!   ├── Tunnel::ready()              → ready | setup error | timeout | cancel
//!   ├── op(local_port)               → caller's probe
//!   └── Tunnel::close()              → closed, on every path
//! ```
//!
//! The connector is the only piece that knows how the control plane
//! forwards traffic; it must be safe to share between all workers.

pub mod connector;
pub mod error;
pub mod manager;
pub mod port;

pub use connector::{CloseFuture, ConnectFuture, ReadyFuture, Tunnel, TunnelConnector};
pub use error::{TunnelError, TunnelResult, TunnelRunError};
pub use manager::TunnelManager;
pub use port::{PortLease, PortRegistry, allocate_port};
