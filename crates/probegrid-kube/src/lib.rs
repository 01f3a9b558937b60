//! probegrid-kube — Kubernetes backend for target resolution and tunnels.
//!
//! # Architecture
//!
//! ```text
//! connect_client(context)            → kube::Client
//!   ├── KubeResolver                 (TargetResolver)
//!   │   ├── GET StatefulSet          → spec.selector.matchLabels
//!   │   └── LIST Pods (selector)     → Targets ordered by ordinal
//!   └── KubeConnector                (TunnelConnector)
//!       ├── bind 127.0.0.1:<local>
//!       ├── first pod portforward    → ready
//!       └── per accepted connection  → copy_bidirectional over portforward
//! ```

pub mod client;
pub mod portforward;
pub mod resolver;

pub use client::{ClientError, connect_client};
pub use portforward::KubeConnector;
pub use resolver::KubeResolver;
