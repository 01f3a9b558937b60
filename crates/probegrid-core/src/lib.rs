//! probegrid-core — shared types for the probegrid workspace.
//!
//! Holds the data model every other crate speaks: resolved [`Target`]s,
//! parsed [`HealthSnapshot`]s, per-target [`JobResult`]s and their
//! [`Classification`], the [`SweepConfig`] passed into each sweep, and the
//! [`TargetResolver`] facade used to discover group members.

pub mod config;
pub mod error;
pub mod resolver;
pub mod types;

pub use config::{Endpoint, OutputMode, PoolSettings, ProbegridConfig, SweepConfig};
pub use error::{ConfigError, ConfigResult};
pub use resolver::{ResolveError, ResolveFuture, StaticResolver, TargetResolver};
pub use types::*;
