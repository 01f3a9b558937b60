//! Target resolution facade.
//!
//! The engine never discovers group members itself; it asks a
//! [`TargetResolver`] for the list once per sweep.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::types::{GroupRef, Target};

/// Boxed future returned by [`TargetResolver::list_targets`].
pub type ResolveFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<Target>, ResolveError>> + Send + 'a>>;

/// Errors from resolving a group into targets.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("group {0} not found")]
    NotFound(String),

    #[error("group {group} is not resolvable: {reason}")]
    InvalidGroup { group: String, reason: String },

    #[error("control plane request failed: {0}")]
    ControlPlane(String),
}

/// Lists the members of a named group.
pub trait TargetResolver: Send + Sync {
    fn list_targets<'a>(&'a self, group: &'a GroupRef) -> ResolveFuture<'a>;
}

/// Resolver over a fixed target list, regardless of the group asked for.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    targets: Vec<Target>,
}

impl StaticResolver {
    pub fn new(targets: Vec<Target>) -> Self {
        Self { targets }
    }
}

impl TargetResolver for StaticResolver {
    fn list_targets<'a>(&'a self, _group: &'a GroupRef) -> ResolveFuture<'a> {
        let targets = self.targets.clone();
        Box::pin(async move { Ok(targets) })
    }
}
