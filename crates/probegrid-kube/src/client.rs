//! Kubernetes client construction from the local kubeconfig.

use kube::Client;
use kube::config::{Config, KubeConfigOptions};
use thiserror::Error;
use tracing::debug;

/// Errors building a client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to load kubeconfig: {0}")]
    Config(String),

    #[error("failed to create Kubernetes client: {0}")]
    Client(String),
}

/// Build a client for `context`, or for the current context when `None`.
///
/// Without an explicit context the usual inference applies: in-cluster
/// service account first, then kubeconfig.
pub async fn connect_client(context: Option<&str>) -> Result<Client, ClientError> {
    let config = match context {
        Some(context) => {
            let options = KubeConfigOptions {
                context: Some(context.to_string()),
                ..Default::default()
            };
            Config::from_kubeconfig(&options)
                .await
                .map_err(|e| ClientError::Config(e.to_string()))?
        }
        None => Config::infer()
            .await
            .map_err(|e| ClientError::Config(e.to_string()))?,
    };

    debug!(
        cluster = %config.cluster_url,
        namespace = %config.default_namespace,
        context = context.unwrap_or("<current>"),
        "kubernetes client configured"
    );
    Client::try_from(config).map_err(|e| ClientError::Client(e.to_string()))
}
