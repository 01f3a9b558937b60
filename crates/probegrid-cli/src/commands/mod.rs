use anyhow::Context;
use clap::Args;
use kube::Client;

use probegrid_core::GroupRef;

pub mod health;
pub mod targets;

/// Which group, where.
#[derive(Debug, Args)]
pub struct GroupArgs {
    /// StatefulSet name, or `namespace/name`
    pub group: String,
    /// Namespace (default: the kubeconfig context's namespace)
    #[arg(short, long)]
    pub namespace: Option<String>,
    /// Kubeconfig context to use
    #[arg(long)]
    pub context: Option<String>,
}

impl GroupArgs {
    pub async fn connect(&self) -> anyhow::Result<(Client, GroupRef)> {
        let client = probegrid_kube::connect_client(self.context.as_deref())
            .await
            .context("cannot reach the cluster")?;
        let group = parse_group(&self.group, self.namespace.as_deref(), client.default_namespace())?;
        Ok((client, group))
    }
}

/// `ns/name` wins over `--namespace`, which wins over the context default.
pub fn parse_group(
    group: &str,
    namespace: Option<&str>,
    default_namespace: &str,
) -> anyhow::Result<GroupRef> {
    let (ns, name) = match group.split_once('/') {
        Some((ns, name)) => (ns, name),
        None => (namespace.unwrap_or(default_namespace), group),
    };
    anyhow::ensure!(
        !ns.is_empty() && !name.is_empty() && !name.contains('/'),
        "invalid group {group:?}: expected NAME or NAMESPACE/NAME"
    );
    Ok(GroupRef::new(ns, name))
}
