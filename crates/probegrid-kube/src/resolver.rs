//! StatefulSet resolver.
//!
//! A group is a StatefulSet. Its members are the pods matching the set's
//! `matchLabels` selector, ordered by ordinal (`api-0`, `api-1`, ...).

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::debug;

use probegrid_core::{GroupRef, ResolveError, ResolveFuture, Target, TargetResolver};

/// Container port names tried, in order, before falling back to the
/// first declared port.
const HEALTH_PORT_NAMES: &[&str] = &["http", "management", "actuator"];

/// Resolves StatefulSets into their pods.
#[derive(Clone)]
pub struct KubeResolver {
    client: Client,
}

impl KubeResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn resolve(&self, group: &GroupRef) -> Result<Vec<Target>, ResolveError> {
        let sets: Api<StatefulSet> = Api::namespaced(self.client.clone(), &group.namespace);
        let set = sets
            .get_opt(&group.name)
            .await
            .map_err(|e| ResolveError::ControlPlane(format!("get statefulset {group}: {e}")))?
            .ok_or_else(|| ResolveError::NotFound(group.to_string()))?;

        let selector = label_selector(&set).ok_or_else(|| ResolveError::InvalidGroup {
            group: group.to_string(),
            reason: "statefulset has no matchLabels selector".to_string(),
        })?;

        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &group.namespace);
        let list = pods
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(|e| ResolveError::ControlPlane(format!("list pods {selector}: {e}")))?;

        let targets = order_targets(
            &group.name,
            list.items
                .iter()
                .filter_map(|pod| target_from_pod(pod, &group.namespace))
                .collect(),
        );
        debug!(group = %group, %selector, pods = targets.len(), "statefulset resolved");
        Ok(targets)
    }
}

impl TargetResolver for KubeResolver {
    fn list_targets<'a>(&'a self, group: &'a GroupRef) -> ResolveFuture<'a> {
        Box::pin(self.resolve(group))
    }
}

/// `k1=v1,k2=v2` from the set's `matchLabels`, or `None` if it has none.
fn label_selector(set: &StatefulSet) -> Option<String> {
    let labels: &BTreeMap<String, String> = set.spec.as_ref()?.selector.match_labels.as_ref()?;
    if labels.is_empty() {
        return None;
    }
    Some(
        labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(","),
    )
}

fn target_from_pod(pod: &Pod, namespace: &str) -> Option<Target> {
    let name = pod.metadata.name.clone()?;
    let namespace = pod
        .metadata
        .namespace
        .clone()
        .unwrap_or_else(|| namespace.to_string());

    let mut target = Target::new(namespace, name);
    target.ready = pod.metadata.deletion_timestamp.is_none() && is_ready(pod);
    target.remote_port = health_port(pod);
    Some(target)
}

/// True when the pod's `Ready` condition is `True`.
fn is_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

fn health_port(pod: &Pod) -> Option<u16> {
    let ports: Vec<_> = pod
        .spec
        .as_ref()?
        .containers
        .iter()
        .flat_map(|c| c.ports.iter().flatten())
        .collect();

    let named = HEALTH_PORT_NAMES.iter().find_map(|wanted| {
        ports
            .iter()
            .find(|p| p.name.as_deref() == Some(*wanted))
    });
    let port = named.or_else(|| ports.first())?;
    u16::try_from(port.container_port).ok()
}

fn ordinal(set_name: &str, pod_name: &str) -> Option<u32> {
    pod_name
        .strip_prefix(set_name)?
        .strip_prefix('-')?
        .parse()
        .ok()
}

/// Sort by ordinal, then name; pods without an ordinal go last.
fn order_targets(set_name: &str, mut targets: Vec<Target>) -> Vec<Target> {
    targets.sort_by(|a, b| {
        let ka = (ordinal(set_name, &a.name).unwrap_or(u32::MAX), &a.name);
        let kb = (ordinal(set_name, &b.name).unwrap_or(u32::MAX), &b.name);
        ka.cmp(&kb)
    });
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod(value: serde_json::Value) -> Pod {
        serde_json::from_value(value).unwrap()
    }

    fn ready_pod(name: &str, ports: serde_json::Value) -> Pod {
        pod(json!({
            "metadata": {"name": name, "namespace": "prod"},
            "spec": {"containers": [{"name": "app", "ports": ports}]},
            "status": {"conditions": [{"type": "Ready", "status": "True"}]}
        }))
    }

    #[test]
    fn selector_from_match_labels() {
        let set: StatefulSet = serde_json::from_value(json!({
            "metadata": {"name": "api"},
            "spec": {
                "serviceName": "api",
                "selector": {"matchLabels": {"tier": "backend", "app": "api"}},
                "template": {}
            }
        }))
        .unwrap();
        assert_eq!(label_selector(&set).as_deref(), Some("app=api,tier=backend"));
    }

    #[test]
    fn selector_missing_is_none() {
        let set: StatefulSet = serde_json::from_value(json!({
            "metadata": {"name": "api"},
            "spec": {"serviceName": "api", "selector": {}, "template": {}}
        }))
        .unwrap();
        assert!(label_selector(&set).is_none());
    }

    #[test]
    fn named_health_port_wins() {
        let p = ready_pod(
            "api-0",
            json!([
                {"name": "grpc", "containerPort": 9090},
                {"name": "management", "containerPort": 8081},
                {"name": "http", "containerPort": 8080}
            ]),
        );
        let target = target_from_pod(&p, "prod").unwrap();
        assert_eq!(target.remote_port, Some(8080));
        assert!(target.ready);
    }

    #[test]
    fn first_port_is_fallback() {
        let p = ready_pod("api-0", json!([{"name": "grpc", "containerPort": 9090}]));
        assert_eq!(target_from_pod(&p, "prod").unwrap().remote_port, Some(9090));

        let p = ready_pod("api-0", json!([]));
        assert_eq!(target_from_pod(&p, "prod").unwrap().remote_port, None);
    }

    #[test]
    fn readiness_follows_ready_condition() {
        let p = pod(json!({
            "metadata": {"name": "api-1"},
            "status": {"conditions": [{"type": "Ready", "status": "False"}]}
        }));
        let target = target_from_pod(&p, "prod").unwrap();
        assert!(!target.ready);
        assert_eq!(target.namespace, "prod");

        let p = pod(json!({"metadata": {"name": "api-2"}}));
        assert!(!target_from_pod(&p, "prod").unwrap().ready);
    }

    #[test]
    fn terminating_pod_is_not_ready() {
        let p = pod(json!({
            "metadata": {"name": "api-0", "deletionTimestamp": "2024-01-01T00:00:00Z"},
            "status": {"conditions": [{"type": "Ready", "status": "True"}]}
        }));
        assert!(!target_from_pod(&p, "prod").unwrap().ready);
    }

    #[test]
    fn pod_without_name_is_skipped() {
        assert!(target_from_pod(&pod(json!({"metadata": {}})), "prod").is_none());
    }

    #[test]
    fn targets_sorted_by_ordinal() {
        let targets = ["api-10", "api-2", "api-x", "api-0", "api-1"]
            .into_iter()
            .map(|n| Target::new("prod", n))
            .collect();
        let names: Vec<_> = order_targets("api", targets)
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, ["api-0", "api-1", "api-2", "api-10", "api-x"]);
    }
}
