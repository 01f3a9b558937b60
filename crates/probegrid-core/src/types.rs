//! Domain types shared across probegrid crates.
//!
//! Everything here is produced once per sweep and read-only afterwards.
//! Types that reach the renderer implement `Serialize`; raw response bytes
//! are emitted as (lossy) UTF-8 text.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize, Serializer};

// ── Targets ────────────────────────────────────────────────────────

/// A named group of instances, e.g. a StatefulSet within a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    pub namespace: String,
    pub name: String,
}

impl GroupRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for GroupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// One instance to probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub namespace: String,
    /// Port the instance serves its health endpoint on, when known.
    pub remote_port: Option<u16>,
    /// Whether the resolver reported the instance as ready to serve.
    pub ready: bool,
}

impl Target {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            remote_port: None,
            ready: true,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.remote_port = Some(port);
        self
    }

    pub fn not_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    /// `{namespace}/{name}`.
    pub fn id(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

// ── Health status ──────────────────────────────────────────────────

/// Status literal reported by a health endpoint.
///
/// Literals outside the known set are preserved verbatim in `Other` and
/// never count as up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HealthStatus {
    Up,
    Down,
    Degraded,
    Unknown,
    OutOfService,
    Other(String),
}

impl HealthStatus {
    pub fn as_str(&self) -> &str {
        match self {
            HealthStatus::Up => "UP",
            HealthStatus::Down => "DOWN",
            HealthStatus::Degraded => "DEGRADED",
            HealthStatus::Unknown => "UNKNOWN",
            HealthStatus::OutOfService => "OUT_OF_SERVICE",
            HealthStatus::Other(s) => s,
        }
    }

    pub fn is_up(&self) -> bool {
        *self == HealthStatus::Up
    }

    pub fn is_degraded(&self) -> bool {
        *self == HealthStatus::Degraded
    }

    /// DOWN, UNKNOWN, OUT_OF_SERVICE and unrecognized literals.
    pub fn is_unhealthy(&self) -> bool {
        !self.is_up() && !self.is_degraded()
    }
}

impl From<&str> for HealthStatus {
    fn from(s: &str) -> Self {
        match s {
            "UP" => HealthStatus::Up,
            "DOWN" => HealthStatus::Down,
            "DEGRADED" => HealthStatus::Degraded,
            "UNKNOWN" => HealthStatus::Unknown,
            "OUT_OF_SERVICE" => HealthStatus::OutOfService,
            other => HealthStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for HealthStatus {
    fn from(s: String) -> Self {
        match HealthStatus::from(s.as_str()) {
            HealthStatus::Other(_) => HealthStatus::Other(s),
            known => known,
        }
    }
}

impl From<HealthStatus> for String {
    fn from(status: HealthStatus) -> Self {
        match status {
            HealthStatus::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Snapshot ───────────────────────────────────────────────────────

/// Healthy / degraded / unhealthy counts over top-level components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RollupCounts {
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
}

impl RollupCounts {
    pub fn record(&mut self, status: &HealthStatus) {
        if status.is_up() {
            self.healthy += 1;
        } else if status.is_degraded() {
            self.degraded += 1;
        } else {
            self.unhealthy += 1;
        }
    }

    pub fn total(&self) -> usize {
        self.healthy + self.degraded + self.unhealthy
    }
}

/// A nested unit reported under the `extensions` component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubComponent {
    pub name: String,
    pub status: HealthStatus,
    pub details: String,
}

/// One top-level component of a health payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    /// `key=value` pairs in sorted key order.
    pub details: String,
    /// Only populated for the `extensions` component.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sub_components: Vec<SubComponent>,
}

/// Parsed health payload of one instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub details: String,
    pub counts: RollupCounts,
    /// Response body exactly as received.
    #[serde(skip)]
    pub raw: Bytes,
}

impl HealthSnapshot {
    pub fn component(&self, name: &str) -> Option<&ComponentHealth> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Sub-components of the `extensions` component, if present.
    pub fn extensions(&self) -> &[SubComponent] {
        self.component(EXTENSIONS_COMPONENT)
            .map(|c| c.sub_components.as_slice())
            .unwrap_or(&[])
    }
}

/// Component whose nested components are kept individually instead of
/// being flattened into its detail string.
pub const EXTENSIONS_COMPONENT: &str = "extensions";

// ── Results ────────────────────────────────────────────────────────

/// Final outcome of one job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Probe answered and the top-level status is UP.
    Healthy,
    /// Probe answered with a status other than UP.
    Status(HealthStatus),
    /// Target not ready, no local port, or tunnel never became ready.
    SetupFailure,
    /// Tunnel broke after it became ready.
    TunnelFailure,
    /// Transport error, timeout, bad HTTP status, or unparseable body.
    ProbeFailure,
    /// The sweep was cancelled before the job finished.
    Cancelled,
}

impl Classification {
    /// Classification of a successfully parsed snapshot. Only the
    /// top-level status is consulted.
    pub fn from_status(status: &HealthStatus) -> Self {
        if status.is_up() {
            Classification::Healthy
        } else {
            Classification::Status(status.clone())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Classification::Healthy => "HEALTHY",
            Classification::Status(status) => status.as_str(),
            Classification::SetupFailure => "SETUP_FAILURE",
            Classification::TunnelFailure => "TUNNEL_FAILURE",
            Classification::ProbeFailure => "PROBE_FAILURE",
            Classification::Cancelled => "CANCELLED",
        }
    }

    pub fn is_healthy(&self) -> bool {
        *self == Classification::Healthy
    }

    /// True when no health response was classified.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Classification::Healthy | Classification::Status(_))
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Classification {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Outcome of one job, written once by the worker that ran it.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub index: usize,
    pub target: Target,
    pub classification: Classification,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub error: Option<String>,
    pub snapshot: Option<HealthSnapshot>,
    #[serde(serialize_with = "serialize_lossy")]
    pub raw: Option<Bytes>,
}

impl JobResult {
    /// A result with no response attached.
    pub fn failed(
        index: usize,
        target: Target,
        classification: Classification,
        elapsed: Duration,
        error: impl Into<String>,
    ) -> Self {
        Self {
            index,
            target,
            classification,
            elapsed,
            error: Some(error.into()),
            snapshot: None,
            raw: None,
        }
    }
}

fn serialize_millis<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(d.as_millis() as u64)
}

fn serialize_lossy<S: Serializer>(raw: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error> {
    match raw {
        Some(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_known_literals() {
        for literal in ["UP", "DOWN", "DEGRADED", "UNKNOWN", "OUT_OF_SERVICE"] {
            let status = HealthStatus::from(literal);
            assert!(!matches!(status, HealthStatus::Other(_)), "{literal}");
            assert_eq!(status.as_str(), literal);
        }
    }

    #[test]
    fn unknown_literal_is_preserved_and_not_up() {
        let status = HealthStatus::from("PARTIAL".to_string());
        assert_eq!(status, HealthStatus::Other("PARTIAL".to_string()));
        assert_eq!(status.to_string(), "PARTIAL");
        assert!(!status.is_up());
        assert!(status.is_unhealthy());
    }

    #[test]
    fn status_literals_are_case_sensitive() {
        assert!(!HealthStatus::from("up").is_up());
    }

    #[test]
    fn rollup_buckets() {
        let mut counts = RollupCounts::default();
        for s in ["UP", "UP", "DEGRADED", "DOWN", "UNKNOWN", "OUT_OF_SERVICE"] {
            counts.record(&HealthStatus::from(s));
        }
        assert_eq!(counts.healthy, 2);
        assert_eq!(counts.degraded, 1);
        assert_eq!(counts.unhealthy, 3);
        assert_eq!(counts.total(), 6);
    }

    #[test]
    fn classification_from_status() {
        assert_eq!(Classification::from_status(&HealthStatus::Up), Classification::Healthy);
        let degraded = Classification::from_status(&HealthStatus::Degraded);
        assert_eq!(degraded.label(), "DEGRADED");
        assert!(!degraded.is_healthy());
        assert!(!degraded.is_failure());
        assert!(Classification::SetupFailure.is_failure());
    }

    #[test]
    fn job_result_serializes_labels_and_raw_text() {
        let result = JobResult {
            index: 0,
            target: Target::new("default", "api-0"),
            classification: Classification::Status(HealthStatus::Down),
            elapsed: Duration::from_millis(42),
            error: None,
            snapshot: None,
            raw: Some(Bytes::from_static(b"{\"status\":\"DOWN\"}")),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["classification"], "DOWN");
        assert_eq!(json["elapsed_ms"], 42);
        assert_eq!(json["raw"], "{\"status\":\"DOWN\"}");
    }

    #[test]
    fn target_id() {
        let target = Target::new("prod", "store-2").with_port(9000);
        assert_eq!(target.id(), "prod/store-2");
        assert_eq!(target.remote_port, Some(9000));
        assert!(target.ready);
        assert!(!target.not_ready().ready);
    }
}
