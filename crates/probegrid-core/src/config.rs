//! probegrid.toml configuration parser and per-sweep configuration.
//!
//! The file is optional. Every field is optional and falls back to the
//! built-in defaults; the CLI applies its flags on top of the resulting
//! [`SweepConfig`].

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Fallback remote port when a target does not advertise one.
pub const DEFAULT_REMOTE_PORT: u16 = 8080;
pub const DEFAULT_QUEUE_SIZE: usize = 100;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_DEFAULT_WORKERS: usize = 10;

// ── probegrid.toml ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbegridConfig {
    pub probe: Option<ProbeConfig>,
    pub pool: Option<PoolConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub endpoint: Option<String>,
    pub port: Option<u16>,
    pub timeout: Option<String>,
    pub output: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_workers: Option<usize>,
    pub queue_size: Option<usize>,
    pub shutdown_timeout: Option<String>,
}

impl ProbegridConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Resolve the file contents against the built-in defaults.
    pub fn to_sweep_config(&self) -> ConfigResult<SweepConfig> {
        let mut config = SweepConfig::default();

        if let Some(probe) = &self.probe {
            if let Some(endpoint) = &probe.endpoint {
                config.endpoint = Endpoint::from(endpoint.as_str());
            }
            if let Some(port) = probe.port {
                config.remote_port = port;
            }
            if let Some(timeout) = &probe.timeout {
                config.pool.request_timeout = require_duration(timeout)?;
            }
            if let Some(output) = &probe.output {
                config.output = output.parse()?;
            }
        }

        if let Some(pool) = &self.pool {
            if let Some(workers) = pool.max_workers {
                config.pool.max_workers = workers;
            }
            if let Some(size) = pool.queue_size {
                config.pool.queue_size = size;
            }
            if let Some(timeout) = &pool.shutdown_timeout {
                config.pool.shutdown_timeout = require_duration(timeout)?;
            }
        }

        config.validate()?;
        Ok(config)
    }
}

// ── Sweep configuration ────────────────────────────────────────────

/// Logical health endpoint to probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Health,
    Liveness,
    Readiness,
    /// Any other path, used as given.
    Custom(String),
}

impl Endpoint {
    pub fn path(&self) -> String {
        match self {
            Endpoint::Health => "/actuator/health".to_string(),
            Endpoint::Liveness => "/actuator/health/liveness".to_string(),
            Endpoint::Readiness => "/actuator/health/readiness".to_string(),
            Endpoint::Custom(p) if p.starts_with('/') => p.clone(),
            Endpoint::Custom(p) => format!("/{p}"),
        }
    }
}

impl From<&str> for Endpoint {
    fn from(s: &str) -> Self {
        match s {
            "health" => Endpoint::Health,
            "liveness" => Endpoint::Liveness,
            "readiness" => Endpoint::Readiness,
            other => Endpoint::Custom(other.to_string()),
        }
    }
}

impl FromStr for Endpoint {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Endpoint::from(s))
    }
}

/// How the caller intends to display results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    #[default]
    Parsed,
    Raw,
    Json,
}

impl OutputMode {
    /// In raw mode an unparseable body is not an error.
    pub fn requires_parse(&self) -> bool {
        !matches!(self, OutputMode::Raw)
    }
}

impl FromStr for OutputMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parsed" => Ok(OutputMode::Parsed),
            "raw" => Ok(OutputMode::Raw),
            "json" => Ok(OutputMode::Json),
            other => Err(ConfigError::InvalidOutput(other.to_string())),
        }
    }
}

/// Worker pool sizing and timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_workers: usize,
    pub queue_size: usize,
    /// Bounds tunnel readiness and the probe round trip of each job.
    pub request_timeout: Duration,
    /// How long `stop()` waits for in-flight jobs.
    pub shutdown_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            queue_size: DEFAULT_QUEUE_SIZE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// `min(2 × available parallelism, 10)`.
pub fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_mul(2)
        .min(MAX_DEFAULT_WORKERS)
}

/// Everything one sweep needs to know. Passed by value into each sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    pub endpoint: Endpoint,
    pub output: OutputMode,
    pub remote_port: u16,
    pub pool: PoolSettings,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Health,
            output: OutputMode::Parsed,
            remote_port: DEFAULT_REMOTE_PORT,
            pool: PoolSettings::default(),
        }
    }
}

impl SweepConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.pool.max_workers == 0 {
            return Err(ConfigError::Zero { field: "max_workers" });
        }
        if self.pool.queue_size == 0 {
            return Err(ConfigError::Zero { field: "queue_size" });
        }
        if self.pool.request_timeout.is_zero() {
            return Err(ConfigError::Zero { field: "timeout" });
        }
        Ok(())
    }
}

/// Parse a duration string like "5s", "500ms", "2m". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// [`parse_duration`] as a `Result`, for config and CLI parsing.
pub fn require_duration(s: &str) -> ConfigResult<Duration> {
    parse_duration(s).ok_or_else(|| ConfigError::InvalidDuration(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_endpoints() {
        assert_eq!(Endpoint::from("health").path(), "/actuator/health");
        assert_eq!(Endpoint::from("liveness").path(), "/actuator/health/liveness");
        assert_eq!(Endpoint::from("readiness").path(), "/actuator/health/readiness");
    }

    #[test]
    fn custom_endpoint_is_literal_path() {
        assert_eq!(Endpoint::from("/healthz").path(), "/healthz");
        assert_eq!(Endpoint::from("actuator/health/db").path(), "/actuator/health/db");
    }

    #[test]
    fn output_mode_parse() {
        assert_eq!("raw".parse::<OutputMode>().unwrap(), OutputMode::Raw);
        assert_eq!("json".parse::<OutputMode>().unwrap(), OutputMode::Json);
        assert!(matches!(
            "yaml".parse::<OutputMode>(),
            Err(ConfigError::InvalidOutput(_))
        ));
        assert!(!OutputMode::Raw.requires_parse());
        assert!(OutputMode::Json.requires_parse());
    }

    #[test]
    fn pool_defaults() {
        let pool = PoolSettings::default();
        assert!(pool.max_workers >= 1 && pool.max_workers <= 10);
        assert_eq!(pool.queue_size, 100);
        assert_eq!(pool.request_timeout, Duration::from_secs(30));
        assert_eq!(pool.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn parse_durations() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn overflowing_minutes_are_invalid() {
        assert_eq!(parse_duration("400000000000000000m"), None);
        assert!(matches!(
            require_duration("400000000000000000m"),
            Err(ConfigError::InvalidDuration(_))
        ));
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config = ProbegridConfig::from_toml("").unwrap();
        assert_eq!(config.to_sweep_config().unwrap(), SweepConfig::default());
    }

    #[test]
    fn file_overrides_defaults() {
        let toml_str = r#"
[probe]
endpoint = "readiness"
port = 9090
timeout = "2s"
output = "raw"

[pool]
max_workers = 3
queue_size = 7
shutdown_timeout = "500ms"
"#;
        let config = ProbegridConfig::from_toml(toml_str)
            .unwrap()
            .to_sweep_config()
            .unwrap();
        assert_eq!(config.endpoint, Endpoint::Readiness);
        assert_eq!(config.remote_port, 9090);
        assert_eq!(config.output, OutputMode::Raw);
        assert_eq!(config.pool.max_workers, 3);
        assert_eq!(config.pool.queue_size, 7);
        assert_eq!(config.pool.request_timeout, Duration::from_secs(2));
        assert_eq!(config.pool.shutdown_timeout, Duration::from_millis(500));
    }

    #[test]
    fn zero_workers_rejected() {
        let config = ProbegridConfig::from_toml("[pool]\nmax_workers = 0\n").unwrap();
        assert!(matches!(
            config.to_sweep_config(),
            Err(ConfigError::Zero { field: "max_workers" })
        ));
    }

    #[test]
    fn bad_duration_rejected() {
        let config = ProbegridConfig::from_toml("[probe]\ntimeout = \"fast\"\n").unwrap();
        assert!(matches!(
            config.to_sweep_config(),
            Err(ConfigError::InvalidDuration(_))
        ));
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probegrid.toml");
        std::fs::write(&path, "[probe]\nendpoint = \"liveness\"\n").unwrap();
        let config = ProbegridConfig::from_file(&path).unwrap();
        assert_eq!(
            config.to_sweep_config().unwrap().endpoint,
            Endpoint::Liveness
        );
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = ProbegridConfig::from_file(Path::new("/nonexistent/probegrid.toml"));
        assert!(matches!(err, Err(ConfigError::Read(_))));
    }
}
