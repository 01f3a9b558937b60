//! Sweep configuration: CLI flags over `probegrid.toml` over defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use tracing::debug;

use probegrid_core::{Endpoint, OutputMode, ProbegridConfig, SweepConfig};

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "probegrid.toml";

/// Flag values that override the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub endpoint: Option<Endpoint>,
    pub port: Option<u16>,
    pub output: Option<OutputMode>,
    pub timeout: Option<Duration>,
    pub workers: Option<usize>,
    pub queue_size: Option<usize>,
}

/// Build the sweep configuration for one run.
///
/// An explicit `--config` must exist. The default file is optional.
pub fn resolve(config_path: Option<&Path>, overrides: &Overrides) -> anyhow::Result<SweepConfig> {
    let file = match config_path {
        Some(path) => Some(load(path)?),
        None => {
            let path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if path.is_file() { Some(load(&path)?) } else { None }
        }
    };

    let mut config = match file {
        Some(file) => file.to_sweep_config()?,
        None => SweepConfig::default(),
    };
    apply(&mut config, overrides);
    config.validate()?;

    debug!(?config, "sweep configuration");
    Ok(config)
}

fn load(path: &Path) -> anyhow::Result<ProbegridConfig> {
    ProbegridConfig::from_file(path)
        .with_context(|| format!("loading {}", path.display()))
}

fn apply(config: &mut SweepConfig, overrides: &Overrides) {
    if let Some(endpoint) = &overrides.endpoint {
        config.endpoint = endpoint.clone();
    }
    if let Some(port) = overrides.port {
        config.remote_port = port;
    }
    if let Some(output) = overrides.output {
        config.output = output;
    }
    if let Some(timeout) = overrides.timeout {
        config.pool.request_timeout = timeout;
    }
    if let Some(workers) = overrides.workers {
        config.pool.max_workers = workers;
    }
    if let Some(size) = overrides.queue_size {
        config.pool.queue_size = size;
    }
}
