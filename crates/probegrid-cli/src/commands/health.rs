use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use probegrid_core::config::require_duration;
use probegrid_core::{Endpoint, OutputMode};
use probegrid_kube::{KubeConnector, KubeResolver};
use probegrid_sweep::Sweeper;

use super::GroupArgs;
use crate::render;
use crate::settings::{self, Overrides};

#[derive(Debug, Args)]
pub struct HealthArgs {
    #[command(flatten)]
    pub group: GroupArgs,
    /// health, liveness, readiness, or a literal path
    #[arg(short, long)]
    pub endpoint: Option<Endpoint>,
    /// Remote port for members that declare no health port
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Output: parsed, raw or json
    #[arg(short, long)]
    pub output: Option<OutputMode>,
    /// Per-target timeout for tunnel readiness and the probe (e.g. 5s, 500ms)
    #[arg(long, value_parser = require_duration)]
    pub timeout: Option<Duration>,
    /// Maximum concurrent probes
    #[arg(short, long)]
    pub workers: Option<usize>,
    /// Jobs queued ahead of the workers
    #[arg(long)]
    pub queue_size: Option<usize>,
    /// Config file (default: ./probegrid.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl HealthArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            endpoint: self.endpoint.clone(),
            port: self.port,
            output: self.output,
            timeout: self.timeout,
            workers: self.workers,
            queue_size: self.queue_size,
        }
    }
}

pub async fn run(args: HealthArgs) -> anyhow::Result<()> {
    let config = settings::resolve(args.config.as_deref(), &args.overrides())?;
    let (client, group) = args.group.connect().await?;

    let sweeper = Sweeper::new(
        Arc::new(KubeResolver::new(client.clone())),
        Arc::new(KubeConnector::new(client)),
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling sweep");
            interrupt.cancel();
        }
    });

    let report = sweeper
        .run(&group, &config, &cancel)
        .await
        .with_context(|| format!("health sweep of {group} failed"))?;

    match config.output {
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        mode => print!("{}", render::format_report(&report, mode)),
    }

    Ok(())
}
