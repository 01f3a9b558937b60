//! Sweep orchestration: resolve a group, fan out one job per target,
//! collect results in target order.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use probegrid_core::{
    Classification, GroupRef, JobResult, SweepConfig, Target, TargetResolver,
};
use probegrid_health::ProbeOptions;
use probegrid_tunnel::{TunnelConnector, TunnelManager};

use crate::error::{SweepError, SweepResult};
use crate::job::{HealthCheckExecutor, Job, JobExecutor, JobSpec, ResultSlots};
use crate::pool::WorkerPool;
use crate::report::SweepReport;

/// Runs health sweeps against groups resolved by a [`TargetResolver`].
#[derive(Clone)]
pub struct Sweeper {
    resolver: Arc<dyn TargetResolver>,
    connector: Arc<dyn TunnelConnector>,
}

impl Sweeper {
    pub fn new(resolver: Arc<dyn TargetResolver>, connector: Arc<dyn TunnelConnector>) -> Self {
        Self {
            resolver,
            connector,
        }
    }

    /// Resolve `group` and check every member once.
    ///
    /// Per-target failures land in the report. Only an invalid config, a
    /// resolver error, or an empty group fail the call.
    pub async fn run(
        &self,
        group: &GroupRef,
        config: &SweepConfig,
        cancel: &CancellationToken,
    ) -> SweepResult<SweepReport> {
        config.validate()?;

        let targets = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SweepError::Cancelled),
            targets = self.resolver.list_targets(group) => targets?,
        };
        if targets.is_empty() {
            return Err(SweepError::NoTargets(group.to_string()));
        }
        info!(group = %group, targets = targets.len(), "resolved group");

        let tunnels = TunnelManager::new(self.connector.clone(), config.pool.request_timeout);
        let executor = Arc::new(HealthCheckExecutor::new(tunnels));
        sweep_targets(group, targets, config, executor, cancel).await
    }
}

/// Run one job per target through a fresh pool.
///
/// Results come back in `targets` order. A cancelled sweep still returns
/// a full report, with `CANCELLED` for every job that did not finish.
pub async fn sweep_targets(
    group: &GroupRef,
    targets: Vec<Target>,
    config: &SweepConfig,
    executor: Arc<dyn JobExecutor>,
    cancel: &CancellationToken,
) -> SweepResult<SweepReport> {
    let started = Instant::now();
    let options = ProbeOptions {
        endpoint: config.endpoint.clone(),
        timeout: config.pool.request_timeout,
        output: config.output,
    };

    let slots = ResultSlots::new(targets.len());
    let mut pool = WorkerPool::new(config.pool.clone(), executor, cancel);
    pool.start()?;

    for (index, target) in targets.iter().enumerate() {
        let spec = JobSpec {
            index,
            remote_port: target.remote_port.unwrap_or(config.remote_port),
            target: target.clone(),
            options: options.clone(),
        };
        // A rejected job has already recorded CANCELLED in its slot.
        if let Err(e) = pool.submit(Job::new(spec, slots.slot(index))).await {
            warn!(group = %group, index, error = %e, "job not submitted");
        }
    }

    slots.wait_all().await;
    if let Err(e) = pool.stop().await {
        warn!(group = %group, error = %e, "worker pool did not stop cleanly");
    }

    let results: Vec<JobResult> = targets
        .into_iter()
        .enumerate()
        .map(|(index, target)| match slots.get(index) {
            Some(result) => result.clone(),
            None => JobResult::failed(
                index,
                target,
                Classification::Cancelled,
                started.elapsed(),
                "no result recorded",
            ),
        })
        .collect();

    let report = SweepReport::new(group, results, started.elapsed());
    info!(
        group = %group,
        summary = %report.summary_line(),
        duration_ms = report.duration.as_millis() as u64,
        "sweep finished"
    );
    Ok(report)
}
