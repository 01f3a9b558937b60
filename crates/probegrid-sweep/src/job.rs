//! Jobs, their result slots, and the health-check executor.
//!
//! Every job carries the slot its result must land in. Slots are
//! pre-sized to the number of targets and written at most once, so the
//! final report keeps submission order whatever order jobs finish in.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use probegrid_core::{Classification, JobResult, Target};
use probegrid_health::{ProbeOptions, probe};
use probegrid_tunnel::{TunnelManager, TunnelRunError};

// ── Jobs ───────────────────────────────────────────────────────────

/// What to check for one target.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub index: usize,
    pub target: Target,
    pub remote_port: u16,
    pub options: ProbeOptions,
}

/// A job as submitted to the pool: its spec plus where its result goes.
#[derive(Debug)]
pub struct Job {
    spec: JobSpec,
    slot: ResultSlot,
}

impl Job {
    pub fn new(spec: JobSpec, slot: ResultSlot) -> Self {
        Self { spec, slot }
    }

    pub(crate) fn into_parts(self) -> (JobSpec, ResultSlot) {
        (self.spec, self.slot)
    }

    /// Record a result for a job that will never run.
    pub(crate) fn reject(self, classification: Classification, reason: &str) {
        let result = JobResult::failed(
            self.spec.index,
            self.spec.target,
            classification,
            Duration::ZERO,
            reason,
        );
        self.slot.write(result);
    }
}

// ── Result slots ───────────────────────────────────────────────────

/// One write-once cell per job, plus a counter of filled cells.
#[derive(Debug)]
pub struct ResultSlots {
    slots: Vec<OnceLock<JobResult>>,
    filled: Semaphore,
}

impl ResultSlots {
    pub fn new(len: usize) -> Arc<Self> {
        Arc::new(Self {
            slots: (0..len).map(|_| OnceLock::new()).collect(),
            filled: Semaphore::new(0),
        })
    }

    /// Handle for writing the result of job `index`.
    pub fn slot(self: &Arc<Self>, index: usize) -> ResultSlot {
        ResultSlot {
            slots: self.clone(),
            index,
        }
    }

    pub fn get(&self, index: usize) -> Option<&JobResult> {
        self.slots.get(index).and_then(OnceLock::get)
    }

    /// Wait until every slot has been written.
    pub async fn wait_all(&self) {
        let n = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        // The semaphore is never closed, so acquire only fails on overflow.
        if let Ok(permits) = self.filled.acquire_many(n).await {
            permits.forget();
            self.filled.add_permits(n as usize);
        }
    }
}

/// Exclusive write access to one slot.
#[derive(Debug)]
pub struct ResultSlot {
    slots: Arc<ResultSlots>,
    index: usize,
}

impl ResultSlot {
    /// Store the result. Returns `false` if the slot was already written.
    pub fn write(self, result: JobResult) -> bool {
        let Some(cell) = self.slots.slots.get(self.index) else {
            warn!(index = self.index, "result slot out of range");
            return false;
        };
        if cell.set(result).is_err() {
            warn!(index = self.index, "result slot written twice");
            return false;
        }
        self.slots.filled.add_permits(1);
        true
    }
}

// ── Executors ──────────────────────────────────────────────────────

/// Boxed future returned by [`JobExecutor::execute`].
pub type ExecuteFuture<'a> = Pin<Box<dyn Future<Output = JobResult> + Send + 'a>>;

/// Runs one job to a result. Must never fail: every outcome is a result.
pub trait JobExecutor: Send + Sync {
    fn execute<'a>(&'a self, spec: &'a JobSpec, cancel: CancellationToken) -> ExecuteFuture<'a>;
}

/// Tunnel → probe → parse for one target.
#[derive(Clone)]
pub struct HealthCheckExecutor {
    tunnels: TunnelManager,
}

impl HealthCheckExecutor {
    pub fn new(tunnels: TunnelManager) -> Self {
        Self { tunnels }
    }
}

impl JobExecutor for HealthCheckExecutor {
    fn execute<'a>(&'a self, spec: &'a JobSpec, cancel: CancellationToken) -> ExecuteFuture<'a> {
        Box::pin(async move {
            let started = Instant::now();
            let outcome = self
                .tunnels
                .run(&spec.target, spec.remote_port, &cancel, |port| {
                    probe(port, &spec.options)
                })
                .await;
            let elapsed = started.elapsed();

            let result = match outcome {
                Ok(outcome) => JobResult {
                    index: spec.index,
                    target: spec.target.clone(),
                    classification: outcome.classification,
                    elapsed,
                    error: outcome.error,
                    snapshot: outcome.snapshot,
                    raw: Some(outcome.raw),
                },
                Err(e) => {
                    let classification = match &e {
                        TunnelRunError::Setup(_) => Classification::SetupFailure,
                        TunnelRunError::Tunnel(_) => Classification::TunnelFailure,
                        TunnelRunError::Operation(_) => Classification::ProbeFailure,
                        TunnelRunError::Cancelled => Classification::Cancelled,
                    };
                    JobResult::failed(
                        spec.index,
                        spec.target.clone(),
                        classification,
                        elapsed,
                        e.to_string(),
                    )
                }
            };

            debug!(
                instance = %spec.target.id(),
                classification = %result.classification,
                elapsed_ms = elapsed.as_millis() as u64,
                "job finished"
            );
            result
        })
    }
}
