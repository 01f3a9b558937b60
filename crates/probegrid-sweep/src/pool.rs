//! Worker pool: a bounded queue feeding a fixed set of workers.
//!
//! `start()` spawns `max_workers` tasks that pull jobs until the queue is
//! closed. `submit()` blocks while the queue is full. `stop()` closes the
//! queue and waits up to `shutdown_timeout` for the workers to drain it.
//!
//! Each job runs in its own task with its own child cancellation token, so
//! a panicking executor costs one result, not a worker. If `stop()` times
//! out it cancels the pool token: jobs still running observe it, close
//! their tunnels and record `CANCELLED`. Workers are detached rather than
//! aborted so every slot still gets written.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use probegrid_core::{Classification, JobResult, PoolSettings};

use crate::error::PoolError;
use crate::job::{Job, JobExecutor};

type JobQueue = Arc<Mutex<mpsc::Receiver<Job>>>;

/// Fixed-size pool executing [`Job`]s with a shared executor.
pub struct WorkerPool {
    settings: PoolSettings,
    executor: Arc<dyn JobExecutor>,
    sender: Option<mpsc::Sender<Job>>,
    receiver: JobQueue,
    workers: JoinSet<()>,
    started: bool,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Create a pool whose jobs are cancelled together with `parent`.
    pub fn new(
        settings: PoolSettings,
        executor: Arc<dyn JobExecutor>,
        parent: &CancellationToken,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(settings.queue_size.max(1));
        Self {
            settings,
            executor,
            sender: Some(sender),
            receiver: Arc::new(Mutex::new(receiver)),
            workers: JoinSet::new(),
            started: false,
            cancel: parent.child_token(),
        }
    }

    /// Spawn the workers. Calling it a second time is an error.
    pub fn start(&mut self) -> Result<(), PoolError> {
        if self.started {
            return Err(PoolError::AlreadyStarted);
        }
        self.started = true;

        for worker_id in 0..self.settings.max_workers.max(1) {
            let queue = self.receiver.clone();
            let executor = self.executor.clone();
            let cancel = self.cancel.clone();
            self.workers
                .spawn(async move { worker_loop(worker_id, queue, executor, cancel).await });
        }

        debug!(workers = self.settings.max_workers, queue_size = self.settings.queue_size, "worker pool started");
        Ok(())
    }

    /// Enqueue a job, waiting for queue space if necessary.
    ///
    /// A job that cannot be enqueued gets a `CANCELLED` result in its
    /// slot before the error is returned.
    pub async fn submit(&self, job: Job) -> Result<(), PoolError> {
        let Some(sender) = &self.sender else {
            job.reject(Classification::Cancelled, "worker pool is stopped");
            return Err(PoolError::Closed);
        };

        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PoolError::Cancelled),
            reserved = sender.reserve() => reserved.map_err(|_| PoolError::Closed),
        };

        match permit {
            Ok(permit) => {
                permit.send(job);
                Ok(())
            }
            Err(e) => {
                job.reject(Classification::Cancelled, &e.to_string());
                Err(e)
            }
        }
    }

    /// Close the queue and wait for workers to finish what is queued.
    pub async fn stop(&mut self) -> Result<(), PoolError> {
        self.sender.take();

        let timeout = self.settings.shutdown_timeout;
        let drained = tokio::time::timeout(timeout, async {
            while let Some(joined) = self.workers.join_next().await {
                if let Err(e) = joined {
                    error!(error = %e, "worker task failed");
                }
            }
        })
        .await;

        match drained {
            Ok(()) => {
                debug!("worker pool stopped");
                Ok(())
            }
            Err(_) => {
                warn!(?timeout, remaining = self.workers.len(), "workers still busy at shutdown, cancelling their jobs");
                self.cancel.cancel();
                self.workers.detach_all();
                Err(PoolError::ShutdownTimeout(timeout))
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: JobQueue,
    executor: Arc<dyn JobExecutor>,
    cancel: CancellationToken,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(job) = next else {
            break;
        };
        run_job(worker_id, job, &executor, &cancel).await;
    }
    debug!(worker_id, "worker exiting");
}

async fn run_job(
    worker_id: usize,
    job: Job,
    executor: &Arc<dyn JobExecutor>,
    cancel: &CancellationToken,
) {
    let (spec, slot) = job.into_parts();
    let index = spec.index;
    let target = spec.target.clone();
    let started = Instant::now();

    debug!(worker_id, index, instance = %target.id(), "job started");

    let executor = executor.clone();
    let job_cancel = cancel.child_token();
    let handle = tokio::spawn(async move { executor.execute(&spec, job_cancel).await });

    let result = match handle.await {
        Ok(result) => result,
        Err(e) => {
            error!(worker_id, index, instance = %target.id(), error = %e, "job task failed");
            JobResult::failed(
                index,
                target,
                Classification::ProbeFailure,
                started.elapsed(),
                format!("job task failed: {e}"),
            )
        }
    };

    if result.classification.is_failure() {
        debug!(worker_id, index, instance = %result.target.id(), classification = %result.classification, error = result.error.as_deref().unwrap_or(""), "job failed");
    }
    slot.write(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use probegrid_core::{Endpoint, OutputMode, Target};
    use probegrid_health::ProbeOptions;

    use crate::job::{ExecuteFuture, JobSpec, ResultSlots};

    /// Sleeps, then reports healthy. Panics for the configured index.
    struct SleepExecutor {
        delay: Duration,
        panic_on: Option<usize>,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SleepExecutor {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                panic_on: None,
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl JobExecutor for SleepExecutor {
        fn execute<'a>(&'a self, spec: &'a JobSpec, cancel: CancellationToken) -> ExecuteFuture<'a> {
            Box::pin(async move {
                if self.panic_on == Some(spec.index) {
                    panic!("executor bug");
                }
                let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);

                let classification = tokio::select! {
                    _ = cancel.cancelled() => Classification::Cancelled,
                    _ = tokio::time::sleep(self.delay) => Classification::Healthy,
                };

                self.running.fetch_sub(1, Ordering::SeqCst);
                JobResult {
                    index: spec.index,
                    target: spec.target.clone(),
                    classification,
                    elapsed: self.delay,
                    error: None,
                    snapshot: None,
                    raw: None,
                }
            })
        }
    }

    fn settings(max_workers: usize, queue_size: usize) -> PoolSettings {
        PoolSettings {
            max_workers,
            queue_size,
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    fn job(slots: &Arc<ResultSlots>, index: usize) -> Job {
        Job::new(
            JobSpec {
                index,
                target: Target::new("default", format!("api-{index}")),
                remote_port: 8080,
                options: ProbeOptions {
                    endpoint: Endpoint::Health,
                    timeout: Duration::from_secs(1),
                    output: OutputMode::Parsed,
                },
            },
            slots.slot(index),
        )
    }

    #[tokio::test]
    async fn every_job_gets_a_result_at_its_index() {
        for n in [0, 1, 7, 25] {
            let executor = Arc::new(SleepExecutor::new(Duration::from_millis(1)));
            let mut pool = WorkerPool::new(settings(4, 100), executor, &CancellationToken::new());
            pool.start().unwrap();

            let slots = ResultSlots::new(n);
            for i in 0..n {
                pool.submit(job(&slots, i)).await.unwrap();
            }
            slots.wait_all().await;
            pool.stop().await.unwrap();

            for i in 0..n {
                let result = slots.get(i).unwrap();
                assert_eq!(result.index, i);
                assert_eq!(result.target.name, format!("api-{i}"));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded_by_max_workers() {
        let executor = Arc::new(SleepExecutor::new(Duration::from_millis(100)));
        let mut pool = WorkerPool::new(settings(2, 100), executor.clone(), &CancellationToken::new());
        pool.start().unwrap();

        let started = tokio::time::Instant::now();
        let slots = ResultSlots::new(10);
        for i in 0..10 {
            pool.submit(job(&slots, i)).await.unwrap();
        }
        slots.wait_all().await;
        let elapsed = started.elapsed();
        pool.stop().await.unwrap();

        assert!(elapsed >= Duration::from_millis(500), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(600), "{elapsed:?}");
        assert_eq!(executor.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stop_right_after_start_is_prompt() {
        let executor = Arc::new(SleepExecutor::new(Duration::from_millis(1)));
        let mut pool = WorkerPool::new(settings(4, 10), executor, &CancellationToken::new());
        pool.start().unwrap();

        let started = Instant::now();
        pool.stop().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let executor = Arc::new(SleepExecutor::new(Duration::from_millis(1)));
        let mut pool = WorkerPool::new(settings(1, 1), executor, &CancellationToken::new());
        pool.start().unwrap();
        assert_eq!(pool.start(), Err(PoolError::AlreadyStarted));
        pool.stop().await.unwrap();
    }

    #[tokio::test]
    async fn submit_after_stop_records_cancelled() {
        let executor = Arc::new(SleepExecutor::new(Duration::from_millis(1)));
        let mut pool = WorkerPool::new(settings(1, 1), executor, &CancellationToken::new());
        pool.start().unwrap();
        pool.stop().await.unwrap();

        let slots = ResultSlots::new(1);
        assert_eq!(pool.submit(job(&slots, 0)).await, Err(PoolError::Closed));
        assert_eq!(slots.get(0).unwrap().classification, Classification::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_blocks_until_cancelled() {
        let executor = Arc::new(SleepExecutor::new(Duration::from_millis(1)));
        let parent = CancellationToken::new();
        // Not started: nothing drains the queue.
        let pool = WorkerPool::new(settings(1, 1), executor, &parent);

        let slots = ResultSlots::new(2);
        pool.submit(job(&slots, 0)).await.unwrap();

        let blocked =
            tokio::time::timeout(Duration::from_millis(100), pool.submit(job(&slots, 1))).await;
        assert!(blocked.is_err(), "submit should block on a full queue");

        parent.cancel();
        assert_eq!(pool.submit(job(&slots, 1)).await, Err(PoolError::Cancelled));
        assert_eq!(slots.get(1).unwrap().classification, Classification::Cancelled);
    }

    #[tokio::test]
    async fn panicking_job_is_contained() {
        let mut executor = SleepExecutor::new(Duration::from_millis(1));
        executor.panic_on = Some(1);
        let mut pool = WorkerPool::new(settings(1, 10), Arc::new(executor), &CancellationToken::new());
        pool.start().unwrap();

        let slots = ResultSlots::new(3);
        for i in 0..3 {
            pool.submit(job(&slots, i)).await.unwrap();
        }
        slots.wait_all().await;
        pool.stop().await.unwrap();

        assert_eq!(slots.get(0).unwrap().classification, Classification::Healthy);
        let failed = slots.get(1).unwrap();
        assert_eq!(failed.classification, Classification::ProbeFailure);
        assert!(failed.error.as_ref().unwrap().contains("panic"));
        assert_eq!(slots.get(2).unwrap().classification, Classification::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_timeout_cancels_stragglers() {
        let executor = Arc::new(SleepExecutor::new(Duration::from_secs(60)));
        let mut s = settings(1, 10);
        s.shutdown_timeout = Duration::from_millis(100);
        let mut pool = WorkerPool::new(s, executor, &CancellationToken::new());
        pool.start().unwrap();

        let slots = ResultSlots::new(1);
        pool.submit(job(&slots, 0)).await.unwrap();
        tokio::task::yield_now().await;

        assert_eq!(
            pool.stop().await,
            Err(PoolError::ShutdownTimeout(Duration::from_millis(100)))
        );
        slots.wait_all().await;
        assert_eq!(slots.get(0).unwrap().classification, Classification::Cancelled);
    }
}
