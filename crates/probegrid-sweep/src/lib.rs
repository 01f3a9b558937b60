//! probegrid-sweep — the fan-out/fan-in health sweep engine.
//!
//! # Architecture
//!
//! ```text
//! Sweeper::run(group, config, cancel)
//!   ├── TargetResolver::list_targets()       → N targets
//!   ├── ResultSlots (N write-once cells)
//!   ├── WorkerPool (max_workers tasks, bounded queue)
//!   │   └── per job: HealthCheckExecutor
//!   │       ├── TunnelManager::run()         → tunnel scoped to the job
//!   │       └── probegrid_health::probe()    → ProbeOutcome
//!   └── SweepReport (ordered results + summary)
//! ```
//!
//! One job per target, one attempt per job. Failures of individual jobs
//! end up in their result slot; only run-wide problems (no targets,
//! resolver failure, invalid config) fail the sweep.

pub mod error;
pub mod job;
pub mod pool;
pub mod report;
pub mod sweep;

pub use error::{PoolError, SweepError, SweepResult};
pub use job::{ExecuteFuture, HealthCheckExecutor, Job, JobExecutor, JobSpec, ResultSlot, ResultSlots};
pub use pool::WorkerPool;
pub use report::{Summary, SweepReport};
pub use sweep::{Sweeper, sweep_targets};
