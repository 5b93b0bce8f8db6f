//! Execution: work queue, worker pool, and per-kind task semantics.

pub mod context;
pub mod error;
pub mod handle;
pub mod queue;
pub mod retry;
mod run_task;
pub mod worker;

pub use self::context::ExecContext;
pub use self::error::RunError;
pub use self::handle::ReportHandle;
pub use self::queue::{TaskKey, TaskOutput, WorkItem, WorkQueue};
pub use self::retry::RetryPolicy;
pub use self::worker::WorkerPool;

use std::time::Duration;

/// Tuning knobs for the execution engine.
///
/// Passed explicitly into the engine builder; tests shrink worker counts and
/// timeouts here instead of reaching for ambient global state.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Size of the worker pool.
    pub workers: usize,

    /// Soft time limit for one leaf computation.
    pub leaf_timeout: Duration,

    pub retry: RetryPolicy,

    /// Upper bound on backfill children created per scheduler pass.
    pub backfill_cap: usize,

    /// How long per-day public files stay on disk.
    pub retention_days: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            leaf_timeout: Duration::from_secs(3600),
            retry: RetryPolicy::default(),
            backfill_cap: 365,
            retention_days: 10,
        }
    }
}
