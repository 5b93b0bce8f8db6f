//! Execution context: the ports a worker needs while running tasks.

use std::sync::Arc;

use crate::ports::clock::Clock;
use crate::ports::report_store::ReportStore;
use crate::ports::task_error_store::TaskErrorStore;
use crate::publish::PublicReportFileManager;

use super::SchedulerConfig;

/// Shared, read-only bundle handed to every worker.
pub struct ExecContext {
    pub store: Arc<dyn ReportStore>,
    pub errors: Arc<dyn TaskErrorStore>,
    pub files: Arc<PublicReportFileManager>,
    pub clock: Arc<dyn Clock>,
    pub config: SchedulerConfig,
}
