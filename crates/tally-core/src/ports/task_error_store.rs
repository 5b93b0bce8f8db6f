//! TaskErrorStore port: deduplicated failure records.

use async_trait::async_trait;

use crate::domain::{ReportId, TaskError};
use crate::ports::report_store::StoreError;

#[async_trait]
pub trait TaskErrorStore: Send + Sync {
    /// Record a failure for `(task_type, task_id)`.
    ///
    /// A new failure for an already-failed task updates the existing row in
    /// place and increments its count instead of inserting another row.
    async fn record(
        &self,
        task_type: &str,
        task_id: ReportId,
        message: &str,
        traceback: &str,
    ) -> Result<(), StoreError>;

    async fn get(
        &self,
        task_type: &str,
        task_id: ReportId,
    ) -> Result<Option<TaskError>, StoreError>;
}
