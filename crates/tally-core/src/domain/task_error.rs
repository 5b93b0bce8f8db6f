//! Task error record: deduplicated failure information.

use chrono::{DateTime, Utc};

use super::ids::ReportId;

/// Task type tag used for report tree nodes.
pub const REPORT_TASK_TYPE: &str = "report";

/// Failure information for one task, keyed by `(task_type, task_id)`.
///
/// A task that fails over and over would otherwise flood the store with
/// duplicate rows. All errors for one task collapse into a single record:
/// `count` holds how many times it has failed, while message, traceback and
/// timestamp keep the latest occurrence for debugging.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskError {
    pub task_type: String,
    pub task_id: ReportId,
    pub message: String,
    pub traceback: String,
    pub timestamp: DateTime<Utc>,
    pub count: u32,
}

impl TaskError {
    pub fn new(
        task_type: impl Into<String>,
        task_id: ReportId,
        message: impl Into<String>,
        traceback: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_type: task_type.into(),
            task_id,
            message: message.into(),
            traceback: traceback.into(),
            timestamp: now,
            count: 1,
        }
    }

    /// Fold a repeat failure into this record.
    pub fn record_again(
        &mut self,
        message: impl Into<String>,
        traceback: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.message = message.into();
        self.traceback = traceback.into();
        self.timestamp = now;
        self.count += 1;
    }
}
