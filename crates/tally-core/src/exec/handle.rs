//! Report handle: status and final result of a scheduled tree.

use std::sync::Arc;

use crate::domain::{ReportId, ReportStatus};
use crate::ports::report_store::{ReportStore, StoreError};

use super::queue::{DoneReceiver, TaskOutput};

/// Handle to one scheduled report run.
///
/// Status comes from the durable record; the final output resolves through
/// the queue's done channel. Production code paths fire and forget; waiting
/// is for tests, the CLI and the occasional synchronous caller.
pub struct ReportHandle {
    id: ReportId,
    store: Arc<dyn ReportStore>,
    done: DoneReceiver,
}

impl ReportHandle {
    pub(crate) fn new(id: ReportId, store: Arc<dyn ReportStore>, done: DoneReceiver) -> Self {
        Self { id, store, done }
    }

    pub fn id(&self) -> ReportId {
        self.id
    }

    pub async fn status(&self) -> Result<ReportStatus, StoreError> {
        Ok(self.store.get(self.id).await?.status)
    }

    /// Block until the root completes and return its output.
    pub async fn wait(mut self) -> TaskOutput {
        loop {
            if let Some(output) = self.done.borrow_and_update().clone() {
                return output;
            }
            if self.done.changed().await.is_err() {
                return TaskOutput::Failure("executor went away".to_string());
            }
        }
    }
}
