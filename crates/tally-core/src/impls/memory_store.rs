//! In-memory store implementations (dev and tests).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::{
    CorrelationKey, OwnerId, RecordKind, ReportId, ReportRecord, ReportStatus, TaskError,
};
use crate::ports::report_store::{ReportStore, StatusCounts, StoreError};
use crate::ports::task_error_store::TaskErrorStore;

/// In-memory report store state.
struct ReportStoreState {
    /// All records (single source of truth).
    records: HashMap<ReportId, ReportRecord>,
}

impl ReportStoreState {
    fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    fn counts_by_status(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for record in self.records.values() {
            match record.status {
                ReportStatus::Pending => counts.pending += 1,
                ReportStatus::Started => counts.started += 1,
                ReportStatus::Success => counts.success += 1,
                ReportStatus::Failure => counts.failure += 1,
            }
        }
        counts
    }
}

/// In-memory [`ReportStore`].
pub struct InMemoryReportStore {
    state: Arc<Mutex<ReportStoreState>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ReportStoreState::new())),
        }
    }
}

impl Default for InMemoryReportStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn insert(&self, record: ReportRecord) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;

        if state.records.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id));
        }

        // Uniqueness of (parent, day): one live run per calendar day per
        // parent. A FAILURE child is replaced, so a failed day can be
        // retried on a later scheduler pass.
        if let Some(parent) = record.recurrent_parent_id {
            let day = record.created_day();
            let clash = state
                .records
                .values()
                .find(|r| r.recurrent_parent_id == Some(parent) && r.created_day() == day)
                .map(|r| (r.id, r.status));
            match clash {
                Some((failed_id, ReportStatus::Failure)) => {
                    state.records.remove(&failed_id);
                }
                Some(_) => return Err(StoreError::DuplicateChildDay { parent, day }),
                None => {}
            }
        }

        state.records.insert(record.id, record);
        Ok(())
    }

    async fn get(&self, id: ReportId) -> Result<ReportRecord, StoreError> {
        let state = self.state.lock().await;
        state.records.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn update_status(
        &self,
        id: ReportId,
        status: ReportStatus,
        correlation_key: Option<CorrelationKey>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let record = state.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if !record.status.can_transition_to(status) {
            return Err(StoreError::IllegalTransition {
                id,
                current: record.status,
                requested: status,
            });
        }

        match status {
            ReportStatus::Pending => record.reset_for_rerun(),
            ReportStatus::Started => record.mark_started(correlation_key),
            ReportStatus::Success => record.mark_success(),
            ReportStatus::Failure => record.mark_failure(),
        }
        if status != ReportStatus::Started && correlation_key.is_some() {
            record.correlation_key = correlation_key;
            record.updated = Utc::now();
        }
        Ok(())
    }

    async fn set_public(&self, id: ReportId, public: bool) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let record = state.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.public = public;
        record.updated = Utc::now();
        Ok(())
    }

    async fn recurrent_parents(
        &self,
        only: Option<ReportId>,
    ) -> Result<Vec<ReportRecord>, StoreError> {
        let state = self.state.lock().await;
        let mut parents: Vec<ReportRecord> = state
            .records
            .values()
            .filter(|r| r.kind() == RecordKind::RecurringParent)
            .filter(|r| only.is_none_or(|id| r.id == id))
            .cloned()
            .collect();
        parents.sort_by_key(|r| r.id);
        Ok(parents)
    }

    async fn child_runs(
        &self,
        parent: ReportId,
        from: DateTime<Utc>,
    ) -> Result<Vec<ReportRecord>, StoreError> {
        let state = self.state.lock().await;
        let mut children: Vec<ReportRecord> = state
            .records
            .values()
            .filter(|r| r.recurrent_parent_id == Some(parent) && r.created >= from)
            .cloned()
            .collect();
        children.sort_by_key(|r| r.created);
        Ok(children)
    }

    async fn delete_pending_children(
        &self,
        parent: ReportId,
        from: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut state = self.state.lock().await;
        let stale: Vec<ReportId> = state
            .records
            .values()
            .filter(|r| {
                r.recurrent_parent_id == Some(parent)
                    && r.created >= from
                    && r.status == ReportStatus::Pending
            })
            .map(|r| r.id)
            .collect();
        for id in &stale {
            state.records.remove(id);
        }
        Ok(stale.len())
    }

    async fn list_visible(&self, owner: OwnerId) -> Result<Vec<ReportRecord>, StoreError> {
        let state = self.state.lock().await;
        let mut visible: Vec<ReportRecord> = state
            .records
            .values()
            .filter(|r| r.show_in_ui && r.owner_id == owner)
            .cloned()
            .collect();
        visible.sort_by_key(|r| r.created);
        Ok(visible)
    }

    async fn counts_by_status(&self) -> Result<StatusCounts, StoreError> {
        let state = self.state.lock().await;
        Ok(state.counts_by_status())
    }
}

/// In-memory [`TaskErrorStore`].
pub struct InMemoryTaskErrorStore {
    state: Arc<Mutex<HashMap<(String, ReportId), TaskError>>>,
}

impl InMemoryTaskErrorStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryTaskErrorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskErrorStore for InMemoryTaskErrorStore {
    async fn record(
        &self,
        task_type: &str,
        task_id: ReportId,
        message: &str,
        traceback: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        state
            .entry((task_type.to_string(), task_id))
            .and_modify(|existing| existing.record_again(message, traceback, now))
            .or_insert_with(|| TaskError::new(task_type, task_id, message, traceback, now));
        Ok(())
    }

    async fn get(
        &self,
        task_type: &str,
        task_id: ReportId,
    ) -> Result<Option<TaskError>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.get(&(task_type.to_string(), task_id)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::REPORT_TASK_TYPE;
    use chrono::TimeZone;
    use ulid::Ulid;

    fn new_id() -> ReportId {
        ReportId::from_ulid(Ulid::new())
    }

    fn record_created(day: u32) -> ReportRecord {
        ReportRecord::new(
            new_id(),
            OwnerId(1),
            "r",
            serde_json::json!({}),
            Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn insert_and_get_round_trip() {
        let store = InMemoryReportStore::new();
        let record = record_created(1);
        let id = record.id;

        store.insert(record.clone()).await.unwrap();
        let loaded = store.get(id).await.unwrap();
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn duplicate_child_day_is_rejected() {
        let store = InMemoryReportStore::new();
        let parent = record_created(1).as_recurrent_parent();
        let parent_id = parent.id;
        store.insert(parent).await.unwrap();

        store
            .insert(record_created(2).as_child_of(parent_id))
            .await
            .unwrap();

        let clash = store
            .insert(record_created(2).as_child_of(parent_id))
            .await;
        assert!(matches!(clash, Err(StoreError::DuplicateChildDay { .. })));
    }

    #[tokio::test]
    async fn failed_child_day_is_replaced_on_insert() {
        let store = InMemoryReportStore::new();
        let parent = record_created(1).as_recurrent_parent();
        let parent_id = parent.id;
        let from = parent.created;
        store.insert(parent).await.unwrap();

        let failed = record_created(2).as_child_of(parent_id);
        let failed_id = failed.id;
        store.insert(failed).await.unwrap();
        store
            .update_status(failed_id, ReportStatus::Started, None)
            .await
            .unwrap();
        store
            .update_status(failed_id, ReportStatus::Failure, None)
            .await
            .unwrap();

        let retry = record_created(2).as_child_of(parent_id);
        let retry_id = retry.id;
        store.insert(retry).await.unwrap();

        let children = store.child_runs(parent_id, from).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, retry_id);
    }

    #[tokio::test]
    async fn terminal_records_reject_started() {
        let store = InMemoryReportStore::new();
        let record = record_created(1);
        let id = record.id;
        store.insert(record).await.unwrap();

        store
            .update_status(id, ReportStatus::Started, None)
            .await
            .unwrap();
        store
            .update_status(id, ReportStatus::Success, None)
            .await
            .unwrap();

        let err = store.update_status(id, ReportStatus::Started, None).await;
        assert!(matches!(err, Err(StoreError::IllegalTransition { .. })));

        // The rerun path reopens a terminal record.
        store
            .update_status(id, ReportStatus::Pending, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_pending_children_only_touches_pending() {
        let store = InMemoryReportStore::new();
        let parent = record_created(1).as_recurrent_parent();
        let parent_id = parent.id;
        let from = parent.created;
        store.insert(parent).await.unwrap();

        let pending = record_created(2).as_child_of(parent_id);
        let done = record_created(3).as_child_of(parent_id);
        let done_id = done.id;
        store.insert(pending).await.unwrap();
        store.insert(done).await.unwrap();
        store
            .update_status(done_id, ReportStatus::Started, None)
            .await
            .unwrap();
        store
            .update_status(done_id, ReportStatus::Success, None)
            .await
            .unwrap();

        let deleted = store.delete_pending_children(parent_id, from).await.unwrap();
        assert_eq!(deleted, 1);

        let left = store.child_runs(parent_id, from).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, done_id);
    }

    #[tokio::test]
    async fn list_visible_filters_by_owner_and_ui_flag() {
        let store = InMemoryReportStore::new();

        let shown = record_created(1).shown_in_ui();
        let shown_id = shown.id;
        store.insert(shown).await.unwrap();
        store.insert(record_created(2)).await.unwrap();

        let mut other_owner = record_created(3).shown_in_ui();
        other_owner.owner_id = OwnerId(2);
        store.insert(other_owner).await.unwrap();

        let visible = store.list_visible(OwnerId(1)).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, shown_id);

        let counts = store.counts_by_status().await.unwrap();
        assert_eq!(counts.pending, 3);
        assert_eq!(counts.success, 0);
    }

    #[tokio::test]
    async fn task_errors_deduplicate_per_task() {
        let errors = InMemoryTaskErrorStore::new();
        let id = new_id();

        errors
            .record(REPORT_TASK_TYPE, id, "first", "t1")
            .await
            .unwrap();
        errors
            .record(REPORT_TASK_TYPE, id, "second", "t2")
            .await
            .unwrap();

        let stored = errors.get(REPORT_TASK_TYPE, id).await.unwrap().unwrap();
        assert_eq!(stored.count, 2);
        assert_eq!(stored.message, "second");
    }
}
