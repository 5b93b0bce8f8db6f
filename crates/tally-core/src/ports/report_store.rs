//! ReportStore port: durable CRUD over report records.
//!
//! The relational store is the single source of truth for record state. This
//! trait is the seam for swapping implementations; dev and tests run against
//! the in-memory one, production wires a database-backed one with the same
//! transactional guarantees (row-level updates, uniqueness on child days).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{CorrelationKey, OwnerId, ReportId, ReportRecord, ReportStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("report {0} not found")]
    NotFound(ReportId),

    #[error("report {0} already exists")]
    Duplicate(ReportId),

    #[error("recurring report {parent} already has a run for {day}")]
    DuplicateChildDay { parent: ReportId, day: NaiveDate },

    #[error("report {id} is {current} and cannot move to {requested}")]
    IllegalTransition {
        id: ReportId,
        current: ReportStatus,
        requested: ReportStatus,
    },

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Record counts by status, for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub started: usize,
    pub success: usize,
    pub failure: usize,
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist a new record.
    ///
    /// Implementations must reject a recurring child whose `(parent, created
    /// day)` pair is already covered by a live (non-FAILURE) child; no two
    /// live children of one parent may cover the same day. A FAILURE child
    /// for the same day is replaced, which is how failed days get retried.
    async fn insert(&self, record: ReportRecord) -> Result<(), StoreError>;

    async fn get(&self, id: ReportId) -> Result<ReportRecord, StoreError>;

    /// Transition a record's status, optionally recording the execution
    /// handle. Transitions not allowed by the status machine are rejected.
    async fn update_status(
        &self,
        id: ReportId,
        status: ReportStatus,
        correlation_key: Option<CorrelationKey>,
    ) -> Result<(), StoreError>;

    async fn set_public(&self, id: ReportId, public: bool) -> Result<(), StoreError>;

    /// All recurring parent templates, optionally narrowed to one id
    /// (used for manual triggering).
    async fn recurrent_parents(
        &self,
        only: Option<ReportId>,
    ) -> Result<Vec<ReportRecord>, StoreError>;

    /// Child runs of a recurring parent created on or after `from`.
    async fn child_runs(
        &self,
        parent: ReportId,
        from: DateTime<Utc>,
    ) -> Result<Vec<ReportRecord>, StoreError>;

    /// Drop still-pending children of `parent` created on or after `from`.
    /// Returns how many were deleted.
    async fn delete_pending_children(
        &self,
        parent: ReportId,
        from: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    /// Records meant to be listed to end users.
    async fn list_visible(&self, owner: OwnerId) -> Result<Vec<ReportRecord>, StoreError>;

    async fn counts_by_status(&self) -> Result<StatusCounts, StoreError>;
}
