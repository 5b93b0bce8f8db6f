//! Report record: the durable row behind one tree node.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use super::ids::{CorrelationKey, OwnerId, ReportId};
use super::status::ReportStatus;

/// Durable state for one node of a report tree, including the root.
///
/// Design:
/// - This is the "single source of truth" for a node's lifecycle. Execution
///   structures hold ids only.
/// - All state transitions happen through methods, never by poking fields.
/// - `parameters` is the serialized configuration needed to reproduce this
///   exact run; it must round-trip through JSON.
/// - For recurring children, `created` is the day being computed, not the
///   wall-clock insertion time. Backfilled runs sit far in the past on
///   purpose, so the covered day is visible in the raw table.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRecord {
    pub id: ReportId,
    pub owner_id: OwnerId,
    pub name: String,
    pub status: ReportStatus,
    pub correlation_key: Option<CorrelationKey>,
    pub parameters: Value,
    pub show_in_ui: bool,
    pub public: bool,
    pub recurrent: bool,
    pub recurrent_parent_id: Option<ReportId>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Which of the three record shapes a row is.
///
/// Exactly one holds per record: a recurring parent has `recurrent` set and
/// no parent link; a recurring child has a parent link and `recurrent`
/// cleared; everything else is a standalone run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Standalone,
    RecurringParent,
    RecurringChild,
}

impl ReportRecord {
    pub fn new(
        id: ReportId,
        owner_id: OwnerId,
        name: impl Into<String>,
        parameters: Value,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            name: name.into(),
            status: ReportStatus::Pending,
            correlation_key: None,
            parameters,
            show_in_ui: false,
            public: false,
            recurrent: false,
            recurrent_parent_id: None,
            created,
            updated: created,
        }
    }

    pub fn shown_in_ui(mut self) -> Self {
        self.show_in_ui = true;
        self
    }

    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    /// Mark this record as the parent template of a daily-repeating report.
    pub fn as_recurrent_parent(mut self) -> Self {
        self.recurrent = true;
        self.recurrent_parent_id = None;
        self
    }

    /// Mark this record as one generated daily run of `parent`.
    ///
    /// Child runs are hidden from the UI; the parent is the visible record.
    pub fn as_child_of(mut self, parent: ReportId) -> Self {
        self.recurrent = false;
        self.recurrent_parent_id = Some(parent);
        self.show_in_ui = false;
        self
    }

    pub fn kind(&self) -> RecordKind {
        match (self.recurrent, self.recurrent_parent_id) {
            (true, None) => RecordKind::RecurringParent,
            (false, Some(_)) => RecordKind::RecurringChild,
            _ => RecordKind::Standalone,
        }
    }

    /// The calendar day this record stands for.
    pub fn created_day(&self) -> NaiveDate {
        self.created.date_naive()
    }

    /// Transition to Started, recording the execution handle on first pickup.
    pub fn mark_started(&mut self, correlation_key: Option<CorrelationKey>) {
        self.status = ReportStatus::Started;
        if correlation_key.is_some() {
            self.correlation_key = correlation_key;
        }
        self.updated = Utc::now();
    }

    pub fn mark_success(&mut self) {
        self.status = ReportStatus::Success;
        self.updated = Utc::now();
    }

    pub fn mark_failure(&mut self) {
        self.status = ReportStatus::Failure;
        self.updated = Utc::now();
    }

    /// Reset a terminal record for an explicit rerun.
    pub fn reset_for_rerun(&mut self) {
        self.status = ReportStatus::Pending;
        self.correlation_key = None;
        self.updated = Utc::now();
    }
}
