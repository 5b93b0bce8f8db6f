//! Daily recurrence: find missed runs and create bounded backfill children.

use chrono::{Duration, NaiveDate};
use log::{error, warn};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::domain::{ReportId, ReportParameters, ReportRecord, ReportStatus};
use crate::ports::clock::Clock;
use crate::ports::report_store::{ReportStore, StoreError};
use crate::report::{build_run_report, BuildContext, BuildError, ReportTask, RunOptions};

use super::dates::{days_through, diff_datewise, midnight};

#[derive(Debug, Error)]
pub enum ScheduleError {
    /// More completed child runs exist than the daily cadence allows. This
    /// means something double-scheduled, which is a scheduler bug, not a
    /// data problem; it must be loud and must not be silently repaired.
    #[error("recurring report {parent} has runs outside its cadence: {unexpected:?}")]
    MoreRunsThanExpected {
        parent: ReportId,
        unexpected: Vec<NaiveDate>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("stored parameters are unreadable: {0}")]
    Parameters(#[from] serde_json::Error),

    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Which daily runs of `parent` are due.
///
/// Every calendar day from the parent's creation day through today is
/// expected; today always counts as due, even if not technically overdue. A
/// day is satisfied by any non-FAILURE child. Children still pending from an
/// earlier pass are assumed stuck and deleted first, so they get retried.
pub async fn days_missed(
    parent: &ReportRecord,
    store: &dyn ReportStore,
    clock: &dyn Clock,
) -> Result<Vec<NaiveDate>, ScheduleError> {
    let search_from = midnight(parent.created_day());

    let deleted = store.delete_pending_children(parent.id, search_from).await?;
    if deleted > 0 {
        warn!(
            "dropped {deleted} stale pending runs of {} for retry",
            parent.id
        );
    }

    let children = store.child_runs(parent.id, search_from).await?;
    let completed: BTreeSet<NaiveDate> = children
        .iter()
        .filter(|child| child.status != ReportStatus::Failure)
        .map(|child| child.created_day())
        .collect();

    let expected: BTreeSet<NaiveDate> = days_through(parent.created_day(), clock.today())
        .into_iter()
        .collect();

    let (missed, unexpected) = diff_datewise(&expected, &completed);
    if !unexpected.is_empty() {
        error!(
            "recurring report {}: completed runs {completed:?}, unexpected {unexpected:?}",
            parent.id
        );
        return Err(ScheduleError::MoreRunsThanExpected {
            parent: parent.id,
            unexpected,
        });
    }

    Ok(missed)
}

/// Create (but do not schedule) one child run per missed day, oldest first,
/// stopping after `cap` children.
///
/// Each child's metric window brackets its day: start the day before, end on
/// the day itself. Timeseries metrics instead end at midnight of the real
/// today, since their buckets carry the dates. A day whose child cannot be
/// built is logged and skipped; it stays missing and the next pass retries
/// it. The cap bounds how much work one pass can inject after a long outage.
pub async fn create_reports_for_missed_days(
    ctx: &BuildContext<'_>,
    parent: &ReportRecord,
    cap: usize,
) -> Result<Vec<ReportTask>, ScheduleError> {
    let days = days_missed(parent, ctx.store, ctx.clock).await?;

    let mut created = Vec::new();
    for day in days {
        if created.len() >= cap {
            break;
        }
        match build_child_for_day(ctx, parent, day).await {
            Ok(task) => created.push(task),
            Err(err) => {
                error!(
                    "could not create run of {} for {day}: {err}",
                    parent.id
                );
            }
        }
    }
    Ok(created)
}

async fn build_child_for_day(
    ctx: &BuildContext<'_>,
    parent: &ReportRecord,
    day: NaiveDate,
) -> Result<ReportTask, ScheduleError> {
    let mut parameters: ReportParameters = serde_json::from_value(parent.parameters.clone())?;

    parameters.metric.start_date = day - Duration::days(1);
    parameters.metric.end_date = if parameters.metric.timeseries.is_none() {
        day
    } else {
        ctx.clock.today()
    };

    // Without this, child runs would themselves recur forever.
    parameters.recurrent = false;
    parameters.public = parent.public;

    let task = build_run_report(
        ctx,
        parameters,
        parent.owner_id,
        RunOptions {
            recurrent_parent_id: Some(parent.id),
            created: Some(midnight(day)),
            existing: None,
        },
    )
    .await?;
    Ok(task)
}
