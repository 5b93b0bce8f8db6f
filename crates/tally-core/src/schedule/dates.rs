//! Calendar helpers for the recurrence scheduler.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::collections::BTreeSet;

/// Midnight (UTC) of the given day.
pub fn midnight(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

/// Every calendar day from `start` through `end`, inclusive on both sides.
pub fn days_through(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        days.push(cursor);
        cursor += Duration::days(1);
    }
    days
}

/// Set difference in both directions: days expected but absent, and days
/// present that were never expected.
pub fn diff_datewise(
    expected: &BTreeSet<NaiveDate>,
    actual: &BTreeSet<NaiveDate>,
) -> (Vec<NaiveDate>, Vec<NaiveDate>) {
    let missing = expected.difference(actual).copied().collect();
    let unexpected = actual.difference(expected).copied().collect();
    (missing, unexpected)
}
