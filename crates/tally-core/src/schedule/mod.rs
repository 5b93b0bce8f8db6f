//! Recurrence scheduling: missed-day detection and bounded backfill.

pub mod daily;
pub mod dates;

pub use self::daily::{create_reports_for_missed_days, days_missed, ScheduleError};
pub use self::dates::{days_through, diff_datewise, midnight};
