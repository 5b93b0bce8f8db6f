//! Report status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of one report record.
///
/// State transitions:
/// - Pending -> Started -> Success
/// - Pending -> Started -> Failure
///
/// A record is created Pending when its tree is constructed, before anything
/// is scheduled. Terminal states are never left; a rerun either creates a new
/// record or explicitly resets an existing one to Pending.
///
/// Serialized as SCREAMING_SNAKE_CASE to match the wire names:
/// PENDING / STARTED / SUCCESS / FAILURE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    /// Persisted but not yet picked up by a worker.
    Pending,

    /// A worker has begun executing this node (for inner nodes: its join).
    Started,

    /// Completed with a result.
    Success,

    /// Completed with an error, or retries exhausted.
    Failure,
}

impl ReportStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, ReportStatus::Success | ReportStatus::Failure)
    }

    /// Whether `next` is a legal transition from this state.
    ///
    /// Re-asserting the current state is allowed (retried work marks Started
    /// again on every attempt). Resetting a terminal record to Pending is
    /// only done through the explicit rerun path, which the store permits.
    pub fn can_transition_to(self, next: ReportStatus) -> bool {
        if self == next {
            return true;
        }
        match self {
            ReportStatus::Pending => matches!(
                next,
                ReportStatus::Started | ReportStatus::Success | ReportStatus::Failure
            ),
            ReportStatus::Started => {
                matches!(next, ReportStatus::Success | ReportStatus::Failure)
            }
            ReportStatus::Success | ReportStatus::Failure => {
                matches!(next, ReportStatus::Pending)
            }
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportStatus::Pending => "PENDING",
            ReportStatus::Started => "STARTED",
            ReportStatus::Success => "SUCCESS",
            ReportStatus::Failure => "FAILURE",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn status_serializes_as_required_names() {
        let s = serde_json::to_string(&ReportStatus::Pending).unwrap();
        assert_eq!(s, "\"PENDING\"");

        let s = serde_json::to_string(&ReportStatus::Started).unwrap();
        assert_eq!(s, "\"STARTED\"");

        let s = serde_json::to_string(&ReportStatus::Success).unwrap();
        assert_eq!(s, "\"SUCCESS\"");

        let s = serde_json::to_string(&ReportStatus::Failure).unwrap();
        assert_eq!(s, "\"FAILURE\"");
    }

    #[rstest]
    #[case::success(ReportStatus::Success)]
    #[case::failure(ReportStatus::Failure)]
    fn terminal_states_only_reopen_to_pending(#[case] status: ReportStatus) {
        assert!(status.is_terminal());
        assert!(status.can_transition_to(ReportStatus::Pending));
        assert!(!status.can_transition_to(ReportStatus::Started));
    }

    #[test]
    fn started_can_finish_either_way() {
        assert!(ReportStatus::Started.can_transition_to(ReportStatus::Success));
        assert!(ReportStatus::Started.can_transition_to(ReportStatus::Failure));
        assert!(ReportStatus::Started.can_transition_to(ReportStatus::Started));
        assert!(!ReportStatus::Started.can_transition_to(ReportStatus::Pending));
    }
}
