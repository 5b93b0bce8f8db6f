//! Execution error taxonomy.

use std::time::Duration;
use thiserror::Error;

use crate::ports::metric::MetricError;
use crate::ports::report_store::StoreError;
use crate::report::AggregationError;

/// Why one unit of work failed.
#[derive(Debug, Error)]
pub enum RunError {
    /// The leaf's primitive computation failed; subject to the retry policy.
    #[error("metric execution failed: {0}")]
    Metric(#[from] MetricError),

    /// The leaf exceeded its soft time limit; treated like an execution
    /// error so the same retry policy applies.
    #[error("execution exceeded the {0:?} time limit")]
    Timeout(Duration),

    /// A child this node cannot proceed without failed.
    #[error("child task failed: {0}")]
    ChildFailed(String),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    /// A child output did not decode into the expected shape.
    #[error("malformed child output: {0}")]
    MalformedOutput(String),

    #[error("could not serialize task output: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}
