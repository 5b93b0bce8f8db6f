//! Report trees: the unit-of-work model.
//!
//! A report decomposes into a tree of sub-computations. Leaves perform a
//! primitive computation (run one metric against one project's users); inner
//! nodes only combine their children's results. The variant set is closed on
//! purpose: execution dispatches on `TaskKind`, and every kind of node the
//! engine can schedule is listed here.

pub mod aggregate;
pub mod metric_leaf;
pub mod multi_project;
pub mod run;
pub mod validate;

pub use self::aggregate::{AggregateNode, Aggregation, AggregationError};
pub use self::metric_leaf::MetricLeaf;
pub use self::run::{build_run_report, BuildContext, BuildError, RunOptions, RunRoot};
pub use self::validate::ValidationLeaf;

use crate::domain::ReportId;

/// Key under which a validation failure payload reports its message.
pub const FAILURE_KEY: &str = "FAILURE";

/// What one tree node is and does.
#[derive(Debug, Clone)]
pub enum TaskKind {
    /// Inert leaf returning an empty result. Recurring parent templates run
    /// one of these so the coalescer always has something to merge from.
    NullLeaf,

    /// Leaf reporting an invalid metric/cohort configuration as a result.
    Validation(ValidationLeaf),

    /// Leaf running one metric over one project's slice of the cohort.
    Metric(MetricLeaf),

    /// Node merging per-project metric results into one per-user mapping.
    MultiProject,

    /// Node reducing per-user results into the requested aggregate views.
    Aggregate(AggregateNode),

    /// The root of one report run.
    RunRoot(RunRoot),
}

impl TaskKind {
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            TaskKind::NullLeaf | TaskKind::Validation(_) | TaskKind::Metric(_)
        )
    }

    /// Short tag for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::NullLeaf => "null",
            TaskKind::Validation(_) => "validation",
            TaskKind::Metric(_) => "metric",
            TaskKind::MultiProject => "multi_project",
            TaskKind::Aggregate(_) => "aggregate",
            TaskKind::RunRoot(_) => "run",
        }
    }
}

/// One node of a report tree, bound to its durable record.
///
/// Children are ordered; the join over a node's children observes results in
/// exactly this order, independent of completion order.
#[derive(Debug, Clone)]
pub struct ReportTask {
    pub id: ReportId,
    pub kind: TaskKind,
    pub children: Vec<ReportTask>,
}

impl ReportTask {
    pub fn leaf(id: ReportId, kind: TaskKind) -> Self {
        debug_assert!(kind.is_leaf());
        Self {
            id,
            kind,
            children: Vec::new(),
        }
    }

    pub fn node(id: ReportId, kind: TaskKind, children: Vec<ReportTask>) -> Self {
        debug_assert!(!kind.is_leaf());
        Self { id, kind, children }
    }

    /// Ids of every node in this tree, root first.
    pub fn all_ids(&self) -> Vec<ReportId> {
        let mut ids = vec![self.id];
        for child in &self.children {
            ids.extend(child.all_ids());
        }
        ids
    }
}
