//! Report parameters: the serialized configuration of one run.
//!
//! This is the payload stored in `ReportRecord::parameters`. It has to
//! round-trip through JSON exactly, because the recurrence scheduler reloads
//! it from the store to construct backfill children, rewriting only the
//! metric's date window.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Reference to the cohort a report runs over.
///
/// `name` and `size` are filled in from the cohort service when the report
/// is built, so the stored blob is self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortRef {
    pub id: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

/// Time-bucketing requested from a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeseriesChoice {
    #[default]
    None,
    Hour,
    Day,
    Month,
    Year,
}

impl TimeseriesChoice {
    pub fn is_none(self) -> bool {
        self == TimeseriesChoice::None
    }
}

/// The metric descriptor: which computation to run and over which window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricParameters {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    #[serde(default)]
    pub timeseries: TimeseriesChoice,
}

/// Which output views an aggregate report produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateOptions {
    #[serde(default)]
    pub individual: bool,

    #[serde(default = "default_true")]
    pub aggregate: bool,

    #[serde(default = "default_true")]
    pub sum: bool,

    #[serde(default)]
    pub average: bool,

    #[serde(default)]
    pub std_deviation: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            individual: false,
            aggregate: true,
            sum: true,
            average: false,
            std_deviation: false,
        }
    }
}

/// Everything needed to reproduce one report run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportParameters {
    pub name: String,
    pub cohort: CohortRef,
    pub metric: MetricParameters,

    /// Whether this report repeats daily (true only on the parent template).
    #[serde(default)]
    pub recurrent: bool,

    /// Whether results are additionally written to public storage.
    #[serde(default)]
    pub public: bool,

    #[serde(default)]
    pub aggregation: AggregateOptions,
}
