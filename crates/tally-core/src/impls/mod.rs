//! Port implementations for development and tests.
//!
//! Production deployments are expected to keep these for local runs and
//! wire database-backed stores and real metric/cohort services instead.

pub mod fixed_metric;
pub mod memory_store;
pub mod static_cohorts;

pub use self::fixed_metric::{FixedMetric, FixedMetricCatalog};
pub use self::memory_store::{InMemoryReportStore, InMemoryTaskErrorStore};
pub use self::static_cohorts::StaticCohorts;
