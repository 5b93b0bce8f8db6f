//! Ports: the abstraction layer around the engine.
//!
//! Each trait hides an external collaborator (relational store, metric
//! backends, cohort tables, replication monitoring) or an ambient facility
//! (clock, id generation) so the engine core stays deterministic and
//! testable.

pub mod clock;
pub mod cohort;
pub mod id_generator;
pub mod metric;
pub mod replication_lag;
pub mod report_store;
pub mod task_error_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::cohort::{Cohort, CohortError, CohortService};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::metric::{Metric, MetricCatalog, MetricError};
pub use self::replication_lag::{NeverLagged, ReplicationLagService};
pub use self::report_store::{ReportStore, StatusCounts, StoreError};
pub use self::task_error_store::TaskErrorStore;
