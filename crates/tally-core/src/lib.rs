//! tally-core
//!
//! Core building blocks for the tally report engine: report trees over a
//! distributed work queue, statistical aggregation over cohorts, daily
//! recurrence with bounded backfill, and coalesced public result files.
//!
//! Module map:
//! - **domain**: ids, records, status machine, parameters, result documents
//! - **ports**: abstraction layer (ReportStore, Metric, CohortService, Clock, ...)
//! - **impls**: in-memory implementations for development and tests
//! - **report**: the Leaf/Node task tree and the aggregation step
//! - **exec**: work queue, worker pool, retry policy, per-kind semantics
//! - **schedule**: missed-day detection and backfill creation
//! - **publish**: public report files, coalescing, pruning
//! - **engine**: wiring and the public entry points

pub mod domain;
pub mod engine;
pub mod exec;
pub mod impls;
pub mod ports;
pub mod publish;
pub mod report;
pub mod schedule;

pub use engine::{Engine, EngineBuilder};
