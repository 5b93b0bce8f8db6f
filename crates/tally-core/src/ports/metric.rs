//! Metric port: the black-box computation contract.
//!
//! The engine never looks inside a metric. It hands over user ids for one
//! project and receives a per-user mapping of submetric values, possibly
//! time-bucketed, possibly censored. How a metric queries its backing data
//! is entirely the implementor's concern.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{MetricParameters, UserId, UserResult};

#[derive(Debug, Error)]
pub enum MetricError {
    #[error("unknown metric '{0}'")]
    Unknown(String),

    #[error("metric '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("metric '{name}' is incorrectly configured: {reason}")]
    InvalidConfiguration { name: String, reason: String },

    #[error("metric query failed: {0}")]
    QueryFailed(String),
}

#[async_trait]
pub trait Metric: Send + Sync + std::fmt::Debug {
    /// Human-readable label for messages and record names.
    fn label(&self) -> &str;

    /// Run the computation for the given users of one project.
    ///
    /// `user_ids` of `None` means "the whole project population"; a slice
    /// restricts the computation to those users.
    async fn run(
        &self,
        user_ids: Option<&[UserId]>,
        project: &str,
    ) -> Result<BTreeMap<UserId, UserResult>, MetricError>;

    /// Row reported when a project yields no results at all.
    fn default_result(&self) -> UserResult {
        UserResult::default()
    }
}

/// Catalog resolving a metric descriptor into a runnable metric.
///
/// `build` also doubles as configuration validation: a descriptor the
/// catalog cannot build is an invalid configuration, which the report tree
/// surfaces through a validation leaf rather than a crash.
pub trait MetricCatalog: Send + Sync {
    fn build(&self, params: &MetricParameters) -> Result<Arc<dyn Metric>, MetricError>;
}
