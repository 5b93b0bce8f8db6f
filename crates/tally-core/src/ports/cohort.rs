//! CohortService port: who a report runs over.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{CohortId, UserId};

#[derive(Debug, Error)]
pub enum CohortError {
    #[error("cohort {0} not found")]
    NotFound(CohortId),

    #[error("cohort backend error: {0}")]
    Backend(String),
}

/// Cohort metadata as the engine needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cohort {
    pub id: CohortId,
    pub name: String,
    pub size: usize,

    /// Unvalidated cohorts must not run real computations.
    pub validated: bool,
}

#[async_trait]
pub trait CohortService: Send + Sync {
    async fn get(&self, id: CohortId) -> Result<Cohort, CohortError>;

    /// The cohort's members grouped by backing project, in a stable order.
    async fn group_by_project(
        &self,
        id: CohortId,
    ) -> Result<Vec<(String, Vec<UserId>)>, CohortError>;
}
