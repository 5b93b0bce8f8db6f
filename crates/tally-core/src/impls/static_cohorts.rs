//! Static cohort service (dev and tests).

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::{CohortId, UserId};
use crate::ports::cohort::{Cohort, CohortError, CohortService};

/// Cohort service backed by a fixed table.
#[derive(Default)]
pub struct StaticCohorts {
    state: Arc<Mutex<HashMap<CohortId, (Cohort, Vec<(String, Vec<UserId>)>)>>>,
}

impl StaticCohorts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cohort with its members grouped by project.
    pub async fn add(&self, cohort: Cohort, groups: Vec<(String, Vec<UserId>)>) {
        let mut state = self.state.lock().await;
        state.insert(cohort.id, (cohort, groups));
    }
}

#[async_trait]
impl CohortService for StaticCohorts {
    async fn get(&self, id: CohortId) -> Result<Cohort, CohortError> {
        let state = self.state.lock().await;
        state
            .get(&id)
            .map(|(cohort, _)| cohort.clone())
            .ok_or(CohortError::NotFound(id))
    }

    async fn group_by_project(
        &self,
        id: CohortId,
    ) -> Result<Vec<(String, Vec<UserId>)>, CohortError> {
        let state = self.state.lock().await;
        state
            .get(&id)
            .map(|(_, groups)| groups.clone())
            .ok_or(CohortError::NotFound(id))
    }
}
