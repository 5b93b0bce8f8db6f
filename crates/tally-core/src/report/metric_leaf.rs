//! Metric leaf: one metric against one project's slice of a cohort.

use std::fmt;
use std::sync::Arc;

use crate::domain::{CohortId, UserId, UserKey, UserResults};
use crate::ports::metric::{Metric, MetricError};

/// Leaf running a single metric on a project-homogenous list of users.
///
/// Results are keyed by `"<user_id>|<project>"` so that sibling leaves for
/// other projects merge without collisions.
#[derive(Clone)]
pub struct MetricLeaf {
    pub metric: Arc<dyn Metric>,
    pub cohort_id: CohortId,
    pub project: String,
    pub user_ids: Vec<UserId>,
}

impl MetricLeaf {
    pub async fn run(&self) -> Result<UserResults, MetricError> {
        let by_user = self
            .metric
            .run(Some(&self.user_ids), &self.project)
            .await?;

        let mut results: UserResults = by_user
            .into_iter()
            .map(|(user, result)| (UserKey::new(user, &self.project), result))
            .collect();

        // A metric that found nothing still reports one placeholder row, so
        // downstream merging can tell "ran, empty" from "never ran".
        if results.is_empty() {
            results.insert(UserKey::no_results(), self.metric.default_result());
        }
        Ok(results)
    }
}

impl fmt::Debug for MetricLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricLeaf")
            .field("metric", &self.metric.label())
            .field("cohort_id", &self.cohort_id)
            .field("project", &self.project)
            .field("user_ids", &self.user_ids.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MetricValue;
    use crate::impls::FixedMetric;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn results_are_keyed_by_user_and_project() {
        let mut canned = BTreeMap::new();
        canned.insert(
            UserId(5),
            crate::domain::UserResult::default().with_value("edits", MetricValue::from(4)),
        );
        let leaf = MetricLeaf {
            metric: Arc::new(FixedMetric::new("edits", canned)),
            cohort_id: CohortId(1),
            project: "enwiki".to_string(),
            user_ids: vec![UserId(5)],
        };

        let results = leaf.run().await.unwrap();
        assert!(results.contains_key(&UserKey::new(UserId(5), "enwiki")));
    }

    #[tokio::test]
    async fn empty_results_get_a_placeholder_row() {
        let leaf = MetricLeaf {
            metric: Arc::new(FixedMetric::new("edits", BTreeMap::new())),
            cohort_id: CohortId(1),
            project: "dewiki".to_string(),
            user_ids: vec![UserId(9)],
        };

        let results = leaf.run().await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results.contains_key(&UserKey::no_results()));
    }
}
