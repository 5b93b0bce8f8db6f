//! Fixed metric and catalog (dev and tests).

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::domain::{MetricParameters, UserId, UserResult};
use crate::ports::metric::{Metric, MetricCatalog, MetricError};

/// Metric returning canned per-user results, ignoring the date window.
#[derive(Debug)]
pub struct FixedMetric {
    label: String,
    results: BTreeMap<UserId, UserResult>,
}

impl FixedMetric {
    pub fn new(label: impl Into<String>, results: BTreeMap<UserId, UserResult>) -> Self {
        Self {
            label: label.into(),
            results,
        }
    }
}

#[async_trait]
impl Metric for FixedMetric {
    fn label(&self) -> &str {
        &self.label
    }

    async fn run(
        &self,
        user_ids: Option<&[UserId]>,
        _project: &str,
    ) -> Result<BTreeMap<UserId, UserResult>, MetricError> {
        match user_ids {
            None => Ok(self.results.clone()),
            Some(ids) => Ok(self
                .results
                .iter()
                .filter(|(user, _)| ids.contains(user))
                .map(|(user, result)| (*user, result.clone()))
                .collect()),
        }
    }
}

/// Catalog mapping metric names to pre-built metrics.
///
/// Built once during wiring (mutable), read-only afterwards.
#[derive(Default)]
pub struct FixedMetricCatalog {
    metrics: Mutex<HashMap<String, Arc<dyn Metric>>>,
}

impl FixedMetricCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        metric: Arc<dyn Metric>,
    ) -> Result<(), MetricError> {
        let name = name.into();
        let mut metrics = self.metrics.lock().expect("catalog lock poisoned");
        if metrics.contains_key(&name) {
            return Err(MetricError::AlreadyRegistered(name));
        }
        metrics.insert(name, metric);
        Ok(())
    }
}

impl MetricCatalog for FixedMetricCatalog {
    fn build(&self, params: &MetricParameters) -> Result<Arc<dyn Metric>, MetricError> {
        if params.start_date > params.end_date {
            return Err(MetricError::InvalidConfiguration {
                name: params.name.clone(),
                reason: "start_date is after end_date".to_string(),
            });
        }
        let metrics = self.metrics.lock().expect("catalog lock poisoned");
        metrics
            .get(&params.name)
            .cloned()
            .ok_or_else(|| MetricError::Unknown(params.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MetricValue, TimeseriesChoice};
    use chrono::NaiveDate;

    fn params(name: &str) -> MetricParameters {
        MetricParameters {
            name: name.to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            timeseries: TimeseriesChoice::None,
        }
    }

    #[tokio::test]
    async fn run_filters_to_requested_users() {
        let mut results = BTreeMap::new();
        results.insert(
            UserId(1),
            UserResult::default().with_value("edits", MetricValue::from(2)),
        );
        results.insert(
            UserId(2),
            UserResult::default().with_value("edits", MetricValue::from(3)),
        );
        let metric = FixedMetric::new("edits", results);

        let filtered = metric.run(Some(&[UserId(2)]), "enwiki").await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key(&UserId(2)));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let catalog = FixedMetricCatalog::new();
        let metric: Arc<dyn Metric> = Arc::new(FixedMetric::new("edits", BTreeMap::new()));

        catalog.register("edits", Arc::clone(&metric)).unwrap();
        let err = catalog.register("edits", metric).unwrap_err();
        assert!(matches!(err, MetricError::AlreadyRegistered(_)));
    }

    #[test]
    fn inverted_date_window_is_invalid() {
        let catalog = FixedMetricCatalog::new();
        catalog
            .register(
                "edits",
                Arc::new(FixedMetric::new("edits", BTreeMap::new())) as Arc<dyn Metric>,
            )
            .unwrap();

        let mut bad = params("edits");
        bad.start_date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let err = catalog.build(&bad).unwrap_err();
        assert!(matches!(err, MetricError::InvalidConfiguration { .. }));

        assert!(catalog.build(&params("edits")).is_ok());
        assert!(matches!(
            catalog.build(&params("pages")),
            Err(MetricError::Unknown(_))
        ));
    }
}
