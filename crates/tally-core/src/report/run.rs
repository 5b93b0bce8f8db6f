//! RunReport: building the tree for one report run.
//!
//! The root of every run is a `RunRoot` node. Its single child is one of:
//! - a validation leaf, when the metric or cohort configuration is invalid;
//! - a null leaf, when this is a recurring parent template (the parent only
//!   anchors the daily schedule and must never compute real data);
//! - an aggregate node over a multi-project fan-out, for a real run.
//!
//! Every node persists a PENDING record before anything is scheduled, so the
//! whole tree is visible in the store from the moment it exists.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{CohortId, OwnerId, ReportId, ReportParameters, ReportRecord};
use crate::ports::clock::Clock;
use crate::ports::cohort::{CohortError, CohortService};
use crate::ports::id_generator::IdGenerator;
use crate::ports::metric::MetricCatalog;
use crate::ports::report_store::{ReportStore, StoreError};

use super::aggregate::AggregateNode;
use super::metric_leaf::MetricLeaf;
use super::validate::ValidationLeaf;
use super::{ReportTask, TaskKind};

/// Root payload: everything the join and post-processing steps need without
/// another store round trip.
#[derive(Debug, Clone)]
pub struct RunRoot {
    pub name: String,
    pub parameters: ReportParameters,
    pub public: bool,
    pub recurrent_parent_id: Option<ReportId>,
    pub created: DateTime<Utc>,
}

/// Ports needed to build a run tree.
pub struct BuildContext<'a> {
    pub store: &'a dyn ReportStore,
    pub metrics: &'a dyn MetricCatalog,
    pub cohorts: &'a dyn CohortService,
    pub ids: &'a dyn IdGenerator,
    pub clock: &'a dyn Clock,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Cohort(#[from] CohortError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("could not serialize parameters: {0}")]
    Parameters(#[from] serde_json::Error),
}

/// How a run is anchored: fresh, as a recurring child, or reusing a record.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Set on generated daily runs; points at the parent template.
    pub recurrent_parent_id: Option<ReportId>,

    /// Overrides the record's `created`. For backfill children this is the
    /// day being computed, not the wall clock.
    pub created: Option<DateTime<Utc>>,

    /// Reuse an existing root record (manual rerun) instead of inserting.
    pub existing: Option<ReportId>,
}

/// Build and persist the tree for one run of `parameters`.
pub async fn build_run_report(
    ctx: &BuildContext<'_>,
    mut parameters: ReportParameters,
    owner: OwnerId,
    options: RunOptions,
) -> Result<ReportTask, BuildError> {
    let cohort = ctx.cohorts.get(CohortId(parameters.cohort.id)).await?;
    parameters.cohort.name = Some(cohort.name.clone());
    parameters.cohort.size = Some(cohort.size);

    let metric = ctx.metrics.build(&parameters.metric);
    let metric_label = match &metric {
        Ok(m) => m.label().to_string(),
        Err(_) => parameters.metric.name.clone(),
    };

    let root_id = options.existing.unwrap_or_else(|| ctx.ids.report_id());
    let created = options.created.unwrap_or_else(|| ctx.clock.now());
    let recurrent = parameters.recurrent;
    let public = parameters.public;
    let name = parameters.name.clone();

    if options.existing.is_none() {
        let mut record = ReportRecord::new(
            root_id,
            owner,
            name.clone(),
            serde_json::to_value(&parameters)?,
            created,
        )
        .with_public(public);
        record = match options.recurrent_parent_id {
            Some(parent) => record.as_child_of(parent),
            None if recurrent => record.as_recurrent_parent().shown_in_ui(),
            None => record.shown_in_ui(),
        };
        ctx.store.insert(record).await?;
    }

    let validation = ValidationLeaf {
        metric_valid: metric.is_ok(),
        cohort_valid: cohort.validated,
        metric_label,
        cohort_name: cohort.name.clone(),
    };
    let metric_blob = serde_json::to_value(&parameters.metric)?;

    let child = if !validation.valid() {
        child_task(
            ctx,
            owner,
            &name,
            "validation",
            metric_blob,
            TaskKind::Validation(validation),
        )
        .await?
    } else if recurrent && options.recurrent_parent_id.is_none() {
        // A recurring parent does no real work itself; the scheduler spawns
        // one child run per day. The null leaf keeps the tree well-formed
        // and gives the coalescer an empty result to start from.
        child_task(ctx, owner, &name, "noop", metric_blob, TaskKind::NullLeaf).await?
    } else {
        let metric = metric.expect("validated above");
        let groups = ctx.cohorts.group_by_project(cohort.id).await?;

        let mut leaves = Vec::with_capacity(groups.len());
        for (project, user_ids) in groups {
            let leaf = MetricLeaf {
                metric: metric.clone(),
                cohort_id: cohort.id,
                project: project.clone(),
                user_ids,
            };
            leaves.push(
                child_task(
                    ctx,
                    owner,
                    &name,
                    &project,
                    metric_blob.clone(),
                    TaskKind::Metric(leaf),
                )
                .await?,
            );
        }

        let multi = child_node(
            ctx,
            owner,
            &name,
            "all projects",
            metric_blob.clone(),
            TaskKind::MultiProject,
            leaves,
        )
        .await?;
        child_node(
            ctx,
            owner,
            &name,
            "aggregation",
            metric_blob,
            TaskKind::Aggregate(AggregateNode {
                options: parameters.aggregation,
            }),
            vec![multi],
        )
        .await?
    };

    let root = RunRoot {
        name,
        parameters,
        public,
        recurrent_parent_id: options.recurrent_parent_id,
        created,
    };
    Ok(ReportTask::node(
        root_id,
        TaskKind::RunRoot(root),
        vec![child],
    ))
}

async fn child_task(
    ctx: &BuildContext<'_>,
    owner: OwnerId,
    run_name: &str,
    part: &str,
    parameters: serde_json::Value,
    kind: TaskKind,
) -> Result<ReportTask, BuildError> {
    let id = persist_child(ctx, owner, run_name, part, parameters).await?;
    Ok(ReportTask::leaf(id, kind))
}

async fn child_node(
    ctx: &BuildContext<'_>,
    owner: OwnerId,
    run_name: &str,
    part: &str,
    parameters: serde_json::Value,
    kind: TaskKind,
    children: Vec<ReportTask>,
) -> Result<ReportTask, BuildError> {
    let id = persist_child(ctx, owner, run_name, part, parameters).await?;
    Ok(ReportTask::node(id, kind, children))
}

async fn persist_child(
    ctx: &BuildContext<'_>,
    owner: OwnerId,
    run_name: &str,
    part: &str,
    parameters: serde_json::Value,
) -> Result<ReportId, BuildError> {
    let id = ctx.ids.report_id();
    let record = ReportRecord::new(
        id,
        owner,
        format!("{run_name} / {part}"),
        parameters,
        ctx.clock.now(),
    );
    ctx.store.insert(record).await?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AggregateOptions, CohortRef, MetricParameters, MetricValue, RecordKind, TimeseriesChoice,
        UserId, UserResult,
    };
    use crate::impls::{FixedMetric, FixedMetricCatalog, InMemoryReportStore, StaticCohorts};
    use crate::ports::cohort::Cohort;
    use crate::ports::{SystemClock, UlidGenerator};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    struct Fixture {
        store: InMemoryReportStore,
        metrics: FixedMetricCatalog,
        cohorts: StaticCohorts,
        ids: UlidGenerator<SystemClock>,
        clock: SystemClock,
    }

    impl Fixture {
        fn ctx(&self) -> BuildContext<'_> {
            BuildContext {
                store: &self.store,
                metrics: &self.metrics,
                cohorts: &self.cohorts,
                ids: &self.ids,
                clock: &self.clock,
            }
        }
    }

    async fn fixture(validated: bool) -> Fixture {
        let fixture = Fixture {
            store: InMemoryReportStore::new(),
            metrics: FixedMetricCatalog::new(),
            cohorts: StaticCohorts::new(),
            ids: UlidGenerator::new(SystemClock),
            clock: SystemClock,
        };

        let mut canned = BTreeMap::new();
        canned.insert(
            UserId(1),
            UserResult::default().with_value("edits", MetricValue::from(2)),
        );
        fixture
            .metrics
            .register("edits", Arc::new(FixedMetric::new("edits", canned)))
            .unwrap();

        fixture
            .cohorts
            .add(
                Cohort {
                    id: CohortId(1),
                    name: "editors".to_string(),
                    size: 1,
                    validated,
                },
                vec![("enwiki".to_string(), vec![UserId(1)])],
            )
            .await;
        fixture
    }

    fn parameters(recurrent: bool) -> ReportParameters {
        ReportParameters {
            name: "daily edits".to_string(),
            cohort: CohortRef {
                id: 1,
                name: None,
                size: None,
            },
            metric: MetricParameters {
                name: "edits".to_string(),
                start_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
                timeseries: TimeseriesChoice::None,
            },
            recurrent,
            public: false,
            aggregation: AggregateOptions::default(),
        }
    }

    #[tokio::test]
    async fn valid_run_builds_the_full_tree() {
        let fixture = fixture(true).await;
        let tree = build_run_report(
            &fixture.ctx(),
            parameters(false),
            OwnerId(1),
            RunOptions::default(),
        )
        .await
        .unwrap();

        assert!(matches!(tree.kind, TaskKind::RunRoot(_)));
        let aggregate = &tree.children[0];
        assert!(matches!(aggregate.kind, TaskKind::Aggregate(_)));
        let multi = &aggregate.children[0];
        assert!(matches!(multi.kind, TaskKind::MultiProject));
        assert!(matches!(multi.children[0].kind, TaskKind::Metric(_)));

        // Every node got a persisted PENDING record.
        for id in tree.all_ids() {
            fixture.store.get(id).await.unwrap();
        }

        // Cohort metadata is folded into the stored parameters.
        let record = fixture.store.get(tree.id).await.unwrap();
        let stored: ReportParameters = serde_json::from_value(record.parameters).unwrap();
        assert_eq!(stored.cohort.size, Some(1));
        assert_eq!(stored.cohort.name.as_deref(), Some("editors"));
    }

    #[tokio::test]
    async fn unvalidated_cohort_gets_a_validation_leaf() {
        let fixture = fixture(false).await;
        let tree = build_run_report(
            &fixture.ctx(),
            parameters(false),
            OwnerId(1),
            RunOptions::default(),
        )
        .await
        .unwrap();

        assert!(matches!(tree.children[0].kind, TaskKind::Validation(_)));
    }

    #[tokio::test]
    async fn recurring_parent_gets_a_null_leaf() {
        let fixture = fixture(true).await;
        let tree = build_run_report(
            &fixture.ctx(),
            parameters(true),
            OwnerId(1),
            RunOptions::default(),
        )
        .await
        .unwrap();

        assert!(matches!(tree.children[0].kind, TaskKind::NullLeaf));
        let record = fixture.store.get(tree.id).await.unwrap();
        assert_eq!(record.kind(), RecordKind::RecurringParent);
    }

    #[tokio::test]
    async fn unknown_metric_gets_a_validation_leaf() {
        let fixture = fixture(true).await;
        let mut params = parameters(false);
        params.metric.name = "pages".to_string();

        let tree = build_run_report(
            &fixture.ctx(),
            params,
            OwnerId(1),
            RunOptions::default(),
        )
        .await
        .unwrap();

        let TaskKind::Validation(validation) = &tree.children[0].kind else {
            panic!("expected a validation leaf");
        };
        assert!(!validation.metric_valid);
        assert!(validation.cohort_valid);
    }

    #[tokio::test]
    async fn child_runs_are_hidden_and_linked() {
        let fixture = fixture(true).await;
        let parent = build_run_report(
            &fixture.ctx(),
            parameters(true),
            OwnerId(1),
            RunOptions::default(),
        )
        .await
        .unwrap();

        let mut params = parameters(true);
        params.recurrent = false;
        let child = build_run_report(
            &fixture.ctx(),
            params,
            OwnerId(1),
            RunOptions {
                recurrent_parent_id: Some(parent.id),
                created: None,
                existing: None,
            },
        )
        .await
        .unwrap();

        let record = fixture.store.get(child.id).await.unwrap();
        assert_eq!(record.kind(), RecordKind::RecurringChild);
        assert!(!record.show_in_ui);
        assert_eq!(record.recurrent_parent_id, Some(parent.id));
    }
}
