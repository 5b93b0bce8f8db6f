//! Demo wiring for the tally engine: run one report end to end against the
//! in-memory implementations and print the result document.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use log::info;

use tally_core::domain::{
    AggregateOptions, CohortId, CohortRef, MetricParameters, MetricValue, OwnerId,
    ReportParameters, TimeseriesChoice, UserId, UserResult,
};
use tally_core::exec::{SchedulerConfig, TaskOutput};
use tally_core::impls::{
    FixedMetric, FixedMetricCatalog, InMemoryReportStore, InMemoryTaskErrorStore, StaticCohorts,
};
use tally_core::ports::cohort::Cohort;
use tally_core::ports::report_store::ReportStore;
use tally_core::ports::task_error_store::TaskErrorStore;
use tally_core::ports::{CohortService, MetricCatalog};
use tally_core::publish::PublicReportFileManager;
use tally_core::Engine;

#[tokio::main]
async fn main() {
    env_logger::init();

    // (A) Dev collaborators: a two-user cohort and a canned edits metric.
    let cohorts = StaticCohorts::new();
    cohorts
        .add(
            Cohort {
                id: CohortId(1),
                name: "demo editors".to_string(),
                size: 2,
                validated: true,
            },
            vec![("enwiki".to_string(), vec![UserId(1), UserId(2)])],
        )
        .await;

    let mut results = BTreeMap::new();
    results.insert(
        UserId(1),
        UserResult::default().with_value("edits", MetricValue::from(2)),
    );
    results.insert(
        UserId(2),
        UserResult::default().with_value("edits", MetricValue::from(3)),
    );
    let metrics = FixedMetricCatalog::new();
    metrics
        .register("edits", Arc::new(FixedMetric::new("edits", results)))
        .expect("fresh catalog");

    // (B) Engine over in-memory stores and a temp public directory.
    let public_dir = std::env::temp_dir().join("tally-demo");
    let store: Arc<dyn ReportStore> = Arc::new(InMemoryReportStore::new());
    let engine = Engine::builder()
        .store(Arc::clone(&store))
        .task_errors(Arc::new(InMemoryTaskErrorStore::new()) as Arc<dyn TaskErrorStore>)
        .metrics(Arc::new(metrics) as Arc<dyn MetricCatalog>)
        .cohorts(Arc::new(cohorts) as Arc<dyn CohortService>)
        .files(Arc::new(PublicReportFileManager::new(&public_dir)))
        .config(SchedulerConfig {
            workers: 2,
            leaf_timeout: Duration::from_secs(30),
            ..SchedulerConfig::default()
        })
        .build()
        .expect("engine wiring");

    // (C) Submit a run: sum and average of "edits" over the cohort.
    let parameters = ReportParameters {
        name: "demo edit count".to_string(),
        cohort: CohortRef {
            id: 1,
            name: None,
            size: None,
        },
        metric: MetricParameters {
            name: "edits".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date"),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 2).expect("valid date"),
            timeseries: TimeseriesChoice::None,
        },
        recurrent: false,
        public: false,
        aggregation: AggregateOptions {
            individual: true,
            aggregate: true,
            sum: true,
            average: true,
            std_deviation: false,
        },
    };

    let handle = engine
        .submit(parameters, OwnerId(1))
        .await
        .expect("submit report");
    let id = handle.id();
    info!("submitted report {id}");

    // (D) Wait for the tree to finish and show what came out.
    match handle.wait().await {
        TaskOutput::Success(result) => {
            let record = store.get(id).await.expect("record exists");
            println!("report {} finished: {}", id, record.status);
            println!(
                "{}",
                serde_json::to_string_pretty(&result).expect("result is json")
            );
        }
        TaskOutput::Failure(message) => {
            eprintln!("report {id} failed: {message}");
        }
    }

    let counts = store.counts_by_status().await.expect("counts");
    println!("record counts: {counts:?}");

    engine.shutdown().await;
}
