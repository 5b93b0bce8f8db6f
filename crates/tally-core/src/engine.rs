//! Engine: wiring, submission, reruns, and the recurring-report pass.

use log::{error, info, warn};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::domain::{OwnerId, ReportId, ReportParameters, ReportStatus};
use crate::exec::{ExecContext, ReportHandle, SchedulerConfig, WorkQueue, WorkerPool};
use crate::ports::clock::{Clock, SystemClock};
use crate::ports::cohort::CohortService;
use crate::ports::id_generator::{IdGenerator, UlidGenerator};
use crate::ports::metric::MetricCatalog;
use crate::ports::replication_lag::{NeverLagged, ReplicationLagService};
use crate::ports::report_store::{ReportStore, StoreError};
use crate::ports::task_error_store::TaskErrorStore;
use crate::publish::PublicReportFileManager;
use crate::report::{build_run_report, BuildContext, BuildError, ReportTask, RunOptions};
use crate::schedule::daily::{create_reports_for_missed_days, ScheduleError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("stored parameters are unreadable: {0}")]
    Parameters(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum EngineBuildError {
    #[error("engine is missing its {0}")]
    Missing(&'static str),
}

struct EngineInner {
    store: Arc<dyn ReportStore>,
    errors: Arc<dyn TaskErrorStore>,
    metrics: Arc<dyn MetricCatalog>,
    cohorts: Arc<dyn CohortService>,
    lag: Arc<dyn ReplicationLagService>,
    files: Arc<PublicReportFileManager>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: SchedulerConfig,
    queue: Arc<WorkQueue>,
    workers: Mutex<Option<WorkerPool>>,
}

/// The report engine: owns the worker pool and the ports, exposes
/// submission, rerun and the periodic recurring-report entry point.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn store(&self) -> &Arc<dyn ReportStore> {
        &self.inner.store
    }

    pub fn files(&self) -> &Arc<PublicReportFileManager> {
        &self.inner.files
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    fn build_context(&self) -> BuildContext<'_> {
        BuildContext {
            store: self.inner.store.as_ref(),
            metrics: self.inner.metrics.as_ref(),
            cohorts: self.inner.cohorts.as_ref(),
            ids: self.inner.ids.as_ref(),
            clock: self.inner.clock.as_ref(),
        }
    }

    /// Build, persist and schedule one report run.
    ///
    /// For a new recurring report this also triggers the first day's
    /// computation before returning, so the caller sees data right away
    /// instead of waiting for the next scheduler tick.
    pub async fn submit(
        &self,
        parameters: ReportParameters,
        owner: OwnerId,
    ) -> Result<ReportHandle, EngineError> {
        let recurrent = parameters.recurrent;
        let tree = build_run_report(
            &self.build_context(),
            parameters,
            owner,
            RunOptions::default(),
        )
        .await?;
        let root_id = tree.id;

        let handle = self.schedule(tree).await?;
        if recurrent {
            self.run_recurring(Some(root_id)).await?;
        }
        Ok(handle)
    }

    /// Re-run an existing report, reusing its record.
    pub async fn rerun(&self, id: ReportId) -> Result<ReportHandle, EngineError> {
        let record = self.inner.store.get(id).await?;
        let parameters: ReportParameters = serde_json::from_value(record.parameters.clone())?;

        self.inner
            .store
            .update_status(id, ReportStatus::Pending, None)
            .await?;

        let tree = build_run_report(
            &self.build_context(),
            parameters,
            record.owner_id,
            RunOptions {
                recurrent_parent_id: record.recurrent_parent_id,
                created: Some(record.created),
                existing: Some(id),
            },
        )
        .await?;
        self.schedule(tree).await
    }

    /// Submit a built tree for asynchronous execution.
    ///
    /// Every node gets a correlation key tying its record to this execution
    /// before anything hits the queue.
    pub async fn schedule(&self, tree: ReportTask) -> Result<ReportHandle, EngineError> {
        for id in tree.all_ids() {
            self.inner
                .store
                .update_status(id, ReportStatus::Pending, Some(self.inner.ids.correlation_key()))
                .await?;
        }
        let root_id = tree.id;
        let (_key, done) = self.inner.queue.submit_tree(tree).await;
        Ok(ReportHandle::new(
            root_id,
            Arc::clone(&self.inner.store),
            done,
        ))
    }

    /// The periodic recurring-report pass.
    ///
    /// Skips entirely while any backing data source lags. One parent's
    /// troubles never block the others; only store access failures abort the
    /// pass. Callers are responsible for not running two passes at once
    /// (typical deployment: a single cron-like trigger).
    pub async fn run_recurring(&self, only: Option<ReportId>) -> Result<(), EngineError> {
        if self.inner.lag.is_any_lagged().await {
            warn!("replication lag detected, skipping recurring report pass");
            return Ok(());
        }

        let parents = self.inner.store.recurrent_parents(only).await?;
        for parent in parents {
            info!("processing recurring report {} ({})", parent.id, parent.name);
            let children = match create_reports_for_missed_days(
                &self.build_context(),
                &parent,
                self.inner.config.backfill_cap,
            )
            .await
            {
                Ok(children) => children,
                Err(err) => {
                    error!("problem processing recurring report {}: {err}", parent.id);
                    continue;
                }
            };
            for child in children {
                if let Err(err) = self.schedule(child).await {
                    error!("could not schedule child of {}: {err}", parent.id);
                }
            }
        }
        Ok(())
    }

    /// Stop taking new work and wait for the workers to drain.
    pub async fn shutdown(&self) {
        self.inner.queue.close().await;
        let pool = self.inner.workers.lock().await.take();
        if let Some(pool) = pool {
            pool.shutdown_and_join().await;
        }
    }
}

/// Wires ports into an [`Engine`], failing fast on missing pieces.
#[derive(Default)]
pub struct EngineBuilder {
    store: Option<Arc<dyn ReportStore>>,
    errors: Option<Arc<dyn TaskErrorStore>>,
    metrics: Option<Arc<dyn MetricCatalog>>,
    cohorts: Option<Arc<dyn CohortService>>,
    lag: Option<Arc<dyn ReplicationLagService>>,
    files: Option<Arc<PublicReportFileManager>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    config: Option<SchedulerConfig>,
}

impl EngineBuilder {
    pub fn store(mut self, store: Arc<dyn ReportStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn task_errors(mut self, errors: Arc<dyn TaskErrorStore>) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricCatalog>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn cohorts(mut self, cohorts: Arc<dyn CohortService>) -> Self {
        self.cohorts = Some(cohorts);
        self
    }

    pub fn replication_lag(mut self, lag: Arc<dyn ReplicationLagService>) -> Self {
        self.lag = Some(lag);
        self
    }

    pub fn files(mut self, files: Arc<PublicReportFileManager>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Validate the wiring, spawn the worker pool, and hand back the engine.
    pub fn build(self) -> Result<Engine, EngineBuildError> {
        let store = self.store.ok_or(EngineBuildError::Missing("report store"))?;
        let errors = self
            .errors
            .ok_or(EngineBuildError::Missing("task error store"))?;
        let metrics = self
            .metrics
            .ok_or(EngineBuildError::Missing("metric catalog"))?;
        let cohorts = self
            .cohorts
            .ok_or(EngineBuildError::Missing("cohort service"))?;
        let files = self.files.ok_or(EngineBuildError::Missing("file manager"))?;

        let lag = self.lag.unwrap_or_else(|| Arc::new(NeverLagged));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock)));
        let config = self.config.unwrap_or_default();

        let queue = Arc::new(WorkQueue::new(config.retry.clone()));
        let ctx = Arc::new(ExecContext {
            store: Arc::clone(&store),
            errors: Arc::clone(&errors),
            files: Arc::clone(&files),
            clock: Arc::clone(&clock),
            config: config.clone(),
        });
        let workers = WorkerPool::spawn(config.workers, Arc::clone(&queue), ctx);

        Ok(Engine {
            inner: Arc::new(EngineInner {
                store,
                errors,
                metrics,
                cohorts,
                lag,
                files,
                clock,
                ids,
                config,
                queue,
                workers: Mutex::new(Some(workers)),
            }),
        })
    }
}
