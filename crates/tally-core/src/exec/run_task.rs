//! Execution semantics per task kind.
//!
//! Leaves: mark the record Started, run the primitive under the soft time
//! limit, and either complete or go through the retry policy. Failures are
//! recorded in the task-error store before anything else, so a hot-failing
//! task leaves exactly one row with a running count.
//!
//! Inner nodes: fan out on first pickup without touching the record (its
//! status reflects the roll-up of execution, not occupancy of a worker
//! slot). The join runs later as its own item: mark Started, finish, mark
//! the terminal state.

use log::{error, warn};
use serde_json::{json, Value};

use crate::domain::{ReportStatus, UserResults, REPORT_TASK_TYPE};
use crate::publish::{PublishJob, ReportDocument};
use crate::report::{multi_project, RunRoot, TaskKind};

use super::context::ExecContext;
use super::error::RunError;
use super::queue::{NodeSnapshot, RetryDecision, TaskOutput, WorkItem, WorkQueue};

pub(crate) async fn execute(item: WorkItem, ctx: &ExecContext, queue: &WorkQueue) {
    match item {
        WorkItem::Run(key) => {
            let Some(node) = queue.snapshot(key).await else {
                return;
            };
            if node.kind.is_leaf() {
                run_leaf(node, ctx, queue).await;
            } else {
                queue.fan_out(key).await;
            }
        }
        WorkItem::Join(key) => {
            let Some(node) = queue.snapshot(key).await else {
                return;
            };
            join_node(node, ctx, queue).await;
        }
        WorkItem::Publish(job) => publish(job, ctx).await,
    }
}

async fn run_leaf(node: NodeSnapshot, ctx: &ExecContext, queue: &WorkQueue) {
    set_status(ctx, &node, ReportStatus::Started).await;

    match leaf_output(&node.kind, ctx).await {
        Ok(value) => {
            set_status(ctx, &node, ReportStatus::Success).await;
            queue.complete(node.key, TaskOutput::Success(value)).await;
        }
        Err(err) => {
            record_error(ctx, &node, &err).await;
            match queue.fail_leaf(node.key).await {
                RetryDecision::Scheduled(delay) => {
                    warn!(
                        "{} {} failed, retrying in {delay:?}: {err}",
                        node.kind.label(),
                        node.id
                    );
                }
                RetryDecision::Exhausted => {
                    error!("{} {} failed for good: {err}", node.kind.label(), node.id);
                    set_status(ctx, &node, ReportStatus::Failure).await;
                    queue
                        .complete(node.key, TaskOutput::Failure(err.to_string()))
                        .await;
                }
            }
        }
    }
}

async fn leaf_output(kind: &TaskKind, ctx: &ExecContext) -> Result<Value, RunError> {
    match kind {
        TaskKind::NullLeaf => Ok(json!({})),
        TaskKind::Validation(validation) => Ok(validation.failure_payload()),
        TaskKind::Metric(leaf) => {
            let results = tokio::time::timeout(ctx.config.leaf_timeout, leaf.run())
                .await
                .map_err(|_| RunError::Timeout(ctx.config.leaf_timeout))??;
            Ok(serde_json::to_value(results)?)
        }
        // Inner kinds never reach leaf execution.
        TaskKind::MultiProject | TaskKind::Aggregate(_) | TaskKind::RunRoot(_) => {
            Err(RunError::MalformedOutput(format!(
                "{} executed as a leaf",
                kind.label()
            )))
        }
    }
}

async fn join_node(node: NodeSnapshot, ctx: &ExecContext, queue: &WorkQueue) {
    set_status(ctx, &node, ReportStatus::Started).await;
    let outputs = queue.joined_outputs(node.key).await;

    match finish(&node.kind, outputs) {
        Ok(value) => {
            set_status(ctx, &node, ReportStatus::Success).await;
            if let TaskKind::RunRoot(root) = &node.kind {
                post_process(&node, root, &value, queue).await;
            }
            queue.complete(node.key, TaskOutput::Success(value)).await;
        }
        Err(err) => {
            record_error(ctx, &node, &err).await;
            error!("{} {} failed: {err}", node.kind.label(), node.id);
            set_status(ctx, &node, ReportStatus::Failure).await;
            queue
                .complete(node.key, TaskOutput::Failure(err.to_string()))
                .await;
        }
    }
}

/// Combine joined child outputs according to the node kind.
fn finish(kind: &TaskKind, outputs: Vec<TaskOutput>) -> Result<Value, RunError> {
    match kind {
        TaskKind::MultiProject => {
            // Tolerate failed project slices: merge what succeeded, note the
            // rest. The report is better partial than absent.
            let mut merged_inputs = Vec::new();
            for output in outputs {
                match output {
                    TaskOutput::Success(value) => {
                        match serde_json::from_value::<UserResults>(value) {
                            Ok(results) => merged_inputs.push(results),
                            Err(err) => warn!("dropping malformed project result: {err}"),
                        }
                    }
                    TaskOutput::Failure(message) => {
                        warn!("dropping failed project result: {message}");
                    }
                }
            }
            Ok(serde_json::to_value(multi_project::merge(merged_inputs))?)
        }
        TaskKind::Aggregate(node) => {
            let users = match single_output(outputs)? {
                TaskOutput::Success(value) => serde_json::from_value::<UserResults>(value)
                    .map_err(|err| RunError::MalformedOutput(err.to_string()))?,
                TaskOutput::Failure(message) => return Err(RunError::ChildFailed(message)),
            };
            Ok(serde_json::to_value(node.finish(&users)?)?)
        }
        // The root passes its single child's result through; a failed child
        // is terminal here, unlike everywhere else in the tree.
        TaskKind::RunRoot(_) => match single_output(outputs)? {
            TaskOutput::Success(value) => Ok(value),
            TaskOutput::Failure(message) => Err(RunError::ChildFailed(message)),
        },
        TaskKind::NullLeaf | TaskKind::Validation(_) | TaskKind::Metric(_) => {
            Err(RunError::MalformedOutput(format!(
                "{} joined as a node",
                kind.label()
            )))
        }
    }
}

fn single_output(outputs: Vec<TaskOutput>) -> Result<TaskOutput, RunError> {
    let mut outputs = outputs.into_iter();
    let first = outputs
        .next()
        .ok_or_else(|| RunError::MalformedOutput("expected one child output".to_string()))?;
    Ok(first)
}

/// After a successful public run, hand the result off to the publish queue.
/// The report's completion never waits on the filesystem.
async fn post_process(node: &NodeSnapshot, root: &RunRoot, value: &Value, queue: &WorkQueue) {
    if !root.public {
        return;
    }
    match serde_json::from_value(value.clone()) {
        Ok(result) => {
            let job = PublishJob {
                report_id: root.recurrent_parent_id.unwrap_or(node.id),
                created: root.created,
                document: ReportDocument {
                    parameters: root.parameters.clone(),
                    result,
                },
            };
            queue.enqueue_publish(job).await;
        }
        Err(err) => {
            // Validation failures and the like produce payloads that are not
            // result documents; they have nothing to publish.
            warn!("result of {} is not publishable: {err}", node.id);
        }
    }
}

async fn publish(job: PublishJob, ctx: &ExecContext) {
    let files = ctx.files.clone();
    let today = ctx.clock.today();
    let retention_days = ctx.config.retention_days;
    let report_id = job.report_id;

    let written = tokio::task::spawn_blocking(move || {
        crate::publish::write_daily_result(&files, &job, today, retention_days)
    })
    .await;

    match written {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!("could not publish report {report_id}: {err}"),
        Err(err) => error!("publish task for {report_id} panicked: {err}"),
    }
}

async fn set_status(ctx: &ExecContext, node: &NodeSnapshot, status: ReportStatus) {
    if let Err(err) = ctx.store.update_status(node.id, status, None).await {
        error!("could not mark {} as {status}: {err}", node.id);
    }
}

async fn record_error(ctx: &ExecContext, node: &NodeSnapshot, err: &RunError) {
    let recorded = ctx
        .errors
        .record(
            REPORT_TASK_TYPE,
            node.id,
            &err.to_string(),
            &format!("{err:?}"),
        )
        .await;
    if let Err(store_err) = recorded {
        error!("could not record task error for {}: {store_err}", node.id);
    }
}
