//! Work queue: fan-out/fan-in scheduling over report trees.
//!
//! Design:
//! - Trees are flattened into a node table at submission; queue structures
//!   carry task keys only, the table is the single in-flight source of truth.
//! - A node never blocks a worker waiting on its children. Fan-out enqueues
//!   the children and returns; the join item for the parent is enqueued by
//!   whichever child completes last. Pool size can be smaller than tree
//!   fan-out without deadlocking.
//! - Each node entry keeps one output slot per child, indexed by declaration
//!   order, so the join observes results in that order no matter when the
//!   children finish.
//! - Failed leaves go through the retry heap with backoff until the attempt
//!   budget runs out.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Mutex, Notify};

use crate::domain::ReportId;
use crate::publish::PublishJob;
use crate::report::{ReportTask, TaskKind};

use super::retry::RetryPolicy;

/// Key of one in-flight tree node.
pub type TaskKey = u64;

/// One unit of work a worker can lease.
#[derive(Debug, Clone)]
pub enum WorkItem {
    /// Execute a node: leaves run their primitive, inner nodes fan out.
    Run(TaskKey),

    /// Every child of this node completed; run its finish.
    Join(TaskKey),

    /// Write a finished public run to disk.
    Publish(PublishJob),
}

/// Final output of one tree node, as passed through the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskOutput {
    Success(Value),
    Failure(String),
}

impl TaskOutput {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutput::Success(_))
    }
}

/// Channel resolving to a tree's root output.
pub type DoneReceiver = watch::Receiver<Option<TaskOutput>>;

/// What `fail_leaf` decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-enqueued after the given backoff delay.
    Scheduled(std::time::Duration),

    /// Attempt budget exhausted; the failure is final.
    Exhausted,
}

/// Retry heap entry.
///
/// Reverse ordering so BinaryHeap acts as a min-heap (earliest first).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledRetry {
    next_run_at: Instant,
    key: TaskKey,
}

impl PartialOrd for ScheduledRetry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledRetry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Earlier times have higher priority.
        other.next_run_at.cmp(&self.next_run_at)
    }
}

/// A flattened tree node.
struct NodeEntry {
    id: ReportId,
    kind: TaskKind,
    children: Vec<TaskKey>,
    /// Parent key and this node's index among its siblings.
    parent: Option<(TaskKey, usize)>,
    root: TaskKey,
    /// Children still running; the join fires at zero.
    remaining: usize,
    /// One slot per child, declaration order.
    outputs: Vec<Option<TaskOutput>>,
    /// Failed executions so far (leaves only).
    failures: u32,
}

struct TreeEntry {
    members: Vec<TaskKey>,
    done: watch::Sender<Option<TaskOutput>>,
}

/// Read-only view of a node for execution.
#[derive(Clone)]
pub struct NodeSnapshot {
    pub key: TaskKey,
    pub id: ReportId,
    pub kind: TaskKind,
}

struct QueueState {
    nodes: HashMap<TaskKey, NodeEntry>,
    trees: HashMap<TaskKey, TreeEntry>,
    ready: VecDeque<WorkItem>,
    scheduled: BinaryHeap<ScheduledRetry>,
    next_key: TaskKey,
    closed: bool,
}

impl QueueState {
    fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            trees: HashMap::new(),
            ready: VecDeque::new(),
            scheduled: BinaryHeap::new(),
            next_key: 1,
            closed: false,
        }
    }

    fn allocate_key(&mut self) -> TaskKey {
        let key = self.next_key;
        self.next_key += 1;
        key
    }

    /// Move due retries back onto the ready queue.
    fn promote_scheduled(&mut self) {
        let now = Instant::now();
        while let Some(entry) = self.scheduled.peek() {
            if entry.next_run_at > now {
                break; // heap is sorted, nothing else is due
            }
            let entry = self.scheduled.pop().expect("peeked entry exists");
            if self.nodes.contains_key(&entry.key) {
                self.ready.push_back(WorkItem::Run(entry.key));
            }
        }
    }

    fn flatten(
        &mut self,
        task: ReportTask,
        parent: Option<(TaskKey, usize)>,
        root: Option<TaskKey>,
        members: &mut Vec<TaskKey>,
    ) -> TaskKey {
        let key = self.allocate_key();
        let root = root.unwrap_or(key);
        members.push(key);

        let child_count = task.children.len();
        let mut child_keys = Vec::with_capacity(child_count);
        for (index, child) in task.children.into_iter().enumerate() {
            child_keys.push(self.flatten(child, Some((key, index)), Some(root), members));
        }

        self.nodes.insert(
            key,
            NodeEntry {
                id: task.id,
                kind: task.kind,
                children: child_keys,
                parent,
                root,
                remaining: child_count,
                outputs: vec![None; child_count],
                failures: 0,
            },
        );
        key
    }
}

/// In-memory work queue shared by the worker pool.
pub struct WorkQueue {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
    retry: RetryPolicy,
}

impl WorkQueue {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::new())),
            notify: Arc::new(Notify::new()),
            retry,
        }
    }

    /// Flatten and enqueue a tree. The receiver resolves once the root
    /// completes, successfully or not.
    pub async fn submit_tree(&self, task: ReportTask) -> (TaskKey, DoneReceiver) {
        let (done_tx, done_rx) = watch::channel(None);
        let root = {
            let mut state = self.state.lock().await;
            let mut members = Vec::new();
            let root = state.flatten(task, None, None, &mut members);
            state.trees.insert(
                root,
                TreeEntry {
                    members,
                    done: done_tx,
                },
            );
            state.ready.push_back(WorkItem::Run(root));
            root
        };
        self.notify.notify_one();
        (root, done_rx)
    }

    /// Lease one unit of work. Waits until something is ready; returns None
    /// once the queue is closed.
    pub async fn lease(&self) -> Option<WorkItem> {
        loop {
            let next_wake = {
                let mut state = self.state.lock().await;
                state.promote_scheduled();

                if let Some(item) = state.ready.pop_front() {
                    // Notify permits don't accumulate, so each woken worker
                    // chain-wakes the next one while items remain.
                    let more = !state.ready.is_empty();
                    drop(state);
                    if more {
                        self.notify.notify_one();
                    }
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
                state.scheduled.peek().map(|entry| entry.next_run_at)
            };

            // Wait for a notification, or for the next scheduled retry.
            if let Some(wake_at) = next_wake {
                tokio::select! {
                    _ = self.notify.notified() => {}
                    _ = tokio::time::sleep_until(wake_at.into()) => {}
                }
            } else {
                self.notify.notified().await;
            }
        }
    }

    /// Stop handing out work. In-flight items finish; waiting leases return.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        drop(state);
        self.notify.notify_waiters();
    }

    pub async fn snapshot(&self, key: TaskKey) -> Option<NodeSnapshot> {
        let state = self.state.lock().await;
        state.nodes.get(&key).map(|entry| NodeSnapshot {
            key,
            id: entry.id,
            kind: entry.kind.clone(),
        })
    }

    /// Enqueue a node's children (or its join, if it has none).
    pub async fn fan_out(&self, key: TaskKey) {
        {
            let mut state = self.state.lock().await;
            let Some(entry) = state.nodes.get(&key) else {
                return;
            };
            let children = entry.children.clone();
            if children.is_empty() {
                // Childless node: the join fires immediately with no inputs.
                state.ready.push_back(WorkItem::Join(key));
            } else {
                for child in children {
                    state.ready.push_back(WorkItem::Run(child));
                }
            }
        }
        self.notify.notify_one();
    }

    /// Joined child outputs in declaration order. Slots that never resolved
    /// (cannot happen in a well-formed run) read as failures.
    pub async fn joined_outputs(&self, key: TaskKey) -> Vec<TaskOutput> {
        let state = self.state.lock().await;
        let Some(entry) = state.nodes.get(&key) else {
            return Vec::new();
        };
        entry
            .outputs
            .iter()
            .map(|slot| {
                slot.clone()
                    .unwrap_or_else(|| TaskOutput::Failure("child output missing".to_string()))
            })
            .collect()
    }

    /// Record a node's final output and propagate completion upward.
    ///
    /// The last child to complete enqueues its parent's join; a completing
    /// root resolves the tree's done channel and drops the tree's entries.
    pub async fn complete(&self, key: TaskKey, output: TaskOutput) {
        let mut notify = false;
        {
            let mut state = self.state.lock().await;
            let Some(entry) = state.nodes.get(&key) else {
                return;
            };
            let parent = entry.parent;
            let root = entry.root;

            match parent {
                Some((parent_key, index)) => {
                    if let Some(parent) = state.nodes.get_mut(&parent_key) {
                        parent.outputs[index] = Some(output);
                        parent.remaining -= 1;
                        if parent.remaining == 0 {
                            state.ready.push_back(WorkItem::Join(parent_key));
                            notify = true;
                        }
                    }
                }
                None => {
                    if let Some(tree) = state.trees.remove(&root) {
                        for member in tree.members {
                            state.nodes.remove(&member);
                        }
                        // Receivers may be gone (fire-and-forget runs).
                        let _ = tree.done.send(Some(output));
                    }
                }
            }
        }
        if notify {
            self.notify.notify_one();
        }
    }

    /// Record a failed leaf execution and decide whether it retries.
    pub async fn fail_leaf(&self, key: TaskKey) -> RetryDecision {
        let decision = {
            let mut state = self.state.lock().await;
            let Some(entry) = state.nodes.get_mut(&key) else {
                return RetryDecision::Exhausted;
            };
            entry.failures += 1;
            if entry.failures >= self.retry.max_attempts {
                RetryDecision::Exhausted
            } else {
                let delay = self.retry.next_delay(entry.failures);
                state.scheduled.push(ScheduledRetry {
                    next_run_at: Instant::now() + delay,
                    key,
                });
                RetryDecision::Scheduled(delay)
            }
        };
        if matches!(decision, RetryDecision::Scheduled(_)) {
            // Wake a worker so the sleep-until-retry clock is re-evaluated.
            self.notify.notify_one();
        }
        decision
    }

    pub async fn enqueue_publish(&self, job: PublishJob) {
        {
            let mut state = self.state.lock().await;
            state.ready.push_back(WorkItem::Publish(job));
        }
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::TaskKind;
    use std::time::Duration;
    use ulid::Ulid;

    fn leaf() -> ReportTask {
        ReportTask::leaf(ReportId::from_ulid(Ulid::new()), TaskKind::NullLeaf)
    }

    fn node(children: Vec<ReportTask>) -> ReportTask {
        ReportTask::node(
            ReportId::from_ulid(Ulid::new()),
            TaskKind::MultiProject,
            children,
        )
    }

    async fn lease_key(queue: &WorkQueue) -> (TaskKey, bool) {
        match tokio::time::timeout(Duration::from_secs(1), queue.lease())
            .await
            .expect("lease timed out")
            .expect("queue closed")
        {
            WorkItem::Run(key) => (key, false),
            WorkItem::Join(key) => (key, true),
            WorkItem::Publish(_) => panic!("unexpected publish item"),
        }
    }

    #[tokio::test]
    async fn submitted_root_is_leased_first() {
        let queue = WorkQueue::new(RetryPolicy::default());
        let (root, _rx) = queue.submit_tree(node(vec![leaf(), leaf()])).await;

        let (key, is_join) = lease_key(&queue).await;
        assert_eq!(key, root);
        assert!(!is_join);
    }

    #[tokio::test]
    async fn join_fires_once_after_all_children_in_declaration_order() {
        let queue = WorkQueue::new(RetryPolicy::default());
        let (root, _rx) = queue.submit_tree(node(vec![leaf(), leaf(), leaf()])).await;

        let (key, _) = lease_key(&queue).await;
        queue.fan_out(key).await;

        let mut children = Vec::new();
        for _ in 0..3 {
            let (child, is_join) = lease_key(&queue).await;
            assert!(!is_join);
            children.push(child);
        }

        // Complete out of declaration order: C, A, B.
        for (index, child) in [(2usize, children[2]), (0, children[0]), (1, children[1])] {
            queue
                .complete(child, TaskOutput::Success(serde_json::json!(index)))
                .await;
        }

        let (join_key, is_join) = lease_key(&queue).await;
        assert!(is_join);
        assert_eq!(join_key, root);

        let outputs = queue.joined_outputs(root).await;
        assert_eq!(
            outputs,
            vec![
                TaskOutput::Success(serde_json::json!(0)),
                TaskOutput::Success(serde_json::json!(1)),
                TaskOutput::Success(serde_json::json!(2)),
            ]
        );
    }

    #[tokio::test]
    async fn childless_node_joins_immediately_with_no_inputs() {
        let queue = WorkQueue::new(RetryPolicy::default());
        let (root, _rx) = queue.submit_tree(node(Vec::new())).await;

        let (key, _) = lease_key(&queue).await;
        queue.fan_out(key).await;

        let (join_key, is_join) = lease_key(&queue).await;
        assert!(is_join);
        assert_eq!(join_key, root);
        assert!(queue.joined_outputs(root).await.is_empty());
    }

    #[tokio::test]
    async fn root_completion_resolves_the_done_channel_and_cleans_up() {
        let queue = WorkQueue::new(RetryPolicy::default());
        let (root, mut rx) = queue.submit_tree(leaf()).await;

        queue
            .complete(root, TaskOutput::Success(serde_json::json!({})))
            .await;

        rx.changed().await.unwrap();
        assert_eq!(
            rx.borrow().clone(),
            Some(TaskOutput::Success(serde_json::json!({})))
        );
        assert!(queue.snapshot(root).await.is_none());
    }

    #[tokio::test]
    async fn failed_leaf_retries_until_the_budget_runs_out() {
        let retry = RetryPolicy {
            base_delay: Duration::from_millis(5),
            multiplier: 1.0,
            max_attempts: 3,
        };
        let queue = WorkQueue::new(retry);
        let (root, _rx) = queue.submit_tree(leaf()).await;
        let _ = lease_key(&queue).await;

        assert!(matches!(
            queue.fail_leaf(root).await,
            RetryDecision::Scheduled(_)
        ));
        // The retry becomes leasable again after the backoff.
        let (again, _) = lease_key(&queue).await;
        assert_eq!(again, root);

        assert!(matches!(
            queue.fail_leaf(root).await,
            RetryDecision::Scheduled(_)
        ));
        let _ = lease_key(&queue).await;

        assert_eq!(queue.fail_leaf(root).await, RetryDecision::Exhausted);
    }

    #[tokio::test]
    async fn close_releases_waiting_leases() {
        let queue = Arc::new(WorkQueue::new(RetryPolicy::default()));
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.lease().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close().await;

        let leased = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(leased.is_none());
    }
}
