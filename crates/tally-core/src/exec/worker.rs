//! Worker pool: leases work items and executes them.

use log::debug;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::context::ExecContext;
use super::queue::WorkQueue;
use super::run_task;

/// Worker pool handle.
///
/// Shutdown stops taking new leases; it does not cancel the item a worker is
/// executing right now.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `n` workers over one shared queue.
    pub fn spawn(n: usize, queue: Arc<WorkQueue>, ctx: Arc<ExecContext>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let queue = Arc::clone(&queue);
            let ctx = Arc::clone(&ctx);
            let mut rx = shutdown_rx.clone();

            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, queue, ctx, &mut rx).await;
            }));
        }

        Self { shutdown_tx, joins }
    }

    pub fn request_shutdown(&self) {
        // receivers may already be gone; nothing to do then
        let _ = self.shutdown_tx.send(true);
    }

    /// Request shutdown and wait for every worker to stop.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            let _ = join.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<WorkQueue>,
    ctx: Arc<ExecContext>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // lease() can wait indefinitely, so race it against shutdown.
        let item = tokio::select! {
            _ = shutdown_rx.changed() => continue,
            item = queue.lease() => item,
        };

        let Some(item) = item else {
            // queue closed
            break;
        };

        debug!("worker-{worker_id} picked up {item:?}");
        run_task::execute(item, &ctx, &queue).await;
    }
}
