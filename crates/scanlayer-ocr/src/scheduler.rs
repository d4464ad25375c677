// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Concurrency sizing and the pull-based page worker pool.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use scanlayer_core::types::ConcurrencyPlan;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::debug;

/// Upper bound on parallel page workers absent an operator override.
pub const DEFAULT_WORKER_CAP: usize = 8;

/// Logical CPUs available to this process; at least 1.
pub fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Size the worker pool for `page_count` pages on `cpu_count` CPUs.
///
/// Workers default to `min(cpu, 8, pages)` and threads per worker to
/// `max(1, cpu / workers)`.  Positive overrides win, but the worker count is
/// always clamped to `[1, pages]`.
pub fn plan(
    page_count: usize,
    cpu_count: usize,
    max_concurrency: Option<usize>,
    threads_per_worker: Option<usize>,
) -> ConcurrencyPlan {
    let cpus = cpu_count.max(1);
    let pages = page_count.max(1);

    let worker_count = match max_concurrency.filter(|n| *n > 0) {
        Some(cap) => cap,
        None => cpus.min(DEFAULT_WORKER_CAP),
    }
    .clamp(1, pages);

    let threads_per_worker = threads_per_worker
        .filter(|n| *n > 0)
        .unwrap_or_else(|| (cpus / worker_count).max(1));

    ConcurrencyPlan {
        worker_count,
        threads_per_worker,
    }
}

/// A fixed set of workers draining one shared queue.
///
/// Each worker claims the next unclaimed item, processes it, and goes back
/// for more until the queue is empty, so no item is handled twice and slow
/// items never hold up a pre-assigned share.  Results arrive in completion
/// order.  Dropping the pool aborts the workers.
pub struct WorkerPool<R> {
    results: mpsc::UnboundedReceiver<R>,
    _workers: JoinSet<()>,
}

impl<R: Send + 'static> WorkerPool<R> {
    pub fn spawn<T, F, Fut>(items: Vec<T>, worker_count: usize, work: F) -> Self
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        for item in items {
            // The receiver is alive until the workers are dropped.
            let _ = queue_tx.send(item);
        }
        drop(queue_tx);

        let queue = Arc::new(Mutex::new(queue_rx));
        let work = Arc::new(work);
        let (result_tx, results) = mpsc::unbounded_channel();
        let mut workers = JoinSet::new();

        for worker in 0..worker_count.max(1) {
            let queue = Arc::clone(&queue);
            let work = Arc::clone(&work);
            let result_tx = result_tx.clone();
            workers.spawn(async move {
                let mut handled = 0usize;
                loop {
                    let next = queue.lock().await.recv().await;
                    let Some(item) = next else { break };
                    let result = work(item).await;
                    handled += 1;
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
                debug!(worker, handled, "worker drained queue");
            });
        }

        Self {
            results,
            _workers: workers,
        }
    }

    /// Next finished result, or `None` once every worker has exited.
    pub async fn next(&mut self) -> Option<R> {
        self.results.recv().await
    }
}
