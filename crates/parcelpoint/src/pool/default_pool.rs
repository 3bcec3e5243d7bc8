/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Default [`WorkerPool`] implementation backed by tokio tasks.
//!
//! # Lifecycle
//!
//! 1. [`DefaultWorkerPool::new`] spawns `worker_count` workers and the
//!    periodic statistics logger.
//! 2. Workers pop tasks in FIFO order and run each one inside a
//!    `catch_unwind` boundary, so a panicking task is counted and logged
//!    without taking the worker down.
//! 3. [`WorkerPool::shutdown`] cancels the pool lifetime token, closes the
//!    queue and waits until every queued and in-flight task has finished.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::admin::WorkerCountChange;
use super::config::WorkerPoolConfig;
use super::queue::{Dequeued, PushRejected, TaskQueue};
use super::stats::{PoolCounters, PoolStats};
use super::{Task, WorkerPool};
use crate::error::PoolError;

/// A bounded pool of tokio workers draining a shared FIFO queue.
///
/// Must be created from within a tokio runtime. Dropping the pool without
/// calling [`WorkerPool::shutdown`] closes the queue; already queued tasks
/// still run to completion on the detached workers.
pub struct DefaultWorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    queue: TaskQueue,
    counters: PoolCounters,
    worker_count: AtomicUsize,
    next_worker_id: AtomicUsize,
    /// Serializes resize against shutdown.
    admin: Mutex<()>,
    lifetime: CancellationToken,
    workers: TaskTracker,
    shutdown: AtomicBool,
    drain_logged: AtomicBool,
}

impl DefaultWorkerPool {
    /// Creates the pool and starts its workers.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self::with_lifetime(config, CancellationToken::new())
    }

    /// Creates a pool whose lifetime is tied to `parent`.
    ///
    /// Cancelling `parent` has the same effect on submitters and the stats
    /// logger as shutting the pool down, but the queue keeps draining until
    /// [`WorkerPool::shutdown`] is called.
    pub fn with_lifetime(config: WorkerPoolConfig, parent: CancellationToken) -> Self {
        let inner = Arc::new(PoolInner {
            queue: TaskQueue::new(config.queue_capacity()),
            counters: PoolCounters::default(),
            worker_count: AtomicUsize::new(config.worker_count()),
            next_worker_id: AtomicUsize::new(0),
            admin: Mutex::new(()),
            lifetime: parent.child_token(),
            workers: TaskTracker::new(),
            shutdown: AtomicBool::new(false),
            drain_logged: AtomicBool::new(false),
        });

        for _ in 0..config.worker_count() {
            PoolInner::spawn_worker(&inner);
        }
        PoolInner::spawn_stats_logger(&inner, config.stats_interval());

        info!(
            worker_count = config.worker_count(),
            queue_capacity = inner.queue.capacity(),
            "worker pool started"
        );

        Self { inner }
    }

    /// Bounded queue capacity fixed at construction.
    pub fn queue_capacity(&self) -> usize {
        self.inner.queue.capacity()
    }

    async fn wait_drained(&self) {
        self.inner.workers.wait().await;
        if !self.inner.drain_logged.swap(true, Ordering::SeqCst) {
            info!("worker pool shutdown completed");
        }
    }
}

impl Drop for DefaultWorkerPool {
    fn drop(&mut self) {
        self.inner.begin_shutdown();
    }
}

#[async_trait]
impl WorkerPool for DefaultWorkerPool {
    async fn submit(&self, task: Task) {
        if self.is_shutdown() {
            warn!("task rejected - pool is shutdown");
            return;
        }
        match self.inner.queue.push(task, self.inner.lifetime.cancelled()).await {
            Ok(()) => {
                let total = self.inner.counters.task_accepted();
                debug!(
                    total_tasks = total,
                    queue_size = self.inner.queue.len(),
                    "task queued"
                );
            }
            Err(_) => warn!("task rejected during shutdown"),
        }
    }

    async fn submit_with_cancel(
        &self,
        cancel: &CancellationToken,
        task: Task,
    ) -> Result<(), PoolError> {
        if self.is_shutdown() {
            return Err(PoolError::ShuttingDown);
        }
        if cancel.is_cancelled() {
            return Err(PoolError::Cancelled);
        }

        let lifetime = &self.inner.lifetime;
        let stop = async {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = lifetime.cancelled() => {}
            }
        };
        let result = self.inner.queue.push(task, stop).await;

        match result {
            Ok(()) => {
                let total = self.inner.counters.task_accepted();
                debug!(total_tasks = total, "task queued with cancellation");
                Ok(())
            }
            Err(PushRejected::Closed) => Err(PoolError::ShuttingDown),
            Err(PushRejected::Cancelled) if cancel.is_cancelled() => Err(PoolError::Cancelled),
            Err(PushRejected::Cancelled) => Err(PoolError::ShuttingDown),
        }
    }

    fn set_worker_count(&self, count: usize) -> Result<WorkerCountChange, PoolError> {
        if count == 0 {
            warn!(count, "invalid worker count");
            return Err(PoolError::InvalidWorkerCount(count));
        }

        let _admin = self.inner.admin.lock();
        if self.is_shutdown() {
            warn!("cannot set worker count - pool is shutdown");
            return Err(PoolError::ShuttingDown);
        }

        let current = self.inner.worker_count.load(Ordering::SeqCst);
        info!(current, target = count, "adjusting worker count");

        if count > current {
            let wanted = count - current;
            let withdrawn = self.inner.queue.withdraw_stops(wanted);
            for _ in withdrawn..wanted {
                PoolInner::spawn_worker(&self.inner);
            }
            info!(added = wanted, total = count, "workers scaled up");
        } else if count < current {
            let to_stop = current - count;
            self.inner.queue.request_stops(to_stop);
            info!(removing = to_stop, target = count, "workers scaling down");
        }

        self.inner.worker_count.store(count, Ordering::SeqCst);
        Ok(WorkerCountChange {
            old_count: current,
            new_count: count,
        })
    }

    async fn shutdown(&self) {
        self.inner.begin_shutdown();
        self.wait_drained().await;
    }

    async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<(), PoolError> {
        self.inner.begin_shutdown();
        tokio::time::timeout(timeout, self.wait_drained())
            .await
            .map_err(|_| {
                warn!(timeout_ms = timeout.as_millis() as u64, "worker pool shutdown timed out");
                PoolError::ShutdownTimeout
            })
    }

    fn stats(&self) -> PoolStats {
        self.inner.snapshot()
    }

    fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }
}

impl PoolInner {
    fn spawn_worker(inner: &Arc<Self>) {
        let id = inner.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let worker = Arc::clone(inner);
        inner.workers.spawn(async move { worker.run_worker(id).await });
    }

    async fn run_worker(self: Arc<Self>, id: usize) {
        info!(worker_id = id, "worker started");
        loop {
            match self.queue.pop().await {
                Dequeued::Task(task) => self.execute(id, task).await,
                Dequeued::Stop => {
                    info!(worker_id = id, "worker stop signal");
                    break;
                }
                Dequeued::Closed => break,
            }
        }
        info!(worker_id = id, "worker exiting");
    }

    async fn execute(&self, id: usize, task: Task) {
        let active = self.counters.task_started();
        debug!(
            worker_id = id,
            active_tasks = active,
            queue_size = self.queue.len(),
            "worker picked up task"
        );

        let start = Instant::now();
        let outcome = AssertUnwindSafe(task).catch_unwind().await;
        self.counters.task_finished();
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => debug!(worker_id = id, duration_ms, "worker finished task"),
            Err(panic) => {
                let failed = self.counters.task_failed();
                error!(
                    worker_id = id,
                    panic = %panic_message(panic.as_ref()),
                    duration_ms,
                    failed_tasks = failed,
                    "panic in task"
                );
            }
        }
    }

    fn begin_shutdown(&self) {
        let _admin = self.admin.lock();
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("initiating worker pool shutdown");
        self.lifetime.cancel();
        self.queue.close();
        self.workers.close();
    }

    fn snapshot(&self) -> PoolStats {
        PoolStats {
            worker_count: self.worker_count.load(Ordering::SeqCst),
            queue_size: self.queue.len(),
            active_tasks: self.counters.active(),
            total_tasks: self.counters.total(),
            failed_tasks: self.counters.failed(),
            is_shutdown: self.shutdown.load(Ordering::SeqCst),
        }
    }

    fn spawn_stats_logger(inner: &Arc<Self>, interval: Duration) {
        let lifetime = inner.lifetime.clone();
        let weak = Arc::downgrade(inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = lifetime.cancelled() => {
                        info!("stats logger shutting down");
                        return;
                    }
                    _ = ticker.tick() => {
                        let Some(pool) = weak.upgrade() else { return };
                        let stats = pool.snapshot();
                        metrics::gauge!("parcelpoint_pool_workers").set(stats.worker_count as f64);
                        metrics::gauge!("parcelpoint_pool_queue_size").set(stats.queue_size as f64);
                        metrics::gauge!("parcelpoint_pool_active_tasks").set(stats.active_tasks as f64);
                        info!(
                            active_workers = stats.worker_count,
                            queue_size = stats.queue_size,
                            active_tasks = stats.active_tasks,
                            total_tasks = stats.total_tasks,
                            failed_tasks = stats.failed_tasks,
                            "worker pool stats"
                        );
                    }
                }
            }
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
