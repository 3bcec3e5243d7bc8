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

//! Bounded worker pool for parallel units of work.
//!
//! The pool accepts opaque [`Task`]s, queues them in a bounded FIFO of
//! `worker_count * queue_factor` slots and runs them on a resizable set of
//! tokio workers.
//!
//! # Example
//!
//! ```rust,ignore
//! use parcelpoint::pool::{DefaultWorkerPool, WorkerPool, WorkerPoolConfig};
//!
//! let pool = DefaultWorkerPool::new(WorkerPoolConfig::builder().worker_count(8).build());
//!
//! pool.submit(Box::pin(async move {
//!     process_order(42).await;
//! }))
//! .await;
//!
//! pool.shutdown_with_timeout(Duration::from_secs(10)).await?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::PoolError;

pub mod admin;
pub mod config;
mod default_pool;
mod queue;
pub mod stats;

pub use admin::{PoolAdmin, WorkerCountChange, WorkerStats};
pub use config::{WorkerPoolConfig, WorkerPoolConfigBuilder};
pub use default_pool::DefaultWorkerPool;
pub use stats::PoolStats;

/// A unit of work accepted by the pool.
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Executes submitted tasks on a bounded set of workers.
#[async_trait]
pub trait WorkerPool: Send + Sync {
    /// Queues a task, waiting for space if the queue is full.
    ///
    /// Tasks submitted after shutdown are dropped and logged.
    async fn submit(&self, task: Task);

    /// Queues a task unless `cancel` fires or the pool shuts down first.
    ///
    /// An already cancelled token is rejected without enqueueing.
    async fn submit_with_cancel(
        &self,
        cancel: &CancellationToken,
        task: Task,
    ) -> Result<(), PoolError>;

    /// Resizes the worker set.
    ///
    /// Growing takes effect immediately. Shrinking asks workers to exit after
    /// their current task; the new target is reported by [`WorkerPool::stats`]
    /// right away.
    fn set_worker_count(&self, count: usize) -> Result<WorkerCountChange, PoolError>;

    /// Stops accepting tasks and waits for queued and running tasks to finish.
    ///
    /// Safe to call more than once.
    async fn shutdown(&self);

    /// Like [`WorkerPool::shutdown`], but gives up waiting after `timeout`.
    ///
    /// The drain itself continues in the background.
    async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<(), PoolError>;

    /// Returns a snapshot of the pool's counters.
    fn stats(&self) -> PoolStats;

    fn is_shutdown(&self) -> bool;
}
