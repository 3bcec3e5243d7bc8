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

//! Administrative hooks over a running worker pool.
//!
//! These are the operations an operator-facing RPC surface calls into:
//! resizing the worker set and reading the pool's counters.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::WorkerPool;
use crate::error::PoolError;

/// Result of a resize request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCountChange {
    pub old_count: usize,
    pub new_count: usize,
}

/// Worker statistics as reported to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub active_workers: usize,
    pub queued_tasks: usize,
    pub total_tasks: u64,
    pub failed_tasks: u64,
    /// Distinguishes "no workers because shut down" from a misconfigured pool.
    pub is_shutdown: bool,
}

/// Admin facade over a shared [`WorkerPool`].
#[derive(Clone)]
pub struct PoolAdmin {
    pool: Arc<dyn WorkerPool>,
}

impl PoolAdmin {
    pub fn new(pool: Arc<dyn WorkerPool>) -> Self {
        Self { pool }
    }

    /// Resizes the pool. A count of zero is rejected.
    pub fn set_worker_count(&self, count: usize) -> Result<WorkerCountChange, PoolError> {
        if count == 0 {
            return Err(PoolError::InvalidWorkerCount(count));
        }
        let change = self.pool.set_worker_count(count)?;
        info!(
            old_count = change.old_count,
            new_count = change.new_count,
            "worker count changed by admin request"
        );
        Ok(change)
    }

    pub fn worker_stats(&self) -> WorkerStats {
        let stats = self.pool.stats();
        WorkerStats {
            active_workers: stats.worker_count,
            queued_tasks: stats.queue_size,
            total_tasks: stats.total_tasks,
            failed_tasks: stats.failed_tasks,
            is_shutdown: stats.is_shutdown,
        }
    }
}
