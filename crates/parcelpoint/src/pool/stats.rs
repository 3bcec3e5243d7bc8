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

//! Runtime counters and the statistics snapshot exposed by the pool.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Point-in-time copy of the pool's statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Target number of workers (shrinking is eventually consistent).
    pub worker_count: usize,
    /// Tasks accepted but not yet picked up by a worker.
    pub queue_size: usize,
    /// Tasks currently executing.
    pub active_tasks: u64,
    /// Tasks ever accepted into the queue.
    pub total_tasks: u64,
    /// Tasks that panicked.
    pub failed_tasks: u64,
    pub is_shutdown: bool,
}

/// Atomic task counters owned by a single pool instance.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    active: AtomicU64,
    total: AtomicU64,
    failed: AtomicU64,
}

impl PoolCounters {
    pub(crate) fn task_accepted(&self) -> u64 {
        self.total.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn task_started(&self) -> u64 {
        self.active.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn task_finished(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn task_failed(&self) -> u64 {
        self.failed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    pub(crate) fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub(crate) fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}
