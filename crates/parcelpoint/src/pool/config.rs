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

//! Configuration for the worker pool.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::Level;

const DEFAULT_WORKER_COUNT: usize = 4;
const DEFAULT_QUEUE_FACTOR: usize = 2;
const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_LOG_PATH: &str = "./logs/workerpool.log";

/// Configuration for [`DefaultWorkerPool`](super::DefaultWorkerPool).
///
/// Queue capacity is `worker_count * queue_factor` and is fixed when the
/// pool is constructed; resizing the worker set later does not resize the
/// queue.
///
/// ```rust,ignore
/// let config = WorkerPoolConfig::builder()
///     .worker_count(8)
///     .queue_factor(4)
///     .build();
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct WorkerPoolConfig {
    worker_count: usize,
    queue_factor: usize,
    stats_interval: Duration,
    log_path: PathBuf,
    log_level: Level,
}

impl WorkerPoolConfig {
    /// Creates a new configuration builder with default values.
    pub fn builder() -> WorkerPoolConfigBuilder {
        WorkerPoolConfigBuilder::default()
    }

    /// Number of workers started with the pool.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Queue capacity multiplier.
    pub fn queue_factor(&self) -> usize {
        self.queue_factor
    }

    /// Bounded queue capacity.
    pub fn queue_capacity(&self) -> usize {
        self.worker_count * self.queue_factor
    }

    /// How often pool statistics are logged.
    pub fn stats_interval(&self) -> Duration {
        self.stats_interval
    }

    /// File that receives the pool's log records.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Minimum level written to the pool log file.
    pub fn log_level(&self) -> Level {
        self.log_level
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        WorkerPoolConfigBuilder::default().build()
    }
}

/// Builder for [`WorkerPoolConfig`].
///
/// Zero values fall back to the defaults (4 workers, factor 2, 30s stats).
#[derive(Debug, Clone)]
pub struct WorkerPoolConfigBuilder {
    config: WorkerPoolConfig,
}

impl Default for WorkerPoolConfigBuilder {
    fn default() -> Self {
        Self {
            config: WorkerPoolConfig {
                worker_count: DEFAULT_WORKER_COUNT,
                queue_factor: DEFAULT_QUEUE_FACTOR,
                stats_interval: DEFAULT_STATS_INTERVAL,
                log_path: PathBuf::from(DEFAULT_LOG_PATH),
                log_level: Level::INFO,
            },
        }
    }
}

impl WorkerPoolConfigBuilder {
    /// Sets the initial number of workers.
    pub fn worker_count(mut self, value: usize) -> Self {
        self.config.worker_count = value;
        self
    }

    /// Sets the queue capacity multiplier.
    pub fn queue_factor(mut self, value: usize) -> Self {
        self.config.queue_factor = value;
        self
    }

    /// Sets the statistics logging interval.
    pub fn stats_interval(mut self, value: Duration) -> Self {
        self.config.stats_interval = value;
        self
    }

    /// Sets the pool log file path.
    pub fn log_path(mut self, value: impl Into<PathBuf>) -> Self {
        self.config.log_path = value.into();
        self
    }

    /// Sets the pool log level.
    pub fn log_level(mut self, value: Level) -> Self {
        self.config.log_level = value;
        self
    }

    /// Builds the configuration, replacing zero values with defaults.
    pub fn build(self) -> WorkerPoolConfig {
        let mut config = self.config;
        if config.worker_count == 0 {
            config.worker_count = DEFAULT_WORKER_COUNT;
        }
        if config.queue_factor == 0 {
            config.queue_factor = DEFAULT_QUEUE_FACTOR;
        }
        if config.stats_interval.is_zero() {
            config.stats_interval = DEFAULT_STATS_INTERVAL;
        }
        if config.log_path.as_os_str().is_empty() {
            config.log_path = PathBuf::from(DEFAULT_LOG_PATH);
        }
        config
    }
}
