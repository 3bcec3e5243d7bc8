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

//! Configuration for the sharded cache.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_SHARD_COUNT: usize = 16;
const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Which eviction policy a cache is built with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PolicyKind {
    /// Entries leave the cache once their TTL passes.
    #[default]
    Ttl,
    /// At most `capacity` keys; the least recently used one goes first.
    Lru { capacity: usize },
}

/// Configuration for [`ShardedCache`](super::ShardedCache).
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct CacheConfig {
    shard_count: usize,
    policy: PolicyKind,
    purge_interval: Duration,
    metrics_name: Option<String>,
}

impl CacheConfig {
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Number of shards, always a power of two.
    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    pub fn policy(&self) -> PolicyKind {
        self.policy
    }

    /// How often the background purger sweeps expired entries.
    pub fn purge_interval(&self) -> Duration {
        self.purge_interval
    }

    /// Label used for the `metrics` counters, if they are reported.
    pub fn metrics_name(&self) -> Option<&str> {
        self.metrics_name.as_deref()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfigBuilder::default().build()
    }
}

/// Builder for [`CacheConfig`].
#[derive(Debug, Clone)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl Default for CacheConfigBuilder {
    fn default() -> Self {
        Self {
            config: CacheConfig {
                shard_count: DEFAULT_SHARD_COUNT,
                policy: PolicyKind::Ttl,
                purge_interval: DEFAULT_PURGE_INTERVAL,
                metrics_name: None,
            },
        }
    }
}

impl CacheConfigBuilder {
    /// Sets the shard count; rounded up to the next power of two on build.
    pub fn shard_count(mut self, value: usize) -> Self {
        self.config.shard_count = value;
        self
    }

    pub fn policy(mut self, value: PolicyKind) -> Self {
        self.config.policy = value;
        self
    }

    /// Shorthand for `policy(PolicyKind::Lru { capacity })`.
    pub fn lru(self, capacity: usize) -> Self {
        self.policy(PolicyKind::Lru { capacity })
    }

    pub fn purge_interval(mut self, value: Duration) -> Self {
        self.config.purge_interval = value;
        self
    }

    /// Enables `metrics` reporting under the given cache label.
    pub fn metrics_name(mut self, value: impl Into<String>) -> Self {
        self.config.metrics_name = Some(value.into());
        self
    }

    pub fn build(self) -> CacheConfig {
        let mut config = self.config;
        config.shard_count = if config.shard_count == 0 {
            DEFAULT_SHARD_COUNT
        } else {
            config.shard_count.next_power_of_two()
        };
        if config.purge_interval.is_zero() {
            config.purge_interval = DEFAULT_PURGE_INTERVAL;
        }
        config
    }
}
