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

//! Hit, miss, eviction and key-count tracking for a cache instance.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use metrics::{Counter, Gauge};
use serde::{Deserialize, Serialize};

/// Snapshot of a cache's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub keys: u64,
}

impl CacheStats {
    /// Fraction of lookups that were hits, `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Metric handles registered with the global `metrics` recorder.
struct Sink {
    hits: Counter,
    misses: Counter,
    evictions: Counter,
    keys: Gauge,
}

/// Per-instance counters, optionally mirrored to the `metrics` facade.
pub(crate) struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    keys: AtomicI64,
    sink: Option<Sink>,
}

impl CacheMetrics {
    /// Creates counters; when `name` is set they are also reported as
    /// `parcelpoint_cache_*` metrics labelled with `cache = name`.
    pub(crate) fn new(name: Option<&str>) -> Self {
        let sink = name.map(|name| {
            let label = name.to_string();
            Sink {
                hits: metrics::counter!("parcelpoint_cache_hits_total", "cache" => label.clone()),
                misses: metrics::counter!("parcelpoint_cache_misses_total", "cache" => label.clone()),
                evictions: metrics::counter!("parcelpoint_cache_evictions_total", "cache" => label.clone()),
                keys: metrics::gauge!("parcelpoint_cache_keys_total", "cache" => label),
            }
        });
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            keys: AtomicI64::new(0),
            sink,
        }
    }

    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        if let Some(sink) = &self.sink {
            sink.hits.increment(1);
        }
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        if let Some(sink) = &self.sink {
            sink.misses.increment(1);
        }
    }

    pub(crate) fn eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        if let Some(sink) = &self.sink {
            sink.evictions.increment(1);
        }
    }

    pub(crate) fn key_added(&self) {
        let keys = self.keys.fetch_add(1, Ordering::Relaxed) + 1;
        self.publish_keys(keys);
    }

    pub(crate) fn key_removed(&self) {
        let keys = self.keys.fetch_sub(1, Ordering::Relaxed) - 1;
        self.publish_keys(keys);
    }

    fn publish_keys(&self, keys: i64) {
        if let Some(sink) = &self.sink {
            sink.keys.set(keys.max(0) as f64);
        }
    }

    pub(crate) fn keys(&self) -> usize {
        self.keys.load(Ordering::Relaxed).max(0) as usize
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            keys: self.keys() as u64,
        }
    }

    /// Zeroes hits, misses and evictions. The key count is left as is.
    pub(crate) fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}
