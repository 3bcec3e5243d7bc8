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

//! Eviction policies for the sharded cache.
//!
//! A policy decides which key, if any, should be removed:
//!
//! - [`TtlPolicy`] names the probed key once its deadline has passed and
//!   ignores access/insert/delete notifications.
//! - [`LruPolicy`] keeps one recency list across all shards and names the
//!   least recently used key whenever the list grows past its capacity.
//!
//! The cache consults the policy on reads (lazy expiration), after every
//! insert (capacity enforcement) and during background purges.

use std::hash::Hash;
use std::time::Instant;

use lru::LruCache;
use parking_lot::Mutex;

use super::item::is_past;

/// Strategy deciding when cache entries are removed.
pub trait EvictionPolicy<K: PartialEq>: Send + Sync {
    /// Returns the key that should be removed after probing `key`, if any.
    fn evict(&self, key: &K, expires_at: Option<Instant>) -> Option<K>;

    /// The key was read.
    fn on_access(&self, key: &K);

    /// The key was inserted or overwritten.
    fn on_insert(&self, key: &K);

    /// The key was removed from the cache.
    fn on_delete(&self, key: &K);

    /// Human-readable policy name.
    fn name(&self) -> String;

    /// True when the probed key itself should be removed.
    fn should_evict(&self, key: &K, expires_at: Option<Instant>) -> bool {
        self.evict(key, expires_at).as_ref() == Some(key)
    }
}

/// Time-to-live policy with lazy expiration.
#[derive(Debug, Default, Clone, Copy)]
pub struct TtlPolicy;

impl TtlPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl<K: PartialEq + Clone> EvictionPolicy<K> for TtlPolicy {
    fn evict(&self, key: &K, expires_at: Option<Instant>) -> Option<K> {
        is_past(expires_at).then(|| key.clone())
    }

    fn on_access(&self, _key: &K) {}

    fn on_insert(&self, _key: &K) {}

    fn on_delete(&self, _key: &K) {}

    fn name(&self) -> String {
        "TTL with lazy expiration".to_string()
    }
}

/// Least-recently-used policy bounded by `capacity` keys.
pub struct LruPolicy<K: Hash + Eq> {
    capacity: usize,
    recency: Mutex<LruCache<K, ()>>,
}

impl<K: Hash + Eq> LruPolicy<K> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            recency: Mutex::new(LruCache::unbounded()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.recency.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.recency.lock().is_empty()
    }
}

impl<K> EvictionPolicy<K> for LruPolicy<K>
where
    K: Hash + Eq + Clone + Send + Sync,
{
    fn evict(&self, _key: &K, _expires_at: Option<Instant>) -> Option<K> {
        let recency = self.recency.lock();
        if recency.len() <= self.capacity {
            return None;
        }
        recency.peek_lru().map(|(key, _)| key.clone())
    }

    fn on_access(&self, key: &K) {
        self.recency.lock().get(key);
    }

    fn on_insert(&self, key: &K) {
        self.recency.lock().put(key.clone(), ());
    }

    fn on_delete(&self, key: &K) {
        self.recency.lock().pop(key);
    }

    fn name(&self) -> String {
        format!("LRU(cap={})", self.capacity)
    }
}
