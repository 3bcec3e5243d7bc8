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

//! The sharded cache.

use std::collections::HashMap;
use std::fmt::{self, Display, Write as _};
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use regex::Regex;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::config::{CacheConfig, PolicyKind};
use super::item::{deadline, is_past, CacheTtl, CachedItem};
use super::metrics::{CacheMetrics, CacheStats};
use super::policy::{EvictionPolicy, LruPolicy, TtlPolicy};
use super::single_flight::SingleFlight;
use crate::error::CacheError;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

type Shard<K, V> = RwLock<HashMap<K, CachedItem<V>>>;

/// FNV-1a 64 over everything written through `fmt::Write`.
struct Fnv1a(u64);

impl fmt::Write for Fnv1a {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.0 ^= u64::from(byte);
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
        Ok(())
    }
}

fn shard_hash(key: &impl Display) -> u64 {
    let mut hasher = Fnv1a(FNV_OFFSET_BASIS);
    // Writing into Fnv1a cannot fail.
    let _ = write!(hasher, "{key}");
    hasher.0
}

/// Concurrent key/value cache split into independently locked shards.
///
/// Keys are routed to a shard by the FNV-1a hash of their `Display` form.
/// Removal decisions are delegated to an [`EvictionPolicy`]: expired keys
/// are dropped lazily on read and by a periodic purge, and capacity-bound
/// policies are enforced after every insert.
///
/// [`get_or_set`](Self::get_or_set) suppresses duplicate loads: concurrent
/// callers for a missing key share a single factory call.
pub struct ShardedCache<K, V> {
    shards: Box<[Shard<K, V>]>,
    mask: u64,
    policy: Box<dyn EvictionPolicy<K>>,
    metrics: CacheMetrics,
    flights: SingleFlight,
    purge_interval: Duration,
    closed: CancellationToken,
}

impl<K, V> ShardedCache<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Builds a cache without a background purger.
    pub fn new(config: CacheConfig) -> Self {
        let policy: Box<dyn EvictionPolicy<K>> = match config.policy() {
            PolicyKind::Ttl => Box::new(TtlPolicy::new()),
            PolicyKind::Lru { capacity } => Box::new(LruPolicy::new(capacity)),
        };
        Self::with_policy(config, policy)
    }

    /// Builds a cache around a caller-supplied policy.
    pub fn with_policy(config: CacheConfig, policy: Box<dyn EvictionPolicy<K>>) -> Self {
        let shard_count = config.shard_count();
        let shards = (0..shard_count)
            .map(|_| RwLock::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            mask: (shard_count as u64).saturating_sub(1),
            policy,
            metrics: CacheMetrics::new(config.metrics_name()),
            flights: SingleFlight::new(),
            purge_interval: config.purge_interval(),
            closed: CancellationToken::new(),
        }
    }

    /// Builds a shared cache and starts its background purger.
    ///
    /// Must be called inside a tokio runtime. The purger stops when the
    /// cache is closed or the last `Arc` is dropped.
    pub fn start(config: CacheConfig) -> Arc<Self> {
        let cache = Arc::new(Self::new(config));
        Self::spawn_purger(&cache);
        cache
    }

    fn spawn_purger(cache: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(cache);
        let closed = cache.closed.clone();
        let period = cache.purge_interval;
        info!(
            shards = cache.shards.len(),
            policy = %cache.policy.name(),
            purge_interval_ms = period.as_millis() as u64,
            "Cache started"
        );

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = closed.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(cache) = weak.upgrade() else { break };
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            debug!(purged, "Purged expired cache entries");
                        }
                    }
                }
            }
            debug!("Cache purger stopped");
        });
    }

    fn shard(&self, key: &K) -> &Shard<K, V> {
        &self.shards[(shard_hash(key) & self.mask) as usize]
    }

    fn is_evictable(&self, key: &K, expires_at: Option<Instant>) -> bool {
        self.policy.should_evict(key, expires_at)
    }

    /// Returns the value for `key`, removing it first if the policy says
    /// it should go.
    pub fn get(&self, key: &K) -> Option<V> {
        let value = self.lookup(key);
        match value {
            Some(_) => self.metrics.hit(),
            None => self.metrics.miss(),
        }
        value
    }

    fn lookup(&self, key: &K) -> Option<V> {
        let shard = self.shard(key);
        {
            let items = shard.read();
            let item = items.get(key)?;
            if !self.is_evictable(key, item.expires_at) {
                let value = item.value.clone();
                drop(items);
                self.policy.on_access(key);
                return Some(value);
            }
        }

        // The entry looked evictable; re-check under the write lock since
        // another writer may have refreshed it in between.
        let mut items = shard.write();
        let evictable = items
            .get(key)
            .map(|item| self.is_evictable(key, item.expires_at))?;
        if evictable {
            items.remove(key);
            drop(items);
            self.record_eviction(key);
            None
        } else {
            let value = items.get(key).map(|item| item.value.clone());
            drop(items);
            self.policy.on_access(key);
            value
        }
    }

    /// Stores `value` under `key`. A zero `ttl` means no expiration.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let item = CachedItem::new(value, ttl);
        let expires_at = item.expires_at;
        let previous = self.shard(&key).write().insert(key.clone(), item);
        if previous.is_none() {
            self.metrics.key_added();
        }
        self.policy.on_insert(&key);
        self.enforce_policy(&key, expires_at);
    }

    fn enforce_policy(&self, key: &K, expires_at: Option<Instant>) {
        while let Some(victim) = self.policy.evict(key, expires_at) {
            if !self.remove(&victim) {
                // Already gone from the shards; drop it from the policy too.
                self.policy.on_delete(&victim);
            }
            if victim == *key {
                break;
            }
        }
    }

    /// Returns the cached value or loads it with `factory`.
    ///
    /// Concurrent callers for the same missing key share one factory call
    /// and all observe its result. Only `Ok` values are cached.
    pub async fn get_or_set<E, F, Fut>(&self, key: K, ttl: Duration, factory: F) -> Result<V, E>
    where
        E: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let flight = key.to_string();
        self.flights
            .run(&flight, move || async move {
                // A flight that finished just before this one began may
                // already have filled the slot.
                if let Some(value) = self.lookup(&key) {
                    return Ok(value);
                }
                let value = factory().await?;
                self.set(key, value.clone(), ttl);
                Ok(value)
            })
            .await
    }

    fn remove(&self, key: &K) -> bool {
        let removed = self.shard(key).write().remove(key).is_some();
        if removed {
            self.record_eviction(key);
        }
        removed
    }

    fn record_eviction(&self, key: &K) {
        self.policy.on_delete(key);
        self.metrics.key_removed();
        self.metrics.eviction();
    }

    /// Removes `key`. Returns whether it was present.
    pub fn invalidate(&self, key: &K) -> bool {
        self.remove(key)
    }

    /// Removes every entry.
    pub fn invalidate_all(&self) -> usize {
        self.invalidate_func(|_| true)
    }

    /// Removes every entry whose key, in its string form, matches `pattern`.
    pub fn invalidate_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let regex = Regex::new(pattern).map_err(|source| CacheError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        let removed = self.invalidate_func(|key| regex.is_match(&key.to_string()));
        debug!(pattern, removed, "Invalidated cache entries by pattern");
        Ok(removed)
    }

    /// Removes every entry whose key satisfies `predicate`.
    pub fn invalidate_func<F>(&self, predicate: F) -> usize
    where
        F: Fn(&K) -> bool,
    {
        let removed = self.drain_where(|key, _| predicate(key));
        for key in &removed {
            self.record_eviction(key);
        }
        removed.len()
    }

    fn drain_where<F>(&self, mut predicate: F) -> Vec<K>
    where
        F: FnMut(&K, &CachedItem<V>) -> bool,
    {
        let mut removed = Vec::new();
        for shard in self.shards.iter() {
            shard.write().retain(|key, item| {
                if predicate(key, item) {
                    removed.push(key.clone());
                    false
                } else {
                    true
                }
            });
        }
        removed
    }

    /// True when `key` is present and not due for eviction.
    ///
    /// Does not touch hit/miss counters or recency.
    pub fn has(&self, key: &K) -> bool {
        self.shard(key)
            .read()
            .get(key)
            .is_some_and(|item| !self.is_evictable(key, item.expires_at))
    }

    /// Remaining lifetime of `key`.
    pub fn ttl(&self, key: &K) -> CacheTtl {
        let items = self.shard(key).read();
        let Some(item) = items.get(key) else {
            return CacheTtl::Missing;
        };
        match item.expires_at {
            None => CacheTtl::NoExpiry,
            Some(at) => match at.checked_duration_since(Instant::now()) {
                Some(left) if !left.is_zero() => CacheTtl::Remaining(left),
                _ => CacheTtl::Expired,
            },
        }
    }

    /// Gives a live key a new TTL counted from now.
    ///
    /// Returns `false` when the key is missing or already expired; an
    /// expired key is removed.
    pub fn update_ttl(&self, key: &K, ttl: Duration) -> bool {
        let mut items = self.shard(key).write();
        let Some(item) = items.get_mut(key) else {
            return false;
        };
        if is_past(item.expires_at) {
            items.remove(key);
            drop(items);
            self.record_eviction(key);
            return false;
        }
        item.expires_at = deadline(ttl);
        true
    }

    /// Keys of all entries that are not due for eviction.
    pub fn keys(&self) -> Vec<K> {
        let mut keys = Vec::new();
        for shard in self.shards.iter() {
            let items = shard.read();
            keys.extend(
                items
                    .iter()
                    .filter(|(key, item)| !self.is_evictable(key, item.expires_at))
                    .map(|(key, _)| key.clone()),
            );
        }
        keys
    }

    /// Copies of all entries that are not due for eviction.
    pub fn items(&self) -> HashMap<K, V> {
        let mut out = HashMap::new();
        for shard in self.shards.iter() {
            let items = shard.read();
            out.extend(
                items
                    .iter()
                    .filter(|(key, item)| !self.is_evictable(key, item.expires_at))
                    .map(|(key, item)| (key.clone(), item.value.clone())),
            );
        }
        out
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn size(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Removes every entry the policy considers evictable.
    pub fn purge_expired(&self) -> usize {
        let removed = self.drain_where(|key, item| self.policy.should_evict(key, item.expires_at));
        for key in &removed {
            self.record_eviction(key);
        }
        removed.len()
    }

    /// Name of the active eviction policy.
    pub fn eviction_policy(&self) -> String {
        self.policy.name()
    }

    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot()
    }

    /// Zeroes hit, miss and eviction counters.
    pub fn reset_stats(&self) {
        self.metrics.reset();
    }

    /// Stops the purger and empties the cache.
    ///
    /// Removed keys are reported to the policy but not counted as
    /// evictions.
    pub fn close(&self) {
        self.closed.cancel();
        let removed = self.drain_where(|_, _| true);
        for key in &removed {
            self.policy.on_delete(key);
            self.metrics.key_removed();
        }
        info!(cleared = removed.len(), "Cache closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl<K, V> Drop for ShardedCache<K, V> {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ttl_cache() -> ShardedCache<String, i32> {
        ShardedCache::new(CacheConfig::builder().shard_count(4).build())
    }

    #[test]
    fn test_shard_hash_is_fnv1a() {
        // Reference values for FNV-1a 64.
        assert_eq!(shard_hash(&""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(shard_hash(&"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(shard_hash(&"a"), shard_hash(&String::from("a")));
    }

    #[test]
    fn test_set_get_and_counters() {
        let cache = ttl_cache();
        cache.set("a".to_string(), 1, Duration::ZERO);

        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"b".to_string()), None);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.keys), (1, 1, 1));
        assert_eq!(cache.ttl(&"a".to_string()), CacheTtl::NoExpiry);
        assert_eq!(cache.ttl(&"b".to_string()).as_millis(), -1);
    }

    #[test]
    fn test_expired_entry_is_removed_on_read() {
        let cache = ttl_cache();
        cache.set("k".to_string(), 7, Duration::from_millis(20));
        assert!(cache.has(&"k".to_string()));

        std::thread::sleep(Duration::from_millis(40));

        assert!(!cache.has(&"k".to_string()));
        assert_eq!(cache.ttl(&"k".to_string()), CacheTtl::Expired);
        assert_eq!(cache.get(&"k".to_string()), None);
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.ttl(&"k".to_string()), CacheTtl::Missing);
    }

    #[test]
    fn test_update_ttl() {
        let cache = ttl_cache();
        cache.set("live".to_string(), 1, Duration::from_secs(60));
        cache.set("stale".to_string(), 2, Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(30));

        assert!(cache.update_ttl(&"live".to_string(), Duration::ZERO));
        assert_eq!(cache.ttl(&"live".to_string()), CacheTtl::NoExpiry);
        assert!(!cache.update_ttl(&"stale".to_string(), Duration::from_secs(60)));
        assert!(!cache.update_ttl(&"missing".to_string(), Duration::from_secs(60)));
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_purge_expired() {
        let cache = ttl_cache();
        for i in 0..10 {
            cache.set(format!("short-{i}"), i, Duration::from_millis(10));
            cache.set(format!("long-{i}"), i, Duration::from_secs(60));
        }
        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.purge_expired(), 10);
        assert_eq!(cache.size(), 10);
        assert_eq!(cache.keys().len(), 10);
        assert_eq!(cache.items().get("long-3"), Some(&3));
    }

    #[test]
    fn test_invalidate_pattern() {
        let cache = ttl_cache();
        cache.set("ListOrders:user=1;page=1".to_string(), 1, Duration::ZERO);
        cache.set("ListOrders:user=2;page=1".to_string(), 2, Duration::ZERO);
        cache.set("OrderHistory:5".to_string(), 3, Duration::ZERO);

        assert_eq!(cache.invalidate_pattern("^ListOrders:").unwrap(), 2);
        assert_eq!(cache.keys(), vec!["OrderHistory:5".to_string()]);
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let cache = ttl_cache();
        cache.set("a".to_string(), 1, Duration::ZERO);
        let err = cache.invalidate_pattern("(unclosed").unwrap_err();
        assert!(matches!(err, CacheError::InvalidPattern { .. }));
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_invalidate_func_and_all() {
        let cache = ttl_cache();
        for i in 0..6 {
            cache.set(i.to_string(), i, Duration::ZERO);
        }
        assert_eq!(cache.invalidate_func(|key| key.parse::<i32>().unwrap() % 2 == 0), 3);
        assert!(cache.invalidate(&"1".to_string()));
        assert!(!cache.invalidate(&"1".to_string()));
        assert_eq!(cache.invalidate_all(), 2);
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.stats().keys, 0);
    }

    #[test]
    fn test_lru_evicts_least_recently_used() {
        let cache: ShardedCache<String, i32> =
            ShardedCache::new(CacheConfig::builder().lru(2).build());
        assert_eq!(cache.eviction_policy(), "LRU(cap=2)");

        cache.set("a".to_string(), 1, Duration::ZERO);
        cache.set("b".to_string(), 2, Duration::ZERO);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        cache.set("c".to_string(), 3, Duration::ZERO);

        assert!(!cache.has(&"b".to_string()));
        assert!(cache.has(&"a".to_string()));
        assert!(cache.has(&"c".to_string()));
        assert_eq!(cache.size(), 2);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_does_not_grow_key_count() {
        let cache = ttl_cache();
        cache.set("a".to_string(), 1, Duration::ZERO);
        cache.set("a".to_string(), 2, Duration::ZERO);
        assert_eq!(cache.stats().keys, 1);
        assert_eq!(cache.get(&"a".to_string()), Some(2));
    }

    #[test]
    fn test_reset_stats_keeps_entries() {
        let cache = ttl_cache();
        cache.set("a".to_string(), 1, Duration::ZERO);
        cache.get(&"a".to_string());
        cache.reset_stats();
        assert_eq!(cache.stats().hits, 0);
        assert_eq!(cache.size(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_get_or_set_loads_once_for_concurrent_callers() {
        let cache = Arc::new(ttl_cache());
        let loads = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let cache = cache.clone();
            let loads = loads.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_set("hot".to_string(), Duration::from_secs(30), || async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, String>(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&"hot".to_string()), Some(42));
    }

    #[tokio::test]
    async fn test_get_or_set_error_is_not_cached() {
        let cache = ttl_cache();
        let result = cache
            .get_or_set("k".to_string(), Duration::ZERO, || async {
                Err::<i32, _>("backend down".to_string())
            })
            .await;
        assert_eq!(result, Err("backend down".to_string()));
        assert!(!cache.has(&"k".to_string()));

        let result = cache
            .get_or_set("k".to_string(), Duration::ZERO, || async { Ok::<_, String>(5) })
            .await;
        assert_eq!(result, Ok(5));
        assert_eq!(cache.get(&"k".to_string()), Some(5));
    }

    #[tokio::test]
    async fn test_close_stops_purger_and_clears() {
        let cache: Arc<ShardedCache<String, i32>> = ShardedCache::start(
            CacheConfig::builder()
                .purge_interval(Duration::from_millis(10))
                .build(),
        );
        cache.set("a".to_string(), 1, Duration::from_millis(5));
        cache.set("b".to_string(), 2, Duration::ZERO);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.size(), 1);

        cache.close();
        assert!(cache.is_closed());
        assert_eq!(cache.size(), 0);
        assert_eq!(cache.stats().evictions, 1);
    }
}
