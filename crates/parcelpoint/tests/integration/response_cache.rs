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

//! Cached read paths and background expiry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parcelpoint::cache::{CacheConfig, CacheTtl, ShardedCache};
use parcelpoint::clock::FixedClock;
use parcelpoint::memory::MemoryStore;
use parcelpoint::orders::{
    HistoryEntry, Order, OrderHandlers, OrderMutation, OrderService, OrderStore, OrdersFilter,
};
use parcelpoint::pool::{DefaultWorkerPool, WorkerPoolConfig};
use parcelpoint::RepositoryError;

use crate::fixtures::accept_request;

/// Order store that counts listing queries and answers them slowly.
struct CountingStore {
    inner: MemoryStore,
    lists: AtomicUsize,
}

#[async_trait]
impl OrderStore for CountingStore {
    async fn load(&self, order_id: i64) -> Result<Option<Order>, RepositoryError> {
        self.inner.load(order_id).await
    }

    async fn list(&self, filter: &OrdersFilter) -> Result<(Vec<Order>, usize), RepositoryError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.inner.list(filter).await
    }

    async fn history(&self, order_id: Option<i64>) -> Result<Vec<HistoryEntry>, RepositoryError> {
        self.inner.history(order_id).await
    }

    async fn apply(&self, mutation: OrderMutation) -> Result<(), RepositoryError> {
        self.inner.apply(mutation).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_listings_share_one_query() {
    let clock = Arc::new(FixedClock::new());
    let store = Arc::new(CountingStore {
        inner: MemoryStore::with_clock(clock.clone()),
        lists: AtomicUsize::new(0),
    });
    let pool = Arc::new(DefaultWorkerPool::new(WorkerPoolConfig::default()));
    let service = OrderService::new(store.clone(), pool, clock.clone());
    let cache = ShardedCache::start(CacheConfig::builder().metrics_name("orders").build());
    let handlers = OrderHandlers::new(service, cache.clone());

    handlers
        .accept_order(accept_request(&clock, 1, 5))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let handlers = handlers.clone();
        tasks.push(tokio::spawn(async move {
            handlers.list_orders(OrdersFilter::new().user(5)).await
        }));
    }
    for task in tasks {
        let page = task.await.unwrap().unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.next_id, Some(1));
    }
    assert_eq!(store.lists.load(Ordering::SeqCst), 1);

    handlers.list_orders(OrdersFilter::new().user(5)).await.unwrap();
    assert_eq!(store.lists.load(Ordering::SeqCst), 1);
    assert!(cache.stats().hits >= 1);
    assert_eq!(cache.size(), 1);
}

#[tokio::test]
async fn test_background_purge_removes_expired_entries() {
    let cache: Arc<ShardedCache<String, u32>> = ShardedCache::start(
        CacheConfig::builder()
            .shard_count(2)
            .purge_interval(Duration::from_millis(20))
            .build(),
    );
    cache.set("short".to_string(), 1, Duration::from_millis(30));
    cache.set("long".to_string(), 2, Duration::from_secs(60));
    cache.set("forever".to_string(), 3, Duration::ZERO);

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(cache.ttl(&"short".to_string()), CacheTtl::Missing);
    assert!(cache.has(&"long".to_string()));
    assert_eq!(cache.ttl(&"forever".to_string()), CacheTtl::NoExpiry);
    assert_eq!(cache.stats().evictions, 1);

    cache.close();
    assert!(cache.is_closed());
    assert_eq!(cache.size(), 0);
}
