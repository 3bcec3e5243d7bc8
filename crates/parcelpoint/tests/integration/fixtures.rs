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

//! Shared test fixtures.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use parking_lot::Mutex;

use parcelpoint::cache::{CacheConfig, ShardedCache};
use parcelpoint::clock::{Clock, FixedClock};
use parcelpoint::memory::MemoryStore;
use parcelpoint::orders::{AcceptOrderRequest, OrderHandlers, OrderService, PackageType};
use parcelpoint::outbox::{DispatcherConfig, Producer};
use parcelpoint::pool::{DefaultWorkerPool, WorkerPoolConfig};
use parcelpoint::BrokerError;

pub struct Pickup {
    pub clock: Arc<FixedClock>,
    pub store: Arc<MemoryStore>,
    pub pool: Arc<DefaultWorkerPool>,
    pub handlers: OrderHandlers,
}

pub fn pickup_point() -> Pickup {
    let clock = Arc::new(FixedClock::new());
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let pool = Arc::new(DefaultWorkerPool::new(
        WorkerPoolConfig::builder().worker_count(4).build(),
    ));
    let service = OrderService::new(store.clone(), pool.clone(), clock.clone());
    let cache = ShardedCache::start(CacheConfig::builder().shard_count(4).build());
    Pickup {
        clock,
        store,
        pool,
        handlers: OrderHandlers::new(service, cache),
    }
}

pub fn accept_request(clock: &FixedClock, order_id: i64, user_id: i64) -> AcceptOrderRequest {
    AcceptOrderRequest {
        order_id,
        user_id,
        expires_at: clock.now() + ChronoDuration::days(5),
        package: PackageType::BagFilm,
        weight: 2.0,
        price: 150.0,
    }
}

pub fn fast_dispatcher_config(instance_id: &str) -> DispatcherConfig {
    DispatcherConfig::builder()
        .topic("pvz.events-log")
        .poll_interval(Duration::from_millis(10))
        .retry_delay(Duration::from_secs(10))
        .instance_id(instance_id)
        .build()
}

/// A message captured by [`RecordingProducer`].
#[derive(Debug, Clone)]
pub struct Published {
    pub topic: String,
    pub key: String,
    pub payload: serde_json::Value,
}

/// Producer that records every message it accepts.
#[derive(Default)]
pub struct RecordingProducer {
    messages: Mutex<Vec<Published>>,
}

impl RecordingProducer {
    pub fn messages(&self) -> Vec<Published> {
        self.messages.lock().clone()
    }

    /// Number of deliveries per event id.
    pub fn deliveries_by_event(&self) -> HashMap<i64, usize> {
        let mut counts = HashMap::new();
        for message in self.messages.lock().iter() {
            if let Some(id) = message.payload["event_id"].as_i64() {
                *counts.entry(id).or_insert(0) += 1;
            }
        }
        counts
    }
}

#[async_trait]
impl Producer for RecordingProducer {
    async fn send(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.send_with_key(topic, "", payload).await
    }

    async fn send_with_key(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<(), BrokerError> {
        let payload = serde_json::from_slice(payload).map_err(|e| BrokerError::Delivery {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;
        self.messages.lock().push(Published {
            topic: topic.to_string(),
            key: key.to_string(),
            payload,
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
