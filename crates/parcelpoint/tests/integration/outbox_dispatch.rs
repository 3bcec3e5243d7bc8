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

//! Outbox dispatcher scenarios against the in-memory repository.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parcelpoint::memory::MemoryStore;
use parcelpoint::outbox::{
    DispatcherConfig, NewOutboxEvent, NoopOutboxRepository, NoopProducer, OutboxDispatcher,
    OutboxRepository, OutboxStatus, Producer, RedriveScope, NO_ATTEMPTS_LEFT,
};
use parcelpoint::{BrokerError, DispatchError};
use tokio_util::sync::CancellationToken;

use crate::fixtures::{eventually, fast_dispatcher_config, RecordingProducer};

struct UnreachableBroker;

#[async_trait]
impl Producer for UnreachableBroker {
    async fn send(&self, topic: &str, _payload: &[u8]) -> Result<(), BrokerError> {
        Err(BrokerError::Delivery {
            topic: topic.to_string(),
            reason: "connection refused".to_string(),
        })
    }

    async fn send_with_key(
        &self,
        topic: &str,
        _key: &str,
        payload: &[u8],
    ) -> Result<(), BrokerError> {
        self.send(topic, payload).await
    }

    async fn close(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

fn event_payload(order_id: i64, event_id: i64) -> String {
    serde_json::json!({ "event_id": event_id, "order": { "order_id": order_id } }).to_string()
}

async fn seed(store: &MemoryStore, count: i64) -> Vec<i64> {
    let mut ids = Vec::new();
    for n in 1..=count {
        let event_id = 1_000 + n;
        let created = store
            .create(NewOutboxEvent::with_id(event_id, n, event_payload(n, event_id)))
            .await
            .unwrap();
        ids.push(created.event_id);
    }
    ids
}

fn spawn_dispatcher(
    dispatcher: Arc<OutboxDispatcher>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<Result<(), DispatchError>> {
    tokio::spawn(async move { dispatcher.dispatch(cancel).await })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dispatchers_deliver_each_event_once() {
    let store = Arc::new(MemoryStore::new());
    let ids = seed(&store, 60).await;
    let producer = Arc::new(RecordingProducer::default());

    let cancel = CancellationToken::new();
    let handles: Vec<_> = ["node-a", "node-b", "node-c"]
        .into_iter()
        .map(|instance| {
            let config = DispatcherConfig::builder()
                .poll_interval(Duration::from_millis(5))
                .retry_delay(Duration::from_secs(30))
                .batch_size(7)
                .instance_id(instance)
                .build();
            let dispatcher = Arc::new(OutboxDispatcher::new(
                store.clone(),
                producer.clone(),
                config,
            ));
            spawn_dispatcher(dispatcher, cancel.clone())
        })
        .collect();

    let done = eventually(Duration::from_secs(5), || producer.messages().len() >= ids.len()).await;
    cancel.cancel();
    for handle in handles {
        assert!(matches!(handle.await.unwrap(), Err(DispatchError::Cancelled)));
    }
    assert!(done);

    let deliveries = producer.deliveries_by_event();
    assert_eq!(deliveries.len(), ids.len());
    assert!(deliveries.values().all(|count| *count == 1));

    let counts = store.count_by_status().await.unwrap();
    assert_eq!(counts.get(OutboxStatus::Completed), 60);
    assert!(store.outbox_events().iter().all(|event| event.attempts == 1));
}

#[tokio::test]
async fn test_failed_events_can_be_redriven() {
    let store = Arc::new(MemoryStore::new());
    let ids = seed(&store, 2).await;

    let failing = Arc::new(OutboxDispatcher::new(
        store.clone(),
        Arc::new(UnreachableBroker),
        DispatcherConfig::builder()
            .poll_interval(Duration::from_millis(5))
            .retry_delay(Duration::from_millis(20))
            .max_attempts(2)
            .instance_id("failing")
            .build(),
    ));
    let cancel = CancellationToken::new();
    let handle = spawn_dispatcher(failing, cancel.clone());
    let store_ref = store.clone();
    let all_failed = eventually(Duration::from_secs(3), move || {
        store_ref
            .outbox_events()
            .iter()
            .all(|event| event.status == OutboxStatus::Failed)
    })
    .await;
    cancel.cancel();
    handle.await.unwrap().unwrap_err();
    assert!(all_failed);

    for event in store.outbox_events() {
        assert_eq!(event.attempts, 2);
        assert_eq!(event.error.as_deref(), Some(NO_ATTEMPTS_LEFT));
    }

    let reset = store
        .redrive_failed(RedriveScope::Events(vec![ids[0]]))
        .await
        .unwrap();
    assert_eq!(reset, 1);
    let redriven = store.find(ids[0]).await.unwrap().unwrap();
    assert_eq!(redriven.status, OutboxStatus::Created);
    assert_eq!(redriven.attempts, 0);
    assert!(redriven.error.is_none());

    let producer = Arc::new(RecordingProducer::default());
    let healthy = Arc::new(OutboxDispatcher::new(
        store.clone(),
        producer.clone(),
        fast_dispatcher_config("healthy"),
    ));
    let cancel = CancellationToken::new();
    let handle = spawn_dispatcher(healthy, cancel.clone());
    let delivered = eventually(Duration::from_secs(2), || producer.messages().len() == 1).await;
    cancel.cancel();
    handle.await.unwrap().unwrap_err();
    assert!(delivered);

    assert_eq!(
        store.find(ids[0]).await.unwrap().unwrap().status,
        OutboxStatus::Completed
    );
    assert_eq!(
        store.find(ids[1]).await.unwrap().unwrap().status,
        OutboxStatus::Failed
    );
}

#[tokio::test]
async fn test_disabled_outbox_runs_idle_until_stopped() {
    let dispatcher = Arc::new(OutboxDispatcher::new(
        Arc::new(NoopOutboxRepository::new()),
        Arc::new(NoopProducer::new()),
        fast_dispatcher_config("noop"),
    ));
    let handle = spawn_dispatcher(dispatcher.clone(), CancellationToken::new());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!handle.is_finished());

    dispatcher.stop();
    let result = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(DispatchError::Cancelled)));
}
