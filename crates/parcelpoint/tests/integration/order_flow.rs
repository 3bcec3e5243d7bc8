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

//! End-to-end order flows through the cached handlers and the outbox.

use std::sync::Arc;
use std::time::Duration;

use parcelpoint::orders::{
    list_orders_key, order_history_key, HistoryEvent, OrderStatus, OrdersFilter, ProcessAction,
};
use parcelpoint::outbox::{OutboxDispatcher, OutboxRepository, OutboxStatus};
use parcelpoint::pool::WorkerPool;
use parcelpoint::OrderError;
use tokio_util::sync::CancellationToken;

use crate::fixtures::{
    accept_request, eventually, fast_dispatcher_config, pickup_point, RecordingProducer,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_batch_results_are_reported_per_input() {
    let pickup = pickup_point();
    let requests = vec![
        accept_request(&pickup.clock, 101, 1),
        accept_request(&pickup.clock, 102, 1),
        accept_request(&pickup.clock, 103, 2),
    ];
    let imported = pickup.handlers.import_orders(requests).await;
    assert_eq!(imported.processed, vec![101, 102, 103]);
    assert!(imported.failed.is_empty());

    // User 1 owns 101 and 102 only; 104 does not exist.
    let report = pickup
        .handlers
        .process_orders(ProcessAction::Issue, 1, &[103, 101, 104, 102])
        .await;
    assert_eq!(report.processed, vec![101, 102]);
    let failed: Vec<i64> = report.failed.iter().map(|(id, _)| *id).collect();
    assert_eq!(failed, vec![103, 104]);
    assert!(matches!(report.failed[0].1, OrderError::Validation(_)));
    assert_eq!(report.failed[1].1, OrderError::NotFound(104));

    let issued = pickup
        .handlers
        .list_orders(OrdersFilter::new().user(1))
        .await
        .unwrap();
    assert!(issued
        .orders
        .iter()
        .all(|order| order.status == OrderStatus::Issued));
}

#[tokio::test]
async fn test_writes_invalidate_cached_reads() {
    let pickup = pickup_point();
    pickup
        .handlers
        .accept_order(accept_request(&pickup.clock, 1, 7))
        .await
        .unwrap();

    let filter = OrdersFilter::new().user(7).in_pvz(true);
    let before = pickup.handlers.list_orders(filter.clone()).await.unwrap();
    assert_eq!(before.total, 1);
    let history = pickup.handlers.order_history(1).await.unwrap();
    assert_eq!(history.len(), 1);

    let cache = pickup.handlers.cache();
    assert!(cache.has(&list_orders_key(&filter)));
    assert!(cache.has(&order_history_key(1)));

    pickup
        .handlers
        .process_orders(ProcessAction::Issue, 7, &[1])
        .await;
    assert!(!cache.has(&list_orders_key(&filter)));
    assert!(!cache.has(&order_history_key(1)));

    let after = pickup.handlers.list_orders(filter).await.unwrap();
    assert_eq!(after.total, 0);
    let history = pickup.handlers.order_history(1).await.unwrap();
    let events: Vec<HistoryEvent> = history.iter().map(|entry| entry.event).collect();
    assert_eq!(events, vec![HistoryEvent::Accepted, HistoryEvent::Issued]);
}

#[tokio::test]
async fn test_distinct_listing_filters_are_cached_separately() {
    let pickup = pickup_point();
    for id in 1..=5 {
        pickup
            .handlers
            .accept_order(accept_request(&pickup.clock, id, 1))
            .await
            .unwrap();
    }

    let ids = |page: parcelpoint::orders::OrdersPage| -> Vec<i64> {
        page.orders.iter().map(|order| order.order_id).collect()
    };
    let newest = pickup
        .handlers
        .list_orders(OrdersFilter::new().user(1).last(1))
        .await
        .unwrap();
    assert_eq!(ids(newest), vec![5]);

    let recent = pickup
        .handlers
        .list_orders(OrdersFilter::new().user(1).last(4))
        .await
        .unwrap();
    let uncached = pickup
        .handlers
        .service()
        .list_orders(&OrdersFilter::new().user(1).last(4))
        .await
        .unwrap();
    assert_eq!(ids(recent), vec![5, 4, 3, 2]);
    assert_eq!(ids(uncached), vec![5, 4, 3, 2]);

    let after = pickup
        .handlers
        .list_orders(OrdersFilter::new().user(1).after(2))
        .await
        .unwrap();
    assert_eq!(ids(after), vec![3, 4, 5]);

    let accepted = OrdersFilter::new().user(1).status(OrderStatus::Accepted);
    assert_ne!(
        list_orders_key(&accepted),
        list_orders_key(&OrdersFilter::new().user(1))
    );
    assert!(list_orders_key(&accepted).starts_with("ListOrders:"));
}

#[tokio::test]
async fn test_failed_batch_keeps_cache() {
    let pickup = pickup_point();
    pickup
        .handlers
        .accept_order(accept_request(&pickup.clock, 1, 7))
        .await
        .unwrap();
    let filter = OrdersFilter::new().user(7);
    pickup.handlers.list_orders(filter.clone()).await.unwrap();

    let report = pickup
        .handlers
        .process_orders(ProcessAction::Return, 7, &[1])
        .await;
    assert!(report.processed.is_empty());
    assert!(pickup.handlers.cache().has(&list_orders_key(&filter)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_order_events_are_published_keyed_by_order() {
    let pickup = pickup_point();
    for id in [11, 12] {
        pickup
            .handlers
            .accept_order(accept_request(&pickup.clock, id, 3))
            .await
            .unwrap();
    }
    pickup
        .handlers
        .process_orders(ProcessAction::Issue, 3, &[11])
        .await;

    let producer = Arc::new(RecordingProducer::default());
    let dispatcher = Arc::new(OutboxDispatcher::new(
        pickup.store.clone(),
        producer.clone(),
        fast_dispatcher_config("flow"),
    ));
    let cancel = CancellationToken::new();
    let running = {
        let dispatcher = dispatcher.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { dispatcher.dispatch(cancel).await })
    };

    let delivered = eventually(Duration::from_secs(2), || producer.messages().len() == 3).await;
    cancel.cancel();
    let outcome = running.await.unwrap();
    assert!(delivered);
    assert!(outcome.unwrap_err().is_cancelled());

    let messages = producer.messages();
    assert!(messages.iter().all(|m| m.topic == "pvz.events-log"));
    let issued = messages
        .iter()
        .find(|m| m.payload["event_type"] == "order_issued")
        .unwrap();
    assert_eq!(issued.key, "11");
    assert_eq!(issued.payload["actor"]["type"], "client");
    assert_eq!(issued.payload["actor"]["id"], 3);
    assert_eq!(issued.payload["source"], "pvz-api");
    assert_eq!(issued.payload["order"]["order_id"], 11);

    let counts = pickup.store.count_by_status().await.unwrap();
    assert_eq!(counts.get(OutboxStatus::Completed), 3);
    assert_eq!(counts.total(), 3);

    pickup.pool.shutdown().await;
}
