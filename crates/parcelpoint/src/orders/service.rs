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

//! Order service: validation, state changes and batch fan-out.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::events::OrderEvent;
use super::models::{
    AcceptOrderRequest, BatchEntryResult, HistoryEntry, HistoryEvent, Order, OrderStatus,
    OrdersFilter, OrdersPage,
};
use super::store::{OrderChange, OrderMutation, OrderStore};
use super::validator::OrderValidator;
use crate::clock::Clock;
use crate::error::{OrderError, RepositoryError};
use crate::outbox::{generate_event_id, NewOutboxEvent};
use crate::pool::WorkerPool;

/// Executes order operations against an [`OrderStore`].
///
/// Batch operations submit one worker pool task per item and return one
/// result per input, in input order. Every successful state change writes
/// the order, its outbox event and its history entry in a single
/// [`OrderStore::apply`] call.
#[derive(Clone)]
pub struct OrderService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    store: Arc<dyn OrderStore>,
    pool: Arc<dyn WorkerPool>,
    clock: Arc<dyn Clock>,
    validator: OrderValidator,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        pool: Arc<dyn WorkerPool>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let validator = OrderValidator::new(clock.clone());
        Self {
            inner: Arc::new(ServiceInner {
                store,
                pool,
                clock,
                validator,
            }),
        }
    }

    /// Accepts a single order from a courier.
    pub async fn accept_order(&self, req: AcceptOrderRequest) -> Result<Order, OrderError> {
        self.inner.accept(req).await
    }

    /// Issues the listed orders to `user_id`.
    pub async fn issue_orders(&self, user_id: i64, order_ids: &[i64]) -> Vec<BatchEntryResult> {
        self.run_batch(
            order_ids.to_vec(),
            |id: &i64| *id,
            move |inner: Arc<ServiceInner>, id: i64| async move {
                inner
                    .transition(id, HistoryEvent::Issued, OrderStatus::Issued, |v, order| {
                        v.validate_issue(order, user_id)
                    })
                    .await
            },
        )
        .await
    }

    /// Takes the listed orders back from `user_id`.
    pub async fn create_client_returns(
        &self,
        user_id: i64,
        order_ids: &[i64],
    ) -> Vec<BatchEntryResult> {
        self.run_batch(
            order_ids.to_vec(),
            |id: &i64| *id,
            move |inner: Arc<ServiceInner>, id: i64| async move {
                inner
                    .transition(
                        id,
                        HistoryEvent::ReturnedByClient,
                        OrderStatus::Returned,
                        |v, order| v.validate_client_return(order, user_id),
                    )
                    .await
            },
        )
        .await
    }

    /// Accepts every request as if through [`accept_order`](Self::accept_order).
    pub async fn import_orders(&self, requests: Vec<AcceptOrderRequest>) -> Vec<BatchEntryResult> {
        self.run_batch(
            requests,
            |req: &AcceptOrderRequest| req.order_id,
            |inner: Arc<ServiceInner>, req: AcceptOrderRequest| async move {
                inner.accept(req).await.map(|_| ())
            },
        )
        .await
    }

    /// Hands an order back to the courier and removes it from the point.
    pub async fn return_to_courier(&self, order_id: i64) -> Result<(), OrderError> {
        self.inner.return_to_courier(order_id).await
    }

    pub async fn list_orders(&self, filter: &OrdersFilter) -> Result<OrdersPage, OrderError> {
        let (mut orders, mut total) = self.inner.store.list(filter).await?;
        if let Some(last) = filter.last {
            if orders.len() > last {
                orders.drain(..orders.len() - last);
            }
            total = orders.len();
        }
        let next_id = orders.last().map(|order| order.order_id);
        Ok(OrdersPage {
            orders,
            next_id,
            total,
        })
    }

    pub async fn order_history(&self, order_id: i64) -> Result<Vec<HistoryEntry>, OrderError> {
        Ok(self.inner.store.history(Some(order_id)).await?)
    }

    /// Runs `op` for every item on the worker pool and gathers the results
    /// by input position. Items whose task never reports back (dropped by a
    /// shut-down pool or panicked) are `Unavailable`.
    async fn run_batch<I, K, F, Fut>(
        &self,
        items: Vec<I>,
        order_id_of: K,
        op: F,
    ) -> Vec<BatchEntryResult>
    where
        I: Send + 'static,
        K: Fn(&I) -> i64,
        F: Fn(Arc<ServiceInner>, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), OrderError>> + Send + 'static,
    {
        let order_ids: Vec<i64> = items.iter().map(&order_id_of).collect();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let op = Arc::new(op);

        for (index, item) in items.into_iter().enumerate() {
            let tx = tx.clone();
            let inner = self.inner.clone();
            let op = op.clone();
            self.inner
                .pool
                .submit(Box::pin(async move {
                    let result = op(inner, item).await;
                    let _ = tx.send((index, result));
                }))
                .await;
        }
        drop(tx);

        let mut slots: Vec<Option<Result<(), OrderError>>> = vec![None; order_ids.len()];
        while let Some((index, result)) = rx.recv().await {
            slots[index] = Some(result);
        }

        let results: Vec<BatchEntryResult> = order_ids
            .into_iter()
            .zip(slots)
            .map(|(order_id, slot)| BatchEntryResult {
                order_id,
                result: slot.unwrap_or(Err(OrderError::Unavailable)),
            })
            .collect();

        let failed = results.iter().filter(|entry| !entry.is_ok()).count();
        debug!(total = results.len(), failed, "Batch processed");
        results
    }
}

impl ServiceInner {
    async fn accept(&self, req: AcceptOrderRequest) -> Result<Order, OrderError> {
        let existing = self.store.load(req.order_id).await?;
        self.validator.validate_accept(existing.as_ref(), &req)?;

        let now = self.clock.now();
        let order = Order {
            order_id: req.order_id,
            user_id: req.user_id,
            status: OrderStatus::Accepted,
            created_at: now,
            expires_at: req.expires_at,
            updated_status_at: now,
            package: req.package,
            weight: req.weight,
            price: req.price,
        };

        // A concurrent accept of the same id surfaces as a conflict here.
        self.record(OrderChange::Insert(order.clone()), &order, HistoryEvent::Accepted)
            .await?;

        info!(order_id = order.order_id, user_id = order.user_id, "Order accepted");
        Ok(order)
    }

    /// Loads an order, checks it with `validate`, then moves it to `status`.
    async fn transition<V>(
        &self,
        order_id: i64,
        event: HistoryEvent,
        status: OrderStatus,
        validate: V,
    ) -> Result<(), OrderError>
    where
        V: FnOnce(&OrderValidator, &Order) -> Result<(), OrderError>,
    {
        let mut order = self
            .store
            .load(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))?;
        validate(&self.validator, &order)?;

        let expected = order.status;
        order.status = status;
        order.updated_status_at = self.clock.now();

        self.record(
            OrderChange::Update {
                order: order.clone(),
                expected,
            },
            &order,
            event,
        )
        .await?;
        info!(order_id, event = event.event_type(), "Order status changed");
        Ok(())
    }

    async fn return_to_courier(&self, order_id: i64) -> Result<(), OrderError> {
        let order = self
            .store
            .load(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))?;
        self.validator.validate_return_to_courier(&order)?;

        self.record(
            OrderChange::Delete(order_id),
            &order,
            HistoryEvent::ReturnedToWarehouse,
        )
        .await?;
        info!(order_id, "Order returned to courier");
        Ok(())
    }

    /// Applies `change` together with its outbox event and history entry.
    async fn record(
        &self,
        change: OrderChange,
        order: &Order,
        event: HistoryEvent,
    ) -> Result<(), OrderError> {
        let now = self.clock.now();
        let event_id = generate_event_id();
        let payload = OrderEvent::new(event_id, event, order.clone(), now).to_json()?;

        let mutation = OrderMutation {
            change,
            event: NewOutboxEvent::with_id(event_id, order.order_id, payload),
            history: HistoryEntry {
                order_id: order.order_id,
                event,
                timestamp: now,
            },
        };

        self.store.apply(mutation).await.map_err(|err| {
            warn!(order_id = order.order_id, error = %err, "Failed to apply order change");
            match err {
                RepositoryError::Conflict(_) => OrderError::AlreadyExists(order.order_id),
                RepositoryError::NotFound(_) => OrderError::NotFound(order.order_id),
                RepositoryError::Stale(reason) => OrderError::Validation(reason),
                other => OrderError::from(other),
            }
        })
    }
}
