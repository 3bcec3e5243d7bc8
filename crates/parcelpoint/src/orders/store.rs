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

//! Persistence port for orders and their history.

use async_trait::async_trait;

use super::models::{HistoryEntry, Order, OrderStatus, OrdersFilter};
use crate::error::RepositoryError;
use crate::outbox::NewOutboxEvent;

/// The order row change carried by an [`OrderMutation`].
#[derive(Debug, Clone, PartialEq)]
pub enum OrderChange {
    /// Insert a new order; fails with `Conflict` if the id exists.
    Insert(Order),
    /// Replace an existing order whose stored status is still `expected`.
    /// Fails with `NotFound` if it is missing and `Stale` if its status moved.
    Update { order: Order, expected: OrderStatus },
    /// Delete an order; fails with `NotFound` if it is missing.
    Delete(i64),
}

impl OrderChange {
    pub fn order_id(&self) -> i64 {
        match self {
            OrderChange::Insert(order) | OrderChange::Update { order, .. } => order.order_id,
            OrderChange::Delete(order_id) => *order_id,
        }
    }
}

/// A state change with the outbox event and history entry describing it.
///
/// Stores apply all three parts atomically or none of them.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderMutation {
    pub change: OrderChange,
    pub event: NewOutboxEvent,
    pub history: HistoryEntry,
}

/// Storage operations used by the order service.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn load(&self, order_id: i64) -> Result<Option<Order>, RepositoryError>;

    /// Returns the orders selected by `filter` and the number of orders
    /// matching it before pagination.
    async fn list(&self, filter: &OrdersFilter) -> Result<(Vec<Order>, usize), RepositoryError>;

    /// History of one order, or of all orders when `order_id` is `None`,
    /// oldest first.
    async fn history(&self, order_id: Option<i64>) -> Result<Vec<HistoryEntry>, RepositoryError>;

    /// Applies the order change, appends the outbox event and records the
    /// history entry in one transaction.
    async fn apply(&self, mutation: OrderMutation) -> Result<(), RepositoryError>;
}
