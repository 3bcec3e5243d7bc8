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

//! Cached read handlers and cache-invalidating write handlers.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::models::{
    AcceptOrderRequest, BatchEntryResult, HistoryEntry, Order, OrdersFilter, OrdersPage,
    ProcessReport,
};
use super::service::OrderService;
use crate::cache::ShardedCache;
use crate::error::OrderError;

/// How long a listing page stays cached.
pub const LIST_CACHE_TTL: Duration = Duration::from_secs(30);
/// How long an order's history stays cached.
pub const HISTORY_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

const LIST_KEY_PATTERN: &str = "^ListOrders:";

/// A cached handler response.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedResponse {
    Orders(OrdersPage),
    History(Vec<HistoryEntry>),
}

/// Cache used for handler responses.
pub type ResponseCache = ShardedCache<String, CachedResponse>;

/// Cache key for a listing request. Every filter field is part of the key;
/// unset fields render as `-`.
pub fn list_orders_key(filter: &OrdersFilter) -> String {
    format!(
        "ListOrders:user={};inPvz={};status={};lastId={};last={};page={};limit={}",
        key_part(filter.user_id),
        key_part(filter.in_pvz),
        key_part(filter.status),
        key_part(filter.last_id),
        key_part(filter.last),
        filter.page,
        filter.limit
    )
}

fn key_part<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Cache key for an order's history.
pub fn order_history_key(order_id: i64) -> String {
    format!("OrderHistory:{}", order_id)
}

/// Which batch operation [`OrderHandlers::process_orders`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessAction {
    Issue,
    Return,
}

/// Entry points for the transport layer.
///
/// Reads go through the response cache with single-flight loading; writes
/// invalidate every listing page and the history of each order they touched.
#[derive(Clone)]
pub struct OrderHandlers {
    service: OrderService,
    cache: Arc<ResponseCache>,
}

impl OrderHandlers {
    pub fn new(service: OrderService, cache: Arc<ResponseCache>) -> Self {
        Self { service, cache }
    }

    pub fn service(&self) -> &OrderService {
        &self.service
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub async fn list_orders(&self, filter: OrdersFilter) -> Result<OrdersPage, OrderError> {
        let key = list_orders_key(&filter);
        let service = self.service.clone();
        let cached = self
            .cache
            .get_or_set(key, LIST_CACHE_TTL, || async move {
                service
                    .list_orders(&filter)
                    .await
                    .map(CachedResponse::Orders)
            })
            .await?;

        match cached {
            CachedResponse::Orders(page) => Ok(page),
            CachedResponse::History(_) => Err(OrderError::Storage(
                "unexpected cached response for order listing".to_string(),
            )),
        }
    }

    pub async fn order_history(&self, order_id: i64) -> Result<Vec<HistoryEntry>, OrderError> {
        let service = self.service.clone();
        let cached = self
            .cache
            .get_or_set(order_history_key(order_id), HISTORY_CACHE_TTL, || async move {
                service
                    .order_history(order_id)
                    .await
                    .map(CachedResponse::History)
            })
            .await?;

        match cached {
            CachedResponse::History(entries) => Ok(entries),
            CachedResponse::Orders(_) => Err(OrderError::Storage(
                "unexpected cached response for order history".to_string(),
            )),
        }
    }

    pub async fn accept_order(&self, req: AcceptOrderRequest) -> Result<Order, OrderError> {
        let order = self.service.accept_order(req).await?;
        self.invalidate_orders([order.order_id]);
        Ok(order)
    }

    pub async fn process_orders(
        &self,
        action: ProcessAction,
        user_id: i64,
        order_ids: &[i64],
    ) -> ProcessReport {
        let results = match action {
            ProcessAction::Issue => self.service.issue_orders(user_id, order_ids).await,
            ProcessAction::Return => self.service.create_client_returns(user_id, order_ids).await,
        };
        self.invalidate_processed(&results);
        ProcessReport::from(results)
    }

    pub async fn import_orders(&self, requests: Vec<AcceptOrderRequest>) -> ProcessReport {
        let results = self.service.import_orders(requests).await;
        self.invalidate_processed(&results);
        ProcessReport::from(results)
    }

    pub async fn return_to_courier(&self, order_id: i64) -> Result<(), OrderError> {
        self.service.return_to_courier(order_id).await?;
        self.invalidate_orders([order_id]);
        Ok(())
    }

    fn invalidate_processed(&self, results: &[BatchEntryResult]) {
        self.invalidate_orders(
            results
                .iter()
                .filter(|entry| entry.is_ok())
                .map(|entry| entry.order_id),
        );
    }

    fn invalidate_orders(&self, order_ids: impl IntoIterator<Item = i64>) {
        let mut touched = false;
        for order_id in order_ids {
            self.cache.invalidate(&order_history_key(order_id));
            touched = true;
        }
        if !touched {
            return;
        }
        if let Err(err) = self.cache.invalidate_pattern(LIST_KEY_PATTERN) {
            warn!(error = %err, "Failed to invalidate cached order listings");
        }
    }
}
