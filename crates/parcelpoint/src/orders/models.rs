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

//! Order domain types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OrderError;

/// Page returned when a filter does not name one.
pub const DEFAULT_PAGE: usize = 1;
/// Page size used when a filter does not name one.
pub const DEFAULT_LIMIT: usize = 20;

/// Where an order is in its lifecycle. Serialized as its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i16", try_from = "i16")]
#[repr(i16)]
pub enum OrderStatus {
    Accepted = 1,
    Returned = 2,
    Issued = 3,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::Returned => "RETURNED",
            OrderStatus::Issued => "ISSUED",
        }
    }
}

impl From<OrderStatus> for i16 {
    fn from(status: OrderStatus) -> Self {
        status as i16
    }
}

impl TryFrom<i16> for OrderStatus {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(OrderStatus::Accepted),
            2 => Ok(OrderStatus::Returned),
            3 => Ok(OrderStatus::Issued),
            other => Err(format!("Unknown order status {}", other)),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Packaging an order was accepted with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackageType {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "bag")]
    Bag,
    #[serde(rename = "box")]
    Box,
    #[serde(rename = "film")]
    Film,
    #[serde(rename = "bag+film")]
    BagFilm,
    #[serde(rename = "box+film")]
    BoxFilm,
}

/// An order held at the pickup point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: i64,
    pub user_id: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    /// End of the storage period.
    pub expires_at: DateTime<Utc>,
    pub updated_status_at: DateTime<Utc>,
    pub package: PackageType,
    pub weight: f64,
    pub price: f64,
}

/// Lifecycle events recorded in an order's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryEvent {
    Accepted,
    Issued,
    ReturnedByClient,
    ReturnedToWarehouse,
}

impl HistoryEvent {
    /// Name used for the `event_type` field of published events.
    pub fn event_type(self) -> &'static str {
        match self {
            HistoryEvent::Accepted => "order_accepted",
            HistoryEvent::Issued => "order_issued",
            HistoryEvent::ReturnedByClient => "order_returned_by_client",
            HistoryEvent::ReturnedToWarehouse => "order_returned_to_courier",
        }
    }
}

/// One entry of an order's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub order_id: i64,
    pub event: HistoryEvent,
    pub timestamp: DateTime<Utc>,
}

/// Input for accepting an order from a courier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptOrderRequest {
    pub order_id: i64,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub package: PackageType,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub price: f64,
}

/// Filter and pagination for order listings.
///
/// `last` overrides paging and returns the `last` most recently created
/// matching orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrdersFilter {
    pub user_id: Option<i64>,
    /// Only orders still physically at the pickup point (not issued).
    pub in_pvz: Option<bool>,
    /// Only orders created after this one.
    pub last_id: Option<i64>,
    pub status: Option<OrderStatus>,
    pub page: usize,
    pub limit: usize,
    pub last: Option<usize>,
}

impl Default for OrdersFilter {
    fn default() -> Self {
        Self {
            user_id: None,
            in_pvz: None,
            last_id: None,
            status: None,
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            last: None,
        }
    }
}

impl OrdersFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn in_pvz(mut self, in_pvz: bool) -> Self {
        self.in_pvz = Some(in_pvz);
        self
    }

    pub fn after(mut self, order_id: i64) -> Self {
        self.last_id = Some(order_id);
        self
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn page(mut self, page: usize, limit: usize) -> Self {
        self.page = page;
        self.limit = limit;
        self
    }

    pub fn last(mut self, last: usize) -> Self {
        self.last = Some(last);
        self
    }

    /// True when `order` passes every predicate of the filter. `last_id` is
    /// resolved by the store and not checked here.
    pub fn matches(&self, order: &Order) -> bool {
        self.user_id.map_or(true, |user| order.user_id == user)
            && (self.in_pvz != Some(true) || order.status != OrderStatus::Issued)
            && self.status.map_or(true, |status| order.status == status)
    }

    /// Zero-based offset of the requested page.
    pub fn offset(&self) -> usize {
        self.page.max(1).saturating_sub(1).saturating_mul(self.limit)
    }
}

/// One page of an order listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrdersPage {
    pub orders: Vec<Order>,
    /// Id of the last order on the page, for cursor-style scrolling.
    pub next_id: Option<i64>,
    /// Number of matching orders, or the page size when `last` was used.
    pub total: usize,
}

/// Outcome of one item of a batch operation.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntryResult {
    pub order_id: i64,
    pub result: Result<(), OrderError>,
}

impl BatchEntryResult {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Batch results split into processed ids and failures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessReport {
    pub processed: Vec<i64>,
    pub failed: Vec<(i64, OrderError)>,
}

impl From<Vec<BatchEntryResult>> for ProcessReport {
    fn from(results: Vec<BatchEntryResult>) -> Self {
        let mut report = ProcessReport::default();
        for entry in results {
            match entry.result {
                Ok(()) => report.processed.push(entry.order_id),
                Err(err) => report.failed.push((entry.order_id, err)),
            }
        }
        report
    }
}
