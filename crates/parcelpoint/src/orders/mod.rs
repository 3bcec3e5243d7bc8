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

//! Order lifecycle at a pickup point.
//!
//! [`OrderService`] validates and applies state changes, fanning batch
//! operations out over the worker pool. Each successful change is written
//! together with its outbox event and history entry through a single
//! [`OrderStore::apply`]. [`OrderHandlers`] sits in front of the service
//! and caches the read paths.

mod events;
mod handlers;
mod models;
mod service;
mod store;
mod validator;

pub use events::{Actor, ActorType, OrderEvent, EVENT_SOURCE};
pub use handlers::{
    list_orders_key, order_history_key, CachedResponse, OrderHandlers, ProcessAction,
    ResponseCache, HISTORY_CACHE_TTL, LIST_CACHE_TTL,
};
pub use models::{
    AcceptOrderRequest, BatchEntryResult, HistoryEntry, HistoryEvent, Order, OrderStatus,
    OrdersFilter, OrdersPage, PackageType, ProcessReport, DEFAULT_LIMIT, DEFAULT_PAGE,
};
pub use service::OrderService;
pub use store::{OrderChange, OrderMutation, OrderStore};
pub use validator::{OrderValidator, RETURN_WINDOW_HOURS};
