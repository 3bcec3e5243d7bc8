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

//! # parcelpoint
//!
//! Core of a pickup-point order service. Orders are accepted from couriers,
//! issued to clients, taken back as returns and handed back to couriers.
//! Every state change is recorded together with an outbox event, which a
//! separate dispatcher publishes to a message broker.
//!
//! This crate provides:
//! - [`pool`] - bounded, resizable worker pool used for batch operations
//! - [`cache`] - sharded in-memory cache with TTL or LRU eviction and
//!   single-flight loading
//! - [`outbox`] - outbox persistence and broker ports plus the dispatcher
//! - [`orders`] - order service, validation rules and cached read handlers
//! - [`memory`] - in-memory order store and outbox repository
//! - [`config`] and [`logging`] - TOML configuration and tracing setup
//!
//! ## Features
//!
//! - `postgres` - PostgreSQL outbox repository (diesel + deadpool-diesel)
//!   with embedded migrations
//! - `kafka` - Kafka producer (rdkafka)
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use parcelpoint::cache::{CacheConfig, ShardedCache};
//! use parcelpoint::clock::SystemClock;
//! use parcelpoint::memory::MemoryStore;
//! use parcelpoint::orders::{OrderHandlers, OrderService, ProcessAction};
//! use parcelpoint::pool::{DefaultWorkerPool, WorkerPoolConfig};
//!
//! let store = Arc::new(MemoryStore::new());
//! let pool = Arc::new(DefaultWorkerPool::new(WorkerPoolConfig::default()));
//! let service = OrderService::new(store, pool, Arc::new(SystemClock));
//! let handlers = OrderHandlers::new(service, ShardedCache::start(CacheConfig::default()));
//!
//! let report = handlers.process_orders(ProcessAction::Issue, 17, &[101, 102]).await;
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod memory;
pub mod orders;
pub mod outbox;
pub mod pool;

pub use error::{
    BrokerError, CacheError, ConfigError, DispatchError, LoggingError, OrderError, PoolError,
    RepositoryError,
};
