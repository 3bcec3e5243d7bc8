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

//! Sharded in-process cache with pluggable eviction.
//!
//! [`ShardedCache`] splits its entries over a power-of-two number of
//! shards, each behind its own read/write lock. An [`EvictionPolicy`]
//! decides what leaves the cache: [`TtlPolicy`] expires entries lazily
//! and through a background purge, [`LruPolicy`] bounds the number of
//! keys.
//!
//! # Example
//!
//! ```rust,ignore
//! use parcelpoint::cache::{CacheConfig, ShardedCache};
//!
//! let cache = ShardedCache::<String, Vec<Order>>::start(
//!     CacheConfig::builder().shard_count(32).metrics_name("orders").build(),
//! );
//!
//! let orders = cache
//!     .get_or_set(key, Duration::from_secs(30), || store.list(filter))
//!     .await?;
//! ```

pub mod config;
pub mod item;
mod metrics;
pub mod policy;
mod sharded;
mod single_flight;

pub use config::{CacheConfig, CacheConfigBuilder, PolicyKind};
pub use item::{CacheTtl, CachedItem};
pub use metrics::CacheStats;
pub use policy::{EvictionPolicy, LruPolicy, TtlPolicy};
pub use sharded::ShardedCache;
pub use single_flight::SingleFlight;
