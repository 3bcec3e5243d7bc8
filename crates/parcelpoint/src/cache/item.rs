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

//! Cache entry and TTL reporting types.

use std::time::{Duration, Instant};

/// A value stored in a shard together with its expiration deadline.
#[derive(Debug, Clone)]
pub struct CachedItem<V> {
    pub value: V,
    /// `None` means the entry never expires by time.
    pub expires_at: Option<Instant>,
}

impl<V> CachedItem<V> {
    /// Builds an item that expires `ttl` from now; a zero `ttl` never expires.
    pub fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: deadline(ttl),
        }
    }

    pub fn is_expired(&self) -> bool {
        is_past(self.expires_at)
    }
}

pub(crate) fn deadline(ttl: Duration) -> Option<Instant> {
    if ttl.is_zero() {
        None
    } else {
        Instant::now().checked_add(ttl)
    }
}

pub(crate) fn is_past(expires_at: Option<Instant>) -> bool {
    expires_at.is_some_and(|at| Instant::now() > at)
}

/// Remaining lifetime of a key as reported by
/// [`ShardedCache::ttl`](super::ShardedCache::ttl).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTtl {
    /// The key is not in the cache.
    Missing,
    /// The key has no expiration.
    NoExpiry,
    /// The key is still stored but its deadline has passed.
    Expired,
    Remaining(Duration),
}

impl CacheTtl {
    /// Numeric form: `-1` when missing, `0` without a deadline or once
    /// expired, otherwise the remaining milliseconds.
    pub fn as_millis(&self) -> i64 {
        match self {
            CacheTtl::Missing => -1,
            CacheTtl::NoExpiry | CacheTtl::Expired => 0,
            CacheTtl::Remaining(left) => i64::try_from(left.as_millis()).unwrap_or(i64::MAX),
        }
    }
}
