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

//! Duplicate call suppression keyed by string.
//!
//! The first caller for a key becomes the leader and runs the work; callers
//! arriving while it runs subscribe to a [`watch`] channel and receive a
//! clone of the leader's result. If the leader is dropped before finishing
//! (cancelled or panicked), its channel closes and the waiting callers race
//! to become the next leader.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::trace;

type Shared = Arc<dyn Any + Send + Sync>;
type Slot = watch::Receiver<Option<Shared>>;

/// A group of in-flight calls, one per key.
#[derive(Default)]
pub struct SingleFlight {
    calls: Mutex<HashMap<String, Slot>>,
}

/// Removes the leader's entry when the leader finishes or is dropped.
struct LeaderGuard<'a> {
    calls: &'a Mutex<HashMap<String, Slot>>,
    key: &'a str,
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        self.calls.lock().remove(self.key);
    }
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a call in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    /// Runs `work` unless a call for `key` is already in flight, in which
    /// case the caller waits for and shares that call's result.
    ///
    /// Callers that join a flight started with a different result type run
    /// `work` themselves.
    pub async fn run<T, F, Fut>(&self, key: &str, work: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let sender = loop {
            let slot = {
                let mut calls = self.calls.lock();
                match calls.get(key) {
                    Some(slot) => slot.clone(),
                    None => {
                        let (sender, slot) = watch::channel(None);
                        calls.insert(key.to_owned(), slot);
                        break sender;
                    }
                }
            };

            trace!(key, "joining in-flight call");
            match Self::wait(slot).await {
                Some(shared) => match shared.downcast_ref::<T>() {
                    Some(value) => return value.clone(),
                    None => return work().await,
                },
                // Leader went away without a result; try to take over.
                None => continue,
            }
        };

        let guard = LeaderGuard { calls: &self.calls, key };
        let value = work().await;
        let shared: Shared = Arc::new(value.clone());
        sender.send_replace(Some(shared));
        drop(guard);
        value
    }

    async fn wait(mut slot: Slot) -> Option<Shared> {
        match slot.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        }
    }
}
