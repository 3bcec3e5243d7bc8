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

//! In-memory implementation of the order and outbox ports.
//!
//! [`MemoryStore`] keeps orders, history and outbox events behind a single
//! mutex, so an [`OrderMutation`] is applied atomically and outbox claims
//! are exclusive across concurrent dispatchers sharing the store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::error::RepositoryError;
use crate::orders::{HistoryEntry, Order, OrderChange, OrderMutation, OrderStore, OrdersFilter};
use crate::outbox::{
    NewOutboxEvent, OutboxCounts, OutboxEvent, OutboxRepository, OutboxStatus, RedriveScope,
};

#[derive(Default)]
struct State {
    orders: HashMap<i64, Order>,
    history: Vec<HistoryEntry>,
    /// Outbox events in insertion order.
    outbox: Vec<OutboxEvent>,
    outbox_index: HashMap<i64, usize>,
}

impl State {
    fn push_event(&mut self, event: OutboxEvent) -> Result<(), RepositoryError> {
        if self.outbox_index.contains_key(&event.event_id) {
            return Err(RepositoryError::Conflict(format!(
                "outbox event {}",
                event.event_id
            )));
        }
        self.outbox_index.insert(event.event_id, self.outbox.len());
        self.outbox.push(event);
        Ok(())
    }

    fn event_mut(&mut self, event_id: i64) -> Result<&mut OutboxEvent, RepositoryError> {
        self.outbox_index
            .get(&event_id)
            .and_then(|&index| self.outbox.get_mut(index))
            .ok_or_else(|| RepositoryError::NotFound(format!("outbox event {}", event_id)))
    }

    /// Events ordered oldest first, ties broken by insertion order.
    fn ordered_events(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.outbox.len()).collect();
        indices.sort_by_key(|&index| self.outbox[index].created_at);
        indices
    }
}

/// Thread-safe in-memory store for orders, history and outbox events.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Uses `clock` for outbox timestamps and retry-delay checks.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
        }
    }

    /// Snapshot of every outbox event in insertion order.
    pub fn outbox_events(&self) -> Vec<OutboxEvent> {
        self.state.lock().outbox.clone()
    }

    pub fn order_count(&self) -> usize {
        self.state.lock().orders.len()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn load(&self, order_id: i64) -> Result<Option<Order>, RepositoryError> {
        Ok(self.state.lock().orders.get(&order_id).cloned())
    }

    async fn list(&self, filter: &OrdersFilter) -> Result<(Vec<Order>, usize), RepositoryError> {
        let state = self.state.lock();
        let after = match filter.last_id {
            Some(last_id) => Some(
                state
                    .orders
                    .get(&last_id)
                    .map(|order| (order.created_at, order.order_id))
                    .ok_or_else(|| RepositoryError::NotFound(format!("order {}", last_id)))?,
            ),
            None => None,
        };

        let mut matching: Vec<&Order> = state
            .orders
            .values()
            .filter(|order| filter.matches(order))
            .filter(|order| after.map_or(true, |cursor| (order.created_at, order.order_id) > cursor))
            .collect();
        matching.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.order_id.cmp(&b.order_id))
        });
        let total = matching.len();

        let page: Vec<Order> = match filter.last {
            // Most recent `last` orders, newest first.
            Some(last) => matching.iter().rev().take(last).map(|o| (*o).clone()).collect(),
            None => matching
                .iter()
                .skip(filter.offset())
                .take(filter.limit)
                .map(|o| (*o).clone())
                .collect(),
        };
        Ok((page, total))
    }

    async fn history(&self, order_id: Option<i64>) -> Result<Vec<HistoryEntry>, RepositoryError> {
        let state = self.state.lock();
        let mut entries: Vec<HistoryEntry> = state
            .history
            .iter()
            .filter(|entry| order_id.map_or(true, |id| entry.order_id == id))
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.timestamp);
        Ok(entries)
    }

    async fn apply(&self, mutation: OrderMutation) -> Result<(), RepositoryError> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        // Validate everything before touching state so a failure leaves no
        // partial write behind.
        let order_id = mutation.change.order_id();
        let exists = state.orders.contains_key(&order_id);
        match &mutation.change {
            OrderChange::Insert(_) if exists => {
                return Err(RepositoryError::Conflict(format!(
                    "order {} already exists",
                    order_id
                )))
            }
            OrderChange::Update { .. } | OrderChange::Delete(_) if !exists => {
                return Err(RepositoryError::NotFound(format!("order {}", order_id)))
            }
            OrderChange::Update { expected, .. }
                if state.orders.get(&order_id).map(|o| o.status) != Some(*expected) =>
            {
                return Err(RepositoryError::Stale(format!(
                    "order {} is no longer {}",
                    order_id, expected
                )))
            }
            _ => {}
        }
        if state.outbox_index.contains_key(&mutation.event.event_id) {
            return Err(RepositoryError::Conflict(format!(
                "outbox event {}",
                mutation.event.event_id
            )));
        }

        match mutation.change {
            OrderChange::Insert(order) | OrderChange::Update { order, .. } => {
                state.orders.insert(order.order_id, order);
            }
            OrderChange::Delete(order_id) => {
                state.orders.remove(&order_id);
            }
        }
        state.push_event(OutboxEvent::from_new(mutation.event, now))?;
        state.history.push(mutation.history);
        Ok(())
    }
}

#[async_trait]
impl OutboxRepository for MemoryStore {
    async fn create(&self, event: NewOutboxEvent) -> Result<OutboxEvent, RepositoryError> {
        let event = OutboxEvent::from_new(event, self.clock.now());
        self.state.lock().push_event(event.clone())?;
        Ok(event)
    }

    async fn claim_batch(
        &self,
        limit: usize,
        retry_delay: Duration,
        claimant: &str,
    ) -> Result<Vec<OutboxEvent>, RepositoryError> {
        let now = self.clock.now();
        let cutoff = chrono::Duration::from_std(retry_delay)
            .ok()
            .and_then(|delay| now.checked_sub_signed(delay));

        let mut state = self.state.lock();
        let mut claimed = Vec::new();
        for index in state.ordered_events() {
            if claimed.len() >= limit {
                break;
            }
            let event = &mut state.outbox[index];
            let retry_due = match (event.last_attempt_at, cutoff) {
                (Some(last), Some(cutoff)) => last <= cutoff,
                _ => false,
            };
            let claimable = event.status == OutboxStatus::Created
                || (event.status == OutboxStatus::Processing && retry_due);
            if !claimable {
                continue;
            }
            event.status = OutboxStatus::Processing;
            event.attempts += 1;
            event.last_attempt_at = Some(now);
            event.claimed_by = Some(claimant.to_string());
            claimed.push(event.clone());
        }
        Ok(claimed)
    }

    async fn fetch_processing(
        &self,
        limit: usize,
        claimant: &str,
    ) -> Result<Vec<OutboxEvent>, RepositoryError> {
        let state = self.state.lock();
        let events = state
            .ordered_events()
            .into_iter()
            .map(|index| &state.outbox[index])
            .filter(|event| {
                event.status == OutboxStatus::Processing
                    && event.claimed_by.as_deref() == Some(claimant)
            })
            .take(limit)
            .cloned()
            .collect();
        Ok(events)
    }

    async fn set_completed(
        &self,
        event_id: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        let event = state.event_mut(event_id)?;
        event.status = OutboxStatus::Completed;
        event.sent_at = Some(sent_at);
        Ok(())
    }

    async fn set_failed(&self, event_id: i64, reason: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        let event = state.event_mut(event_id)?;
        event.status = OutboxStatus::Failed;
        event.error = Some(reason.to_string());
        event.claimed_by = None;
        Ok(())
    }

    async fn update_error(&self, event_id: i64, error: &str) -> Result<(), RepositoryError> {
        let mut state = self.state.lock();
        let event = state.event_mut(event_id)?;
        event.error = Some(error.to_string());
        event.claimed_by = None;
        Ok(())
    }

    async fn find(&self, event_id: i64) -> Result<Option<OutboxEvent>, RepositoryError> {
        let state = self.state.lock();
        let event = state
            .outbox_index
            .get(&event_id)
            .map(|&index| state.outbox[index].clone());
        Ok(event)
    }

    async fn list_by_status(
        &self,
        status: OutboxStatus,
        limit: usize,
    ) -> Result<Vec<OutboxEvent>, RepositoryError> {
        let state = self.state.lock();
        let events = state
            .ordered_events()
            .into_iter()
            .map(|index| &state.outbox[index])
            .filter(|event| event.status == status)
            .take(limit)
            .cloned()
            .collect();
        Ok(events)
    }

    async fn count_by_status(&self) -> Result<OutboxCounts, RepositoryError> {
        let state = self.state.lock();
        let mut counts = OutboxCounts::default();
        for event in &state.outbox {
            counts.add(event.status, 1);
        }
        Ok(counts)
    }

    async fn redrive_failed(&self, scope: RedriveScope) -> Result<usize, RepositoryError> {
        let mut state = self.state.lock();
        let mut reset = 0;
        for event in state.outbox.iter_mut() {
            if event.status == OutboxStatus::Failed && scope.includes(event.event_id) {
                event.status = OutboxStatus::Created;
                event.attempts = 0;
                event.error = None;
                event.last_attempt_at = None;
                event.claimed_by = None;
                reset += 1;
            }
        }
        Ok(reset)
    }
}
