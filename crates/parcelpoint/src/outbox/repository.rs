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

//! Persistence port for outbox events.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::model::{NewOutboxEvent, OutboxCounts, OutboxEvent, OutboxStatus, RedriveScope};
use crate::error::RepositoryError;

/// Storage operations used by the outbox dispatcher and the operator CLI.
///
/// Dispatcher instances coordinate only through the persisted `status`,
/// `attempts`, `last_attempt_at` and `claimed_by` fields, so every method
/// must be safe to call concurrently from several processes.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Persists a new event in the `Created` state.
    async fn create(&self, event: NewOutboxEvent) -> Result<OutboxEvent, RepositoryError>;

    /// Atomically claims up to `limit` deliverable events for `claimant`.
    ///
    /// An event is deliverable when it is `Created`, or `Processing` with its
    /// last attempt at least `retry_delay` ago. Claimed events move to
    /// `Processing` with `attempts + 1`, `last_attempt_at = now` and
    /// `claimed_by = claimant`. Oldest events are claimed first and rows held
    /// by a concurrent claim are skipped.
    async fn claim_batch(
        &self,
        limit: usize,
        retry_delay: Duration,
        claimant: &str,
    ) -> Result<Vec<OutboxEvent>, RepositoryError>;

    /// Returns up to `limit` `Processing` events currently claimed by
    /// `claimant`, oldest first.
    async fn fetch_processing(
        &self,
        limit: usize,
        claimant: &str,
    ) -> Result<Vec<OutboxEvent>, RepositoryError>;

    /// Marks an event as delivered.
    async fn set_completed(
        &self,
        event_id: i64,
        sent_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Marks an event as permanently failed and releases its claim.
    async fn set_failed(&self, event_id: i64, reason: &str) -> Result<(), RepositoryError>;

    /// Records a delivery error and releases the claim; the event stays
    /// `Processing` until it is claimed again after the retry delay.
    async fn update_error(&self, event_id: i64, error: &str) -> Result<(), RepositoryError>;

    async fn find(&self, event_id: i64) -> Result<Option<OutboxEvent>, RepositoryError>;

    /// Lists up to `limit` events in `status`, oldest first.
    async fn list_by_status(
        &self,
        status: OutboxStatus,
        limit: usize,
    ) -> Result<Vec<OutboxEvent>, RepositoryError>;

    async fn count_by_status(&self) -> Result<OutboxCounts, RepositoryError>;

    /// Resets `Failed` events in `scope` to `Created` with no attempts and no
    /// error. Returns the number of events reset.
    async fn redrive_failed(&self, scope: RedriveScope) -> Result<usize, RepositoryError>;
}
