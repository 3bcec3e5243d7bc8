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

//! Outbox repository that stores nothing.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::model::{NewOutboxEvent, OutboxCounts, OutboxEvent, OutboxStatus, RedriveScope};
use super::repository::OutboxRepository;
use crate::error::RepositoryError;

/// Repository used when the outbox is disabled.
///
/// `create` echoes the event back without keeping it and every query is
/// empty, so a dispatcher running against it never has work.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopOutboxRepository;

impl NoopOutboxRepository {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OutboxRepository for NoopOutboxRepository {
    async fn create(&self, event: NewOutboxEvent) -> Result<OutboxEvent, RepositoryError> {
        Ok(OutboxEvent::from_new(event, Utc::now()))
    }

    async fn claim_batch(
        &self,
        _limit: usize,
        _retry_delay: Duration,
        _claimant: &str,
    ) -> Result<Vec<OutboxEvent>, RepositoryError> {
        Ok(Vec::new())
    }

    async fn fetch_processing(
        &self,
        _limit: usize,
        _claimant: &str,
    ) -> Result<Vec<OutboxEvent>, RepositoryError> {
        Ok(Vec::new())
    }

    async fn set_completed(
        &self,
        _event_id: i64,
        _sent_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn set_failed(&self, _event_id: i64, _reason: &str) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn update_error(&self, _event_id: i64, _error: &str) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn find(&self, _event_id: i64) -> Result<Option<OutboxEvent>, RepositoryError> {
        Ok(None)
    }

    async fn list_by_status(
        &self,
        _status: OutboxStatus,
        _limit: usize,
    ) -> Result<Vec<OutboxEvent>, RepositoryError> {
        Ok(Vec::new())
    }

    async fn count_by_status(&self) -> Result<OutboxCounts, RepositoryError> {
        Ok(OutboxCounts::default())
    }

    async fn redrive_failed(&self, _scope: RedriveScope) -> Result<usize, RepositoryError> {
        Ok(0)
    }
}
