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

//! Outbox event model.
//!
//! An outbox event is written in the same transaction as the state change it
//! describes and later delivered to the message broker by the
//! [`OutboxDispatcher`](super::OutboxDispatcher).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an outbox event, persisted as a SMALLINT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum OutboxStatus {
    Created = 1,
    Processing = 2,
    Completed = 3,
    Failed = 4,
}

impl OutboxStatus {
    pub const ALL: [OutboxStatus; 4] = [
        OutboxStatus::Created,
        OutboxStatus::Processing,
        OutboxStatus::Completed,
        OutboxStatus::Failed,
    ];

    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            1 => Some(OutboxStatus::Created),
            2 => Some(OutboxStatus::Processing),
            3 => Some(OutboxStatus::Completed),
            4 => Some(OutboxStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutboxStatus::Created => "CREATED",
            OutboxStatus::Processing => "PROCESSING",
            OutboxStatus::Completed => "COMPLETED",
            OutboxStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutboxStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown outbox status '{}'", s))
    }
}

/// An event waiting in (or delivered from) the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub event_id: i64,
    /// Used as the broker message key so events of one order stay ordered.
    pub order_id: i64,
    /// JSON-encoded message body.
    pub payload: String,
    pub status: OutboxStatus,
    /// Last delivery error, if any.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    /// Number of claims so far, each claim being one delivery attempt.
    pub attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Dispatcher instance currently holding the claim.
    pub claimed_by: Option<String>,
}

impl OutboxEvent {
    /// A freshly created event as it is first persisted.
    pub fn from_new(new_event: NewOutboxEvent, created_at: DateTime<Utc>) -> Self {
        Self {
            event_id: new_event.event_id,
            order_id: new_event.order_id,
            payload: new_event.payload,
            status: OutboxStatus::Created,
            error: None,
            created_at,
            sent_at: None,
            attempts: 0,
            last_attempt_at: None,
            claimed_by: None,
        }
    }
}

/// Structure for creating new outbox events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOutboxEvent {
    pub event_id: i64,
    pub order_id: i64,
    pub payload: String,
}

impl NewOutboxEvent {
    /// Creates an event with a freshly generated id.
    pub fn new(order_id: i64, payload: impl Into<String>) -> Self {
        Self::with_id(generate_event_id(), order_id, payload)
    }

    pub fn with_id(event_id: i64, order_id: i64, payload: impl Into<String>) -> Self {
        Self {
            event_id,
            order_id,
            payload: payload.into(),
        }
    }
}

/// Generates a random, positive 63-bit event id.
pub fn generate_event_id() -> i64 {
    let uuid = Uuid::new_v4();
    let mut high = [0u8; 8];
    high.copy_from_slice(&uuid.as_bytes()[..8]);
    let id = i64::from_be_bytes(high) & i64::MAX;
    if id == 0 {
        1
    } else {
        id
    }
}

/// Per-status event counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxCounts {
    pub created: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl OutboxCounts {
    pub fn add(&mut self, status: OutboxStatus, count: u64) {
        match status {
            OutboxStatus::Created => self.created += count,
            OutboxStatus::Processing => self.processing += count,
            OutboxStatus::Completed => self.completed += count,
            OutboxStatus::Failed => self.failed += count,
        }
    }

    pub fn get(&self, status: OutboxStatus) -> u64 {
        match status {
            OutboxStatus::Created => self.created,
            OutboxStatus::Processing => self.processing,
            OutboxStatus::Completed => self.completed,
            OutboxStatus::Failed => self.failed,
        }
    }

    pub fn total(&self) -> u64 {
        self.created + self.processing + self.completed + self.failed
    }
}

/// Which failed events a redrive resets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedriveScope {
    All,
    Events(Vec<i64>),
}

impl RedriveScope {
    pub fn includes(&self, event_id: i64) -> bool {
        match self {
            RedriveScope::All => true,
            RedriveScope::Events(ids) => ids.contains(&event_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_storage_value() {
        for status in OutboxStatus::ALL {
            assert_eq!(OutboxStatus::from_i16(status.as_i16()), Some(status));
        }
        assert_eq!(OutboxStatus::from_i16(0), None);
        assert_eq!(OutboxStatus::Failed.as_i16(), 4);
    }

    #[test]
    fn test_status_parses_case_insensitively() {
        assert_eq!("failed".parse::<OutboxStatus>(), Ok(OutboxStatus::Failed));
        assert!("sent".parse::<OutboxStatus>().is_err());
    }

    #[test]
    fn test_generated_ids_are_positive() {
        for _ in 0..100 {
            assert!(generate_event_id() > 0);
        }
    }

    #[test]
    fn test_counts() {
        let mut counts = OutboxCounts::default();
        counts.add(OutboxStatus::Created, 2);
        counts.add(OutboxStatus::Failed, 1);
        assert_eq!(counts.get(OutboxStatus::Created), 2);
        assert_eq!(counts.total(), 3);
    }
}
