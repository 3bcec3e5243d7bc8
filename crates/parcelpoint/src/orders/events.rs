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

//! Events published for order state changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::models::{HistoryEvent, Order};
use crate::error::OrderError;

/// Value of the `source` field of every published event.
pub const EVENT_SOURCE: &str = "pvz-api";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    Courier,
    Client,
}

/// Who caused a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    #[serde(rename = "type")]
    pub kind: ActorType,
    pub id: i64,
}

impl Actor {
    /// Couriers hand orders in and take them back; clients collect and
    /// return them.
    pub fn for_event(event: HistoryEvent, user_id: i64) -> Self {
        match event {
            HistoryEvent::Accepted | HistoryEvent::ReturnedToWarehouse => Actor {
                kind: ActorType::Courier,
                id: assign_courier(),
            },
            HistoryEvent::Issued | HistoryEvent::ReturnedByClient => Actor {
                kind: ActorType::Client,
                id: user_id,
            },
        }
    }
}

// No courier registry exists yet; any positive id stands in for one.
fn assign_courier() -> i64 {
    let bytes = *Uuid::new_v4().as_bytes();
    let id = i64::from(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));
    id.max(1)
}

/// Outbox payload describing an order state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub event_id: i64,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub actor: Actor,
    pub order: Order,
    pub source: String,
}

impl OrderEvent {
    pub fn new(event_id: i64, event: HistoryEvent, order: Order, timestamp: DateTime<Utc>) -> Self {
        let actor = Actor::for_event(event, order.user_id);
        Self {
            event_id,
            event_type: event.event_type().to_string(),
            timestamp,
            actor,
            order,
            source: EVENT_SOURCE.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, OrderError> {
        Ok(serde_json::to_string(self)?)
    }
}
