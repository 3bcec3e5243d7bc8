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

//! Message broker port.

use async_trait::async_trait;
use tracing::debug;

use crate::error::BrokerError;

/// Publishes outbox payloads to a message broker.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Publishes `payload` to `topic` without a message key.
    async fn send(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Publishes `payload` to `topic` keyed by `key`, so messages sharing a
    /// key land on the same partition.
    async fn send_with_key(&self, topic: &str, key: &str, payload: &[u8])
        -> Result<(), BrokerError>;

    /// Flushes pending messages and releases the connection.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// Producer that accepts and discards every message.
///
/// Used when event publishing is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProducer;

impl NoopProducer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Producer for NoopProducer {
    async fn send(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        debug!(topic, bytes = payload.len(), "Discarding message (noop producer)");
        Ok(())
    }

    async fn send_with_key(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<(), BrokerError> {
        debug!(topic, key, bytes = payload.len(), "Discarding message (noop producer)");
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}
