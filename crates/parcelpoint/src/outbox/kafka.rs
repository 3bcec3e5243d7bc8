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

//! Kafka producer backed by `rdkafka`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};
use rdkafka::util::Timeout;
use tracing::{debug, info};

use super::producer::Producer;
use crate::error::BrokerError;

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Synchronous-delivery Kafka producer.
///
/// Every send waits for the broker acknowledgement, so a successful return
/// means the message is durable and the outbox event can be completed.
pub struct KafkaProducer {
    inner: FutureProducer,
    send_timeout: Duration,
    closed: AtomicBool,
}

impl KafkaProducer {
    /// Connects to the comma separated `brokers` list.
    pub fn new(brokers: &str) -> Result<Self, BrokerError> {
        Self::with_timeout(brokers, DEFAULT_SEND_TIMEOUT)
    }

    pub fn with_timeout(brokers: &str, send_timeout: Duration) -> Result<Self, BrokerError> {
        if brokers.trim().is_empty() {
            return Err(BrokerError::Configuration(
                "at least one broker address is required".to_string(),
            ));
        }

        let inner: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", send_timeout.as_millis().to_string())
            .set("acks", "all")
            .create()
            .map_err(|e| BrokerError::Configuration(e.to_string()))?;

        info!(brokers, "Kafka producer initialized");
        Ok(Self {
            inner,
            send_timeout,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BrokerError::Closed)
        } else {
            Ok(())
        }
    }

    async fn deliver(
        &self,
        topic: &str,
        record: FutureRecord<'_, str, [u8]>,
    ) -> Result<(), BrokerError> {
        self.inner
            .send(record, Timeout::After(self.send_timeout))
            .await
            .map(|_| ())
            .map_err(|(err, _)| BrokerError::Delivery {
                topic: topic.to_string(),
                reason: err.to_string(),
            })
    }
}

#[async_trait]
impl Producer for KafkaProducer {
    async fn send(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.ensure_open()?;
        self.deliver(topic, FutureRecord::to(topic).payload(payload))
            .await
    }

    async fn send_with_key(
        &self,
        topic: &str,
        key: &str,
        payload: &[u8],
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;
        debug!(topic, key, "Publishing keyed message");
        self.deliver(topic, FutureRecord::to(topic).key(key).payload(payload))
            .await
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let producer = self.inner.clone();
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(FLUSH_TIMEOUT)))
            .await
            .map_err(|e| BrokerError::Configuration(e.to_string()))?
            .map_err(|e| BrokerError::Delivery {
                topic: "*".to_string(),
                reason: e.to_string(),
            })?;
        info!("Kafka producer closed");
        Ok(())
    }
}
