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

//! # Transactional Outbox
//!
//! Order mutations write an event row next to the order change; this
//! module moves those rows to the message broker.
//!
//! - [`OutboxRepository`] - persistence port ([`crate::memory::MemoryStore`],
//!   [`NoopOutboxRepository`], and `postgres::PgOutboxRepository` behind the
//!   `postgres` feature)
//! - [`Producer`] - broker port ([`NoopProducer`], and
//!   `kafka::KafkaProducer` behind the `kafka` feature)
//! - [`OutboxDispatcher`] - the acquire/process loops
//!
//! ## Event lifecycle
//!
//! ```text
//! Created --claim--> Processing --send ok--> Completed
//!                      |   ^
//!          send failed |   | claim again after retry_delay
//!                      v   |
//!                    Processing (error recorded, unclaimed)
//!                      |
//!                      | attempts >= max_attempts
//!                      v
//!                    Failed --redrive--> Created
//! ```

mod dispatcher;
mod model;
mod noop;
mod producer;
mod repository;

#[cfg(feature = "kafka")]
pub mod kafka;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use dispatcher::{DispatcherConfig, DispatcherConfigBuilder, OutboxDispatcher, NO_ATTEMPTS_LEFT};
pub use model::{
    generate_event_id, NewOutboxEvent, OutboxCounts, OutboxEvent, OutboxStatus, RedriveScope,
};
pub use noop::NoopOutboxRepository;
pub use producer::{NoopProducer, Producer};
pub use repository::OutboxRepository;
