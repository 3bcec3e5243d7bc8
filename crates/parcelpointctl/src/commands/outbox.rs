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

//! Implementation of the `outbox` commands.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use parcelpoint::config::AppConfig;
use parcelpoint::outbox::{
    NoopOutboxRepository, NoopProducer, OutboxDispatcher, OutboxRepository, OutboxStatus,
    Producer, RedriveScope,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs the dispatcher until Ctrl-C.
pub async fn run(config: &AppConfig) -> Result<()> {
    let (repository, producer): (Arc<dyn OutboxRepository>, Arc<dyn Producer>) =
        if config.outbox.enabled {
            (Arc::new(super::repository(config)?), broker(config)?)
        } else {
            warn!("Outbox is disabled in configuration; dispatcher will idle");
            (
                Arc::new(NoopOutboxRepository::new()),
                Arc::new(NoopProducer::new()),
            )
        };

    let dispatcher = OutboxDispatcher::new(repository, producer.clone(), config.dispatcher_config());
    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
        signal.cancel();
    });

    match dispatcher.dispatch(cancel).await {
        Err(e) if e.is_cancelled() => {}
        Err(e) => return Err(e).context("Outbox dispatcher failed"),
        Ok(()) => {}
    }

    producer.close().await.context("Failed to close producer")?;
    Ok(())
}

#[cfg(feature = "kafka")]
fn broker(config: &AppConfig) -> Result<Arc<dyn Producer>> {
    let producer = parcelpoint::outbox::kafka::KafkaProducer::new(&config.outbox.brokers)
        .context("Failed to create Kafka producer")?;
    Ok(Arc::new(producer))
}

#[cfg(not(feature = "kafka"))]
fn broker(_config: &AppConfig) -> Result<Arc<dyn Producer>> {
    bail!("parcelpointctl was built without the kafka feature; set outbox.enabled = false or rebuild with --features kafka")
}

/// Resets failed events to `CREATED`.
pub async fn redrive(config: &AppConfig, event_ids: Vec<i64>, all: bool) -> Result<()> {
    let scope = match (all, event_ids.is_empty()) {
        (true, _) => RedriveScope::All,
        (false, false) => RedriveScope::Events(event_ids),
        (false, true) => bail!("Specify --event-id at least once, or --all"),
    };

    let repository = super::repository(config)?;
    let reset = repository
        .redrive_failed(scope)
        .await
        .context("Failed to redrive outbox events")?;
    println!("Reset {} failed event(s) to {}", reset, OutboxStatus::Created.as_str());
    Ok(())
}

/// Prints event counts per status, and optionally the failed events.
pub async fn status(config: &AppConfig, failed_limit: usize) -> Result<()> {
    let repository = super::repository(config)?;
    let counts = repository
        .count_by_status()
        .await
        .context("Failed to count outbox events")?;

    for status in OutboxStatus::ALL {
        println!("{:<12} {}", status.as_str(), counts.get(status));
    }
    println!("{:<12} {}", "TOTAL", counts.total());

    if failed_limit > 0 {
        let failed = repository
            .list_by_status(OutboxStatus::Failed, failed_limit)
            .await
            .context("Failed to list failed events")?;
        if !failed.is_empty() {
            println!();
            println!("{:<20} {:<12} {:<8} ERROR", "EVENT", "ORDER", "ATTEMPTS");
        }
        for event in failed {
            println!(
                "{:<20} {:<12} {:<8} {}",
                event.event_id,
                event.order_id,
                event.attempts,
                event.error.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}
