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

//! Outbox dispatcher.
//!
//! The dispatcher runs two independent loops against the same repository:
//!
//! - the **acquire** loop claims deliverable events for this instance
//!   (`Created`, or `Processing` whose last attempt is older than the retry
//!   delay) and moves them to `Processing`;
//! - the **process** loop reads back the events this instance holds and
//!   publishes each one, keyed by order id.
//!
//! The loops share no in-process state. Everything they agree on lives in
//! the persisted `status`, `attempts`, `last_attempt_at` and `claimed_by`
//! columns, which is also what lets several dispatcher processes work the
//! same table.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinError;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::model::OutboxEvent;
use super::producer::Producer;
use super::repository::OutboxRepository;
use crate::error::DispatchError;

const DEFAULT_TOPIC: &str = "pvz.events-log";
const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Failure reason stored on events that exhausted their attempts.
pub const NO_ATTEMPTS_LEFT: &str = "no attempts left";

/// Configuration for [`OutboxDispatcher`].
///
/// ```rust,ignore
/// let config = DispatcherConfig::builder()
///     .topic("pvz.events-log")
///     .batch_size(50)
///     .retry_delay(Duration::from_secs(5))
///     .build();
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct DispatcherConfig {
    topic: String,
    batch_size: usize,
    retry_delay: Duration,
    poll_interval: Duration,
    max_attempts: i32,
    instance_id: String,
}

impl DispatcherConfig {
    pub fn builder() -> DispatcherConfigBuilder {
        DispatcherConfigBuilder::default()
    }

    /// Topic every event is published to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Maximum number of events claimed or processed per tick.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Minimum time between two delivery attempts of the same event.
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Tick period shared by the acquire and process loops.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Attempts after which a failing event is marked `Failed`.
    pub fn max_attempts(&self) -> i32 {
        self.max_attempts
    }

    /// Identity written to `claimed_by` for events held by this instance.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfigBuilder::default().build()
    }
}

/// Builder for [`DispatcherConfig`].
///
/// Zero values fall back to the defaults and a missing instance id is
/// replaced by a random UUID.
#[derive(Debug, Clone)]
pub struct DispatcherConfigBuilder {
    topic: String,
    batch_size: usize,
    retry_delay: Duration,
    poll_interval: Duration,
    max_attempts: i32,
    instance_id: Option<String>,
}

impl Default for DispatcherConfigBuilder {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            retry_delay: DEFAULT_RETRY_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            instance_id: None,
        }
    }
}

impl DispatcherConfigBuilder {
    pub fn topic(mut self, value: impl Into<String>) -> Self {
        self.topic = value.into();
        self
    }

    pub fn batch_size(mut self, value: usize) -> Self {
        self.batch_size = value;
        self
    }

    pub fn retry_delay(mut self, value: Duration) -> Self {
        self.retry_delay = value;
        self
    }

    pub fn poll_interval(mut self, value: Duration) -> Self {
        self.poll_interval = value;
        self
    }

    pub fn max_attempts(mut self, value: i32) -> Self {
        self.max_attempts = value;
        self
    }

    pub fn instance_id(mut self, value: impl Into<String>) -> Self {
        self.instance_id = Some(value.into());
        self
    }

    pub fn build(self) -> DispatcherConfig {
        let topic = if self.topic.trim().is_empty() {
            DEFAULT_TOPIC.to_string()
        } else {
            self.topic
        };
        let instance_id = self
            .instance_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        DispatcherConfig {
            topic,
            batch_size: if self.batch_size == 0 {
                DEFAULT_BATCH_SIZE
            } else {
                self.batch_size
            },
            retry_delay: self.retry_delay,
            poll_interval: if self.poll_interval.is_zero() {
                DEFAULT_POLL_INTERVAL
            } else {
                self.poll_interval
            },
            max_attempts: if self.max_attempts <= 0 {
                DEFAULT_MAX_ATTEMPTS
            } else {
                self.max_attempts
            },
            instance_id,
        }
    }
}

struct DispatcherInner {
    repository: Arc<dyn OutboxRepository>,
    producer: Arc<dyn Producer>,
    config: DispatcherConfig,
}

/// Publishes persisted outbox events to a message broker.
pub struct OutboxDispatcher {
    inner: Arc<DispatcherInner>,
    lifetime: CancellationToken,
}

impl OutboxDispatcher {
    pub fn new(
        repository: Arc<dyn OutboxRepository>,
        producer: Arc<dyn Producer>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                repository,
                producer,
                config,
            }),
            lifetime: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// Runs both loops until `cancel` fires or [`stop`](Self::stop) is called.
    ///
    /// Returns [`DispatchError::Cancelled`] on a normal shutdown, after both
    /// loops have finished the tick they were in. A loop that panics ends
    /// the dispatch with [`DispatchError::LoopFailed`] and stops the other.
    pub async fn dispatch(&self, cancel: CancellationToken) -> Result<(), DispatchError> {
        let shutdown = self.lifetime.child_token();
        let config = &self.inner.config;
        info!(
            instance_id = config.instance_id(),
            topic = config.topic(),
            batch_size = config.batch_size(),
            "Outbox dispatcher started"
        );

        let mut acquire = tokio::spawn(acquire_loop(self.inner.clone(), shutdown.clone()));
        let mut process = tokio::spawn(process_loop(self.inner.clone(), shutdown.clone()));

        // Cancellation is polled before the loop handles.
        let exit = tokio::select! {
            biased;
            _ = cancel.cancelled() => LoopExit::Cancelled,
            _ = shutdown.cancelled() => LoopExit::Cancelled,
            result = &mut acquire => LoopExit::Acquire(result),
            result = &mut process => LoopExit::Process(result),
        };
        let stopping = cancel.is_cancelled() || shutdown.is_cancelled();
        shutdown.cancel();

        let failure = match exit {
            LoopExit::Cancelled => {
                let (acquired, processed) = tokio::join!(acquire, process);
                if let Err(e) = acquired {
                    warn!(error = %e, "Acquire loop ended with an error during shutdown");
                }
                if let Err(e) = processed {
                    warn!(error = %e, "Process loop ended with an error during shutdown");
                }
                None
            }
            LoopExit::Acquire(result) => {
                let _ = process.await;
                loop_failure("acquire", result, stopping)
            }
            LoopExit::Process(result) => {
                let _ = acquire.await;
                loop_failure("process", result, stopping)
            }
        };
        if let Some(failure) = failure {
            error!(error = %failure, "Outbox dispatcher loop terminated");
            return Err(failure);
        }

        info!(instance_id = config.instance_id(), "Outbox dispatcher stopped");
        Err(DispatchError::Cancelled)
    }

    /// Stops a running [`dispatch`](Self::dispatch). Repeated calls have no
    /// further effect. The stop is permanent: once called, every later
    /// `dispatch` returns [`DispatchError::Cancelled`] straight away.
    pub fn stop(&self) {
        if !self.lifetime.is_cancelled() {
            debug!(instance_id = self.inner.config.instance_id(), "Stopping outbox dispatcher");
            self.lifetime.cancel();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.lifetime.is_cancelled()
    }
}

impl Drop for OutboxDispatcher {
    fn drop(&mut self) {
        self.lifetime.cancel();
    }
}

enum LoopExit {
    Cancelled,
    Acquire(Result<(), JoinError>),
    Process(Result<(), JoinError>),
}

/// Maps a loop's exit to a failure. A clean exit while stopping is a
/// normal stop.
fn loop_failure(
    name: &'static str,
    result: Result<(), JoinError>,
    stopping: bool,
) -> Option<DispatchError> {
    let reason = match result {
        Ok(()) if stopping => return None,
        Ok(()) => "loop exited unexpectedly".to_string(),
        Err(e) => e.to_string(),
    };
    Some(DispatchError::LoopFailed { name, reason })
}

async fn acquire_loop(inner: Arc<DispatcherInner>, shutdown: CancellationToken) {
    let config = &inner.config;
    let mut ticker = interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                match inner
                    .repository
                    .claim_batch(config.batch_size(), config.retry_delay(), config.instance_id())
                    .await
                {
                    Ok(claimed) if !claimed.is_empty() => {
                        debug!(count = claimed.len(), "Claimed outbox events");
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Failed to claim outbox events"),
                }
            }
        }
    }
    debug!("Acquire loop stopped");
}

async fn process_loop(inner: Arc<DispatcherInner>, shutdown: CancellationToken) {
    let config = &inner.config;
    let mut ticker = interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                match inner
                    .repository
                    .fetch_processing(config.batch_size(), config.instance_id())
                    .await
                {
                    Ok(events) => {
                        for event in events {
                            inner.deliver(event).await;
                        }
                    }
                    Err(e) => error!(error = %e, "Failed to fetch claimed outbox events"),
                }
            }
        }
    }
    debug!("Process loop stopped");
}

impl DispatcherInner {
    async fn deliver(&self, event: OutboxEvent) {
        let key = event.order_id.to_string();
        let sent = self
            .producer
            .send_with_key(self.config.topic(), &key, event.payload.as_bytes())
            .await;

        let outcome = match sent {
            Ok(()) => {
                let updated = self
                    .repository
                    .set_completed(event.event_id, Utc::now())
                    .await;
                if updated.is_ok() {
                    info!(
                        event_id = event.event_id,
                        order_id = event.order_id,
                        attempt = event.attempts,
                        "Outbox event dispatched"
                    );
                }
                updated
            }
            Err(send_error) if event.attempts >= self.config.max_attempts() => {
                error!(
                    event_id = event.event_id,
                    attempt = event.attempts,
                    error = %send_error,
                    "Outbox event failed, no attempts left"
                );
                self.repository
                    .set_failed(event.event_id, NO_ATTEMPTS_LEFT)
                    .await
            }
            Err(send_error) => {
                warn!(
                    event_id = event.event_id,
                    attempt = event.attempts,
                    max_attempts = self.config.max_attempts(),
                    error = %send_error,
                    "Failed to publish outbox event, will retry"
                );
                self.repository
                    .update_error(event.event_id, &send_error.to_string())
                    .await
            }
        };

        if let Err(e) = outcome {
            error!(
                event_id = event.event_id,
                error = %e,
                "Failed to record outbox delivery outcome"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::BrokerError;
    use crate::memory::MemoryStore;
    use crate::outbox::{NewOutboxEvent, OutboxStatus};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Producer that fails the first `failures` sends and records the rest.
    #[derive(Default)]
    struct FlakyProducer {
        failures: AtomicUsize,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl FlakyProducer {
        fn failing(times: usize) -> Self {
            Self {
                failures: AtomicUsize::new(times),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl Producer for FlakyProducer {
        async fn send(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
            self.send_with_key(topic, "", payload).await
        }

        async fn send_with_key(
            &self,
            topic: &str,
            key: &str,
            _payload: &[u8],
        ) -> Result<(), BrokerError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(BrokerError::Delivery {
                    topic: topic.to_string(),
                    reason: "broker unavailable".to_string(),
                });
            }
            self.sent.lock().push((topic.to_string(), key.to_string()));
            Ok(())
        }

        async fn close(&self) -> Result<(), BrokerError> {
            Ok(())
        }
    }

    fn fast_config() -> DispatcherConfig {
        DispatcherConfig::builder()
            .topic("test.events")
            .poll_interval(Duration::from_millis(10))
            .retry_delay(Duration::from_millis(30))
            .instance_id("dispatcher-test")
            .build()
    }

    async fn run_for(dispatcher: &OutboxDispatcher, duration: Duration) -> DispatchError {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            trigger.cancel();
        });
        match dispatcher.dispatch(cancel).await {
            Err(e) => e,
            Ok(()) => panic!("dispatch returned Ok"),
        }
    }

    async fn wait_for_event<F>(store: &MemoryStore, event_id: i64, done: F) -> OutboxEvent
    where
        F: Fn(&OutboxEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let event = store.find(event_id).await.unwrap().unwrap();
            if done(&event) || tokio::time::Instant::now() >= deadline {
                return event;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.topic(), "pvz.events-log");
        assert_eq!(config.batch_size(), 100);
        assert_eq!(config.retry_delay(), Duration::from_secs(2));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.max_attempts(), 3);
        assert!(Uuid::parse_str(config.instance_id()).is_ok());
    }

    #[test]
    fn test_config_zero_values_fall_back() {
        let config = DispatcherConfig::builder()
            .topic(" ")
            .batch_size(0)
            .poll_interval(Duration::ZERO)
            .max_attempts(0)
            .instance_id("")
            .build();
        assert_eq!(config.topic(), "pvz.events-log");
        assert_eq!(config.batch_size(), 100);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.max_attempts(), 3);
        assert!(!config.instance_id().is_empty());
    }

    #[tokio::test]
    async fn test_delivers_and_completes_events() {
        let store = Arc::new(MemoryStore::new());
        let created = store
            .create(NewOutboxEvent::new(42, "{\"order\":42}".to_string()))
            .await
            .unwrap();
        let producer = Arc::new(FlakyProducer::default());
        let dispatcher = OutboxDispatcher::new(store.clone(), producer.clone(), fast_config());

        let outcome = run_for(&dispatcher, Duration::from_millis(150)).await;
        assert!(outcome.is_cancelled());

        let event = store.find(created.event_id).await.unwrap().unwrap();
        assert_eq!(event.status, OutboxStatus::Completed);
        assert_eq!(event.attempts, 1);
        assert!(event.sent_at.is_some());
        assert_eq!(
            producer.sent(),
            vec![("test.events".to_string(), "42".to_string())]
        );
    }

    #[tokio::test]
    async fn test_retries_after_delay_then_succeeds() {
        let store = Arc::new(MemoryStore::new());
        let created = store
            .create(NewOutboxEvent::new(7, "{}".to_string()))
            .await
            .unwrap();
        let producer = Arc::new(FlakyProducer::failing(1));
        let dispatcher = OutboxDispatcher::new(store.clone(), producer.clone(), fast_config());

        run_for(&dispatcher, Duration::from_millis(300)).await;

        let event = store.find(created.event_id).await.unwrap().unwrap();
        assert_eq!(event.status, OutboxStatus::Completed);
        assert_eq!(event.attempts, 2);
        assert_eq!(producer.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_marks_failed_when_attempts_exhausted() {
        let store = Arc::new(MemoryStore::new());
        let created = store
            .create(NewOutboxEvent::new(9, "{}".to_string()))
            .await
            .unwrap();
        let producer = Arc::new(FlakyProducer::failing(usize::MAX));
        let dispatcher = OutboxDispatcher::new(store.clone(), producer.clone(), fast_config());

        run_for(&dispatcher, Duration::from_millis(500)).await;

        let event = store.find(created.event_id).await.unwrap().unwrap();
        assert_eq!(event.status, OutboxStatus::Failed);
        assert_eq!(event.attempts, 3);
        assert_eq!(event.error.as_deref(), Some(NO_ATTEMPTS_LEFT));
        assert!(event.claimed_by.is_none());
        assert!(producer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_stop_ends_dispatch() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(OutboxDispatcher::new(
            store,
            Arc::new(FlakyProducer::default()),
            fast_config(),
        ));

        let running = dispatcher.clone();
        let handle = tokio::spawn(async move { running.dispatch(CancellationToken::new()).await });
        tokio::time::sleep(Duration::from_millis(30)).await;

        dispatcher.stop();
        dispatcher.stop();
        assert!(dispatcher.is_stopped());

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("dispatch did not stop")
            .unwrap();
        assert!(matches!(result, Err(DispatchError::Cancelled)));
    }

    #[tokio::test]
    async fn test_failed_send_stays_processing_until_retry_delay() {
        let clock = Arc::new(FixedClock::new());
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let created = store
            .create(NewOutboxEvent::new(5, "{}".to_string()))
            .await
            .unwrap();
        let producer = Arc::new(FlakyProducer::failing(1));
        let config = DispatcherConfig::builder()
            .poll_interval(Duration::from_millis(10))
            .retry_delay(Duration::from_secs(2))
            .instance_id("dispatcher-retry")
            .build();
        let dispatcher = Arc::new(OutboxDispatcher::new(store.clone(), producer.clone(), config));

        let running = dispatcher.clone();
        let handle = tokio::spawn(async move { running.dispatch(CancellationToken::new()).await });

        let event = wait_for_event(&store, created.event_id, |e| e.error.is_some()).await;
        // The clock has not moved, so the event cannot be claimed again yet.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let event_after_ticks = store.find(created.event_id).await.unwrap().unwrap();
        assert_eq!(event_after_ticks, event);
        assert_eq!(event.status, OutboxStatus::Processing);
        assert_eq!(event.attempts, 1);
        assert_eq!(
            event.error.as_deref(),
            Some("Failed to deliver message to 'pvz.events-log': broker unavailable")
        );
        assert!(event.claimed_by.is_none());
        assert!(event.sent_at.is_none());
        assert!(producer.sent().is_empty());

        clock.advance(chrono::Duration::seconds(3));
        let event = wait_for_event(&store, created.event_id, |e| {
            e.status == OutboxStatus::Completed
        })
        .await;
        assert_eq!(event.status, OutboxStatus::Completed);
        assert_eq!(event.attempts, 2);
        assert!(event.sent_at.is_some());
        assert_eq!(producer.sent().len(), 1);

        dispatcher.stop();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(DispatchError::Cancelled)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_always_reports_cancelled() {
        for run in 0..25 {
            let dispatcher = Arc::new(OutboxDispatcher::new(
                Arc::new(MemoryStore::new()),
                Arc::new(FlakyProducer::default()),
                DispatcherConfig::builder()
                    .poll_interval(Duration::from_millis(5))
                    .instance_id(format!("dispatcher-{}", run))
                    .build(),
            ));
            let running = dispatcher.clone();
            let handle =
                tokio::spawn(async move { running.dispatch(CancellationToken::new()).await });
            tokio::time::sleep(Duration::from_millis(run % 5)).await;

            dispatcher.stop();
            let result = handle.await.unwrap();
            assert!(
                matches!(result, Err(DispatchError::Cancelled)),
                "run {} ended with {:?}",
                run,
                result
            );
        }
    }

    #[tokio::test]
    async fn test_dispatch_after_stop_returns_immediately() {
        let dispatcher = OutboxDispatcher::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FlakyProducer::default()),
            fast_config(),
        );
        dispatcher.stop();

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            dispatcher.dispatch(CancellationToken::new()),
        )
        .await
        .expect("dispatch should not wait after stop");
        assert!(matches!(result, Err(DispatchError::Cancelled)));
    }
}
