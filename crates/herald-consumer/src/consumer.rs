//! Batch-polling consumer loop.
//!
//! The framework polls the bus for a batch, fans the batch out by
//! partition key, and processes each key's messages strictly in order
//! while distinct keys run concurrently. Offsets are committed only
//! after the whole batch has been handled, so a crash mid-batch
//! re-delivers and idempotent handlers absorb the duplicates.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use herald_core::{BusMessage, Clock, Event, MessageBus, RetryDecision, RetryPolicy};
use tokio::{sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    error::{ConsumerError, Result},
    router::{EventHandler, TopicRouter},
};

/// Consumer framework configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Consumer group name; offsets are tracked per group.
    pub group: String,

    /// Maximum messages fetched per poll.
    pub batch_size: usize,

    /// Idle wait between polls when the bus has nothing new.
    pub poll_interval: Duration,

    /// Retry policy applied to failing handlers, per message.
    pub handler_retry: RetryPolicy,

    /// Grace period allowed for in-flight work during shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group: "herald-workers".to_string(),
            batch_size: 25,
            poll_interval: Duration::from_secs(1),
            handler_retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(30),
                jitter_factor: 0.1,
                ..Default::default()
            },
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Counters describing consumer progress, readable while running.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Messages successfully handled.
    pub messages_processed: u64,

    /// Undecodable messages skipped and committed past.
    pub poison_skipped: u64,

    /// Handler retries performed across all messages.
    pub handler_retries: u64,

    /// Messages routed to the dead-letter sink after exhausting retries.
    pub dead_lettered: u64,
}

/// A message that exhausted its handler retries.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// Topic the message arrived on.
    pub topic: String,

    /// Partition key of the message.
    pub key: String,

    /// Original payload bytes.
    pub payload: Bytes,

    /// Final handler error.
    pub error: String,

    /// Attempts made before giving up.
    pub attempts: u32,

    /// When the message was abandoned.
    pub occurred_at: DateTime<Utc>,
}

/// Receives messages the consumer has given up on.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Records one abandoned message.
    async fn record(&self, letter: DeadLetter);
}

/// Default sink: logs abandoned messages at error level.
#[derive(Debug, Default)]
pub struct LogDeadLetterSink;

#[async_trait]
impl DeadLetterSink for LogDeadLetterSink {
    async fn record(&self, letter: DeadLetter) {
        error!(
            topic = %letter.topic,
            key = %letter.key,
            attempts = letter.attempts,
            error = %letter.error,
            "dead letter"
        );
    }
}

/// Sink that keeps abandoned messages in memory, for tests.
#[derive(Debug, Default)]
pub struct MemoryDeadLetterSink {
    letters: std::sync::Mutex<Vec<DeadLetter>>,
}

impl MemoryDeadLetterSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains and returns everything recorded so far.
    pub fn take(&self) -> Vec<DeadLetter> {
        std::mem::take(&mut self.letters.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Number of recorded dead letters.
    pub fn len(&self) -> usize {
        self.letters.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetterSink {
    async fn record(&self, letter: DeadLetter) {
        self.letters.lock().unwrap_or_else(|e| e.into_inner()).push(letter);
    }
}

/// Owns the poll loop and the handler registry.
///
/// Register handlers with [`subscribe`](Self::subscribe), then call
/// [`start`](Self::start); the loop runs on a background task until
/// [`stop`](Self::stop).
pub struct ConsumerFramework {
    bus: Arc<dyn MessageBus>,
    router: TopicRouter,
    config: ConsumerConfig,
    clock: Arc<dyn Clock>,
    dead_letters: Arc<dyn DeadLetterSink>,
    stats: Arc<RwLock<ConsumerStats>>,
    cancellation: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ConsumerFramework {
    /// Creates a stopped consumer over the given bus.
    pub fn new(bus: Arc<dyn MessageBus>, config: ConsumerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            bus,
            router: TopicRouter::new(),
            config,
            clock,
            dead_letters: Arc::new(LogDeadLetterSink),
            stats: Arc::new(RwLock::new(ConsumerStats::default())),
            cancellation: CancellationToken::new(),
            handle: None,
        }
    }

    /// Replaces the dead-letter sink. Must be called before `start`.
    pub fn with_dead_letter_sink(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = sink;
        self
    }

    /// Registers a handler for a topic.
    ///
    /// Fails after `start`, on an empty topic, or on double registration.
    pub fn subscribe(
        &mut self,
        topic: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<()> {
        if self.handle.is_some() {
            return Err(ConsumerError::configuration("cannot subscribe after start"));
        }
        self.router.register(topic, handler)
    }

    /// Validates the registry and spawns the poll loop.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(ConsumerError::configuration("consumer already started"));
        }
        if self.router.is_empty() {
            return Err(ConsumerError::configuration("no topic handlers registered"));
        }
        if self.config.group.is_empty() {
            return Err(ConsumerError::configuration("consumer group cannot be empty"));
        }
        if self.config.batch_size == 0 {
            return Err(ConsumerError::configuration("batch_size must be at least 1"));
        }

        let worker = ConsumerWorker {
            bus: Arc::clone(&self.bus),
            router: self.router.clone(),
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
            dead_letters: Arc::clone(&self.dead_letters),
            stats: Arc::clone(&self.stats),
            cancellation: self.cancellation.clone(),
        };
        self.handle = Some(tokio::spawn(worker.run()));
        Ok(())
    }

    /// Stops the poll loop, waiting up to the configured grace period.
    ///
    /// Work interrupted mid-batch is left uncommitted so the bus
    /// re-delivers it on the next start.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        self.cancellation.cancel();
        let abort = handle.abort_handle();
        match tokio::time::timeout(self.config.shutdown_timeout, handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join_err)) => {
                error!(error = %join_err, "consumer task failed");
                Ok(())
            },
            Err(_) => {
                abort.abort();
                Err(ConsumerError::ShutdownTimeout { timeout: self.config.shutdown_timeout })
            },
        }
    }

    /// Snapshot of the progress counters.
    pub async fn stats(&self) -> ConsumerStats {
        self.stats.read().await.clone()
    }
}

struct ConsumerWorker {
    bus: Arc<dyn MessageBus>,
    router: TopicRouter,
    config: ConsumerConfig,
    clock: Arc<dyn Clock>,
    dead_letters: Arc<dyn DeadLetterSink>,
    stats: Arc<RwLock<ConsumerStats>>,
    cancellation: CancellationToken,
}

impl ConsumerWorker {
    async fn run(self) {
        let topics = self.router.topics();
        info!(group = %self.config.group, ?topics, "consumer started");

        loop {
            if self.cancellation.is_cancelled() {
                break;
            }

            let batch = match self
                .bus
                .poll(&self.config.group, &topics, self.config.batch_size)
                .await
            {
                Ok(batch) => batch,
                Err(err) => {
                    error!(error = %err, "bus poll failed");
                    if self.pause(self.config.poll_interval).await {
                        break;
                    }
                    continue;
                },
            };

            if batch.is_empty() {
                if self.pause(self.config.poll_interval).await {
                    break;
                }
                continue;
            }

            if !self.process_batch(batch).await {
                break;
            }
        }

        info!(group = %self.config.group, "consumer stopped");
    }

    /// Handles one batch and commits on completion.
    ///
    /// Returns false if shutdown interrupted the batch; nothing is
    /// committed in that case.
    async fn process_batch(&self, batch: Vec<BusMessage>) -> bool {
        let mut next_offsets: HashMap<String, u64> = HashMap::new();
        let mut groups: Vec<Vec<Event>> = Vec::new();
        let mut group_index: HashMap<(String, String), usize> = HashMap::new();

        for message in batch {
            let next = next_offsets.entry(message.topic.clone()).or_insert(0);
            *next = (*next).max(message.offset + 1);

            match decode(&message) {
                Ok(event) => {
                    let slot = *group_index
                        .entry((event.topic.clone(), event.key.clone()))
                        .or_insert_with(|| {
                            groups.push(Vec::new());
                            groups.len() - 1
                        });
                    groups[slot].push(event);
                },
                Err(err) => {
                    warn!(
                        topic = %message.topic,
                        offset = message.offset,
                        error = %err,
                        "skipping undecodable message"
                    );
                    self.bump(|s| s.poison_skipped += 1).await;
                },
            }
        }

        let results =
            futures::future::join_all(groups.into_iter().map(|events| self.process_group(events)))
                .await;
        if results.contains(&false) {
            return false;
        }

        for (topic, next_offset) in next_offsets {
            if let Err(err) = self.bus.commit(&self.config.group, &topic, next_offset).await {
                error!(topic = %topic, error = %err, "offset commit failed");
            }
        }
        true
    }

    /// Processes one key's events strictly in arrival order.
    async fn process_group(&self, events: Vec<Event>) -> bool {
        for event in events {
            if !self.process_event(event).await {
                return false;
            }
        }
        true
    }

    /// Runs the handler for one event, retrying per policy.
    ///
    /// Returns false only when shutdown interrupted a retry wait.
    async fn process_event(&self, event: Event) -> bool {
        let Some(handler) = self.router.handler_for(&event.topic) else {
            // poll only covers registered topics, so this is a bug upstream
            warn!(topic = %event.topic, "no handler registered for polled topic");
            return true;
        };

        let mut attempt = 1u32;
        loop {
            let err = match handler.handle(event.clone()).await {
                Ok(()) => {
                    self.bump(|s| s.messages_processed += 1).await;
                    return true;
                },
                Err(err) => err,
            };

            match self.config.handler_retry.decide(attempt, self.clock.now_utc()) {
                RetryDecision::Retry { next_attempt_at } => {
                    warn!(
                        topic = %event.topic,
                        key = %event.key,
                        attempt,
                        error = %err,
                        retry_at = %next_attempt_at,
                        "handler failed, retrying"
                    );
                    self.bump(|s| s.handler_retries += 1).await;
                    let delay = self.config.handler_retry.delay_for_attempt(attempt);
                    if self.pause(delay).await {
                        return false;
                    }
                    attempt += 1;
                },
                RetryDecision::GiveUp { reason } => {
                    error!(
                        topic = %event.topic,
                        key = %event.key,
                        attempt,
                        error = %err,
                        reason = %reason,
                        "handler failed permanently"
                    );
                    self.dead_letters
                        .record(DeadLetter {
                            topic: event.topic.clone(),
                            key: event.key.clone(),
                            payload: event.payload.clone(),
                            error: err.to_string(),
                            attempts: attempt,
                            occurred_at: self.clock.now_utc(),
                        })
                        .await;
                    self.bump(|s| s.dead_lettered += 1).await;
                    return true;
                },
            }
        }
    }

    /// Sleeps on the injected clock; returns true if cancelled first.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.clock.sleep(duration) => false,
            () = self.cancellation.cancelled() => true,
        }
    }

    async fn bump(&self, update: impl FnOnce(&mut ConsumerStats)) {
        let mut stats = self.stats.write().await;
        update(&mut stats);
    }
}

/// Validates a bus message and lifts it into an event.
///
/// Payloads must be well-formed JSON; anything else is poison and gets
/// skipped rather than wedging the partition.
fn decode(message: &BusMessage) -> Result<Event> {
    serde_json::from_slice::<serde_json::Value>(&message.payload)
        .map_err(|e| ConsumerError::decode(&message.topic, e.to_string()))?;

    Ok(Event::new(&message.topic, &message.key, message.payload.clone(), message.produced_at))
}

#[cfg(test)]
mod tests {
    use herald_core::{InMemoryBus, TestClock};

    use super::*;
    use crate::router::handler_fn;

    fn framework() -> ConsumerFramework {
        let clock = Arc::new(TestClock::new());
        let bus = Arc::new(InMemoryBus::new(clock.clone()));
        ConsumerFramework::new(bus, ConsumerConfig::default(), clock)
    }

    fn noop_handler() -> Arc<dyn EventHandler> {
        Arc::new(handler_fn(|_event| async { Ok(()) }))
    }

    #[tokio::test]
    async fn start_requires_handlers() {
        let mut consumer = framework();
        let err = consumer.start().unwrap_err();
        assert!(matches!(err, ConsumerError::Configuration { .. }));
    }

    #[tokio::test]
    async fn subscribe_after_start_is_rejected() {
        let mut consumer = framework();
        consumer.subscribe("item.created", noop_handler()).expect("subscribe");
        consumer.start().expect("start");

        let err = consumer.subscribe("item.deleted", noop_handler()).unwrap_err();
        assert!(matches!(err, ConsumerError::Configuration { .. }));

        consumer.stop().await.expect("stop");
    }

    #[tokio::test]
    async fn double_start_is_rejected() {
        let mut consumer = framework();
        consumer.subscribe("item.created", noop_handler()).expect("subscribe");
        consumer.start().expect("start");

        let err = consumer.start().unwrap_err();
        assert!(err.to_string().contains("already started"));

        consumer.stop().await.expect("stop");
    }

    #[tokio::test]
    async fn stop_before_start_is_a_noop() {
        let mut consumer = framework();
        consumer.stop().await.expect("stop");
    }

    #[test]
    fn decode_rejects_invalid_json() {
        let message = BusMessage {
            topic: "item.created".to_string(),
            key: "k".to_string(),
            payload: Bytes::from_static(b"{not json"),
            produced_at: Utc::now(),
            offset: 0,
        };

        let err = decode(&message).unwrap_err();
        assert!(matches!(err, ConsumerError::Decode { .. }));
    }
}
