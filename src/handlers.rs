//! Topic handlers and scheduled jobs wired into the service.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use herald_consumer::EventHandler;
use herald_core::{AttemptState, Clock, Event, MessageBus, NotificationRequest};
use herald_delivery::{NotificationDispatcher, WebhookDispatcher};
use herald_runtime::JobHandler;
use tracing::{info, warn};

/// Handles `notification.requested` events by fanning out to channels.
pub struct NotificationHandler {
    dispatcher: Arc<NotificationDispatcher>,
}

impl NotificationHandler {
    /// Creates a handler over the channel dispatcher.
    pub fn new(dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl EventHandler for NotificationHandler {
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        // A payload that is valid JSON but the wrong shape is a producer
        // bug; failing here routes it to the dead-letter sink.
        let request: NotificationRequest = serde_json::from_slice(&event.payload)?;

        let result = self.dispatcher.dispatch(&request).await?;
        if result.has_failures() {
            // Partial failure is recorded per channel, not retried: a
            // retry would re-send through the channels that succeeded.
            warn!(
                user_id = %request.user_id,
                failed = result.count(herald_core::OutcomeStatus::Failed),
                "notification delivered partially"
            );
        }
        Ok(())
    }
}

/// Forwards domain events to subscribed webhook receivers.
pub struct WebhookForwardHandler {
    dispatcher: Arc<WebhookDispatcher>,
}

impl WebhookForwardHandler {
    /// Creates a handler over the webhook dispatcher.
    pub fn new(dispatcher: Arc<WebhookDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl EventHandler for WebhookForwardHandler {
    async fn handle(&self, event: Event) -> anyhow::Result<()> {
        let attempts = self.dispatcher.dispatch(&event).await?;

        for attempt in &attempts {
            if attempt.state == AttemptState::Abandoned {
                warn!(
                    subscription_id = %attempt.subscription_id,
                    topic = %attempt.topic,
                    attempts = attempt.attempt_number,
                    error = attempt.last_error.as_deref().unwrap_or("unknown"),
                    "webhook delivery abandoned"
                );
            }
        }
        Ok(())
    }
}

/// Daily job publishing a digest trigger event onto the bus.
///
/// Digest assembly happens downstream; this job only marks the cycle so
/// the work flows through the same consumer pipeline as everything
/// else.
pub struct DigestJob {
    bus: Arc<dyn MessageBus>,
    clock: Arc<dyn Clock>,
    topic: String,
}

impl DigestJob {
    /// Creates the digest job publishing on the given topic.
    pub fn new(bus: Arc<dyn MessageBus>, clock: Arc<dyn Clock>, topic: impl Into<String>) -> Self {
        Self { bus, clock, topic: topic.into() }
    }
}

#[async_trait]
impl JobHandler for DigestJob {
    async fn run(&self) -> anyhow::Result<()> {
        let triggered_at = self.clock.now_utc();
        let payload = serde_json::json!({
            "kind": "daily_digest",
            "triggered_at": triggered_at.to_rfc3339(),
        })
        .to_string();

        self.bus.publish(&self.topic, "digest", Bytes::from(payload)).await?;
        info!(topic = %self.topic, %triggered_at, "digest cycle triggered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use herald_core::{InMemoryBus, TestClock};

    use super::*;

    #[tokio::test]
    async fn digest_job_publishes_a_trigger_event() {
        let clock = Arc::new(TestClock::new());
        let bus = Arc::new(InMemoryBus::new(clock.clone()));

        let job = DigestJob::new(bus.clone(), clock, "digest.due");
        job.run().await.expect("run");
        job.run().await.expect("run");

        assert_eq!(bus.published_count("digest.due"), 2);

        let batch = bus
            .poll("test", &["digest.due".to_string()], 10)
            .await
            .expect("poll");
        let payload: serde_json::Value =
            serde_json::from_slice(&batch[0].payload).expect("json payload");
        assert_eq!(payload["kind"], "daily_digest");
        assert!(payload["triggered_at"].is_string());
    }
}
