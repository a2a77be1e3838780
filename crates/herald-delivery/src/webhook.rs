//! Signed webhook dispatch with per-subscription retry.
//!
//! Every active subscription on an event's topic gets the raw payload
//! POSTed with a timestamped HMAC signature. Subscriptions are delivered
//! independently and concurrently; each follows the retry policy through
//! the attempt state machine until `Delivered` or `Abandoned`.

use std::{
    sync::Arc,
    time::{Duration, UNIX_EPOCH},
};

use futures::future::join_all;
use herald_core::{
    AttemptState, Clock, Event, RetryDecision, RetryPolicy, SubscriptionStore,
    WebhookDeliveryAttempt, WebhookSubscription,
};
use tracing::{error, info, warn};

use crate::{
    client::{DeliveryClient, HttpRequest, RequestBody},
    error::Result,
    signing,
};

/// Header carrying the event's topic.
pub const TOPIC_HEADER: &str = "X-Herald-Topic";

/// Header carrying the event's partition key.
pub const EVENT_KEY_HEADER: &str = "X-Herald-Event-Key";

/// Delivers events to matching webhook subscriptions.
pub struct WebhookDispatcher {
    client: DeliveryClient,
    subscriptions: Arc<dyn SubscriptionStore>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl WebhookDispatcher {
    /// Creates a dispatcher with the default retry policy.
    pub fn new(
        client: DeliveryClient,
        subscriptions: Arc<dyn SubscriptionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { client, subscriptions, policy: RetryPolicy::default(), clock }
    }

    /// Overrides the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Dispatches an event to every active subscription on its topic.
    ///
    /// Returns one terminal attempt record per matched subscription.
    /// Receiver failures never surface as errors here; a subscription
    /// that exhausts its retries ends `Abandoned` in its record. Only
    /// the subscription lookup can fail.
    pub async fn dispatch(&self, event: &Event) -> Result<Vec<WebhookDeliveryAttempt>> {
        let matched = self.subscriptions.active_for_topic(&event.topic).await?;
        if matched.is_empty() {
            return Ok(Vec::new());
        }

        let attempts =
            join_all(matched.iter().map(|sub| self.deliver_with_retry(sub, event))).await;
        Ok(attempts)
    }

    /// Drives one subscription through the attempt state machine.
    async fn deliver_with_retry(
        &self,
        subscription: &WebhookSubscription,
        event: &Event,
    ) -> WebhookDeliveryAttempt {
        let mut attempt = WebhookDeliveryAttempt::new(subscription.id, event);

        loop {
            attempt.attempt_number += 1;

            match self.send_once(subscription, event).await {
                Ok(()) => {
                    attempt.state = AttemptState::Delivered;
                    attempt.next_retry_at = None;
                    info!(
                        subscription_id = %subscription.id,
                        topic = %event.topic,
                        attempt = attempt.attempt_number,
                        "webhook delivered"
                    );
                    return attempt;
                },
                Err(err) => {
                    attempt.last_error = Some(err.to_string());

                    if !err.is_retryable() {
                        attempt.state = AttemptState::Abandoned;
                        attempt.next_retry_at = None;
                        error!(
                            subscription_id = %subscription.id,
                            topic = %event.topic,
                            error = %err,
                            "webhook delivery failed permanently"
                        );
                        return attempt;
                    }

                    match self.policy.decide(attempt.attempt_number, self.clock.now_utc()) {
                        RetryDecision::Retry { next_attempt_at } => {
                            attempt.state = AttemptState::Retrying;
                            attempt.next_retry_at = Some(next_attempt_at);
                            warn!(
                                subscription_id = %subscription.id,
                                topic = %event.topic,
                                attempt = attempt.attempt_number,
                                error = %err,
                                retry_at = %next_attempt_at,
                                "webhook delivery failed, retrying"
                            );
                            let delay = self.policy.delay_for_attempt(attempt.attempt_number);
                            self.clock.sleep(delay).await;
                        },
                        RetryDecision::GiveUp { reason } => {
                            attempt.state = AttemptState::Abandoned;
                            attempt.next_retry_at = None;
                            error!(
                                subscription_id = %subscription.id,
                                topic = %event.topic,
                                attempts = attempt.attempt_number,
                                error = %err,
                                reason = %reason,
                                "webhook delivery abandoned"
                            );
                            return attempt;
                        },
                    }
                },
            }
        }
    }

    /// Sends one signed POST to the subscription's endpoint.
    async fn send_once(
        &self,
        subscription: &WebhookSubscription,
        event: &Event,
    ) -> crate::error::Result<()> {
        let timestamp = self
            .clock
            .now_system()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        let signature = signing::sign(subscription.secret.as_bytes(), timestamp, &event.payload);

        let mut request = HttpRequest::new(
            &subscription.endpoint_url,
            RequestBody::Raw {
                content_type: "application/json".to_string(),
                bytes: event.payload.clone(),
            },
        );
        request.headers = vec![
            (signing::SIGNATURE_HEADER.to_string(), signature),
            (signing::TIMESTAMP_HEADER.to_string(), timestamp.to_string()),
            (TOPIC_HEADER.to_string(), event.topic.clone()),
            (EVENT_KEY_HEADER.to_string(), event.key.clone()),
        ];

        let response = self.client.post(request).await?;
        if response.is_success {
            Ok(())
        } else {
            Err(crate::error::DispatchError::http_status(response.status_code, response.body))
        }
    }
}
