//! Core domain models and strongly-typed identifiers.
//!
//! Defines bus events, notification requests, per-channel delivery outcomes,
//! webhook subscriptions, and the delivery-attempt state machine, along with
//! newtype ID wrappers for compile-time type safety.

use std::{collections::HashSet, fmt};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Strongly-typed user identifier.
///
/// Wraps a UUID to prevent mixing with other ID types. Users are owned by
/// the application layer; herald only resolves their delivery preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Creates a new random user ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UserId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Strongly-typed webhook subscription identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    /// Creates a new random subscription ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SubscriptionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A domain event read from the message bus.
///
/// Immutable once published. The topic determines handler routing; the key
/// scopes the ordering guarantee: events sharing a key are handled in
/// publish order, events with different keys may be processed concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Named event category used for routing.
    pub topic: String,

    /// Partition key scoping the ordering guarantee.
    pub key: String,

    /// Opaque payload, JSON by producer/consumer convention.
    pub payload: Bytes,

    /// When the producer published the event.
    pub produced_at: DateTime<Utc>,
}

impl Event {
    /// Creates an event with the given topic, key, and payload.
    pub fn new(
        topic: impl Into<String>,
        key: impl Into<String>,
        payload: impl Into<Bytes>,
        produced_at: DateTime<Utc>,
    ) -> Self {
        Self { topic: topic.into(), key: key.into(), payload: payload.into(), produced_at }
    }
}

/// Notification delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Mobile push notification.
    Push,
    /// SMS text message.
    Sms,
}

impl Channel {
    /// Returns the lowercase string form used in logs and config.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Sms => "sms",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A channel together with the address deliveries go to.
///
/// The target is channel-specific: a device token for push, a phone number
/// for SMS. Stored per user by the preference store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelTarget {
    /// The delivery channel.
    pub channel: Channel,
    /// Channel-specific destination address.
    pub target: String,
}

impl ChannelTarget {
    /// Creates a channel target.
    pub fn new(channel: Channel, target: impl Into<String>) -> Self {
        Self { channel, target: target.into() }
    }
}

/// A request to notify one user across one or more channels.
///
/// When `channels` is empty the dispatcher resolves the user's enabled
/// channels from the preference store instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// The user to notify.
    pub user_id: UserId,

    /// Explicit channels to use; empty means "use stored preferences".
    #[serde(default)]
    pub channels: Vec<Channel>,

    /// Short notification title.
    pub title: String,

    /// Notification body text.
    pub body: String,

    /// Free-form metadata forwarded to channel adapters.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Terminal status of a single (notification, channel) delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The adapter accepted the message.
    Sent,
    /// The adapter failed or timed out.
    Failed,
    /// No adapter or target was available for the channel.
    Skipped,
}

impl OutcomeStatus {
    /// Returns the lowercase string form used in logs.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one channel's delivery attempt for a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    /// The channel attempted.
    pub channel: Channel,

    /// The channel-specific target address.
    pub target: String,

    /// Whether the delivery was sent, failed, or skipped.
    pub status: OutcomeStatus,

    /// Error description for failed or skipped outcomes.
    pub error: Option<String>,

    /// When the attempt was made.
    pub attempted_at: DateTime<Utc>,
}

/// Notes attached to a delivery result for expected steady states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryNote {
    /// The user has no channels enabled; not an error.
    NoChannelsConfigured,
}

/// Aggregated result for a whole notification request.
///
/// One outcome per resolved (channel, target) pair. Partial delivery is the
/// expected shape: a failed channel never suppresses the others' outcomes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// Per-channel outcomes, order-insensitive.
    pub outcomes: Vec<DeliveryOutcome>,

    /// Steady-state note, e.g. when the user opted out of all channels.
    pub note: Option<DeliveryNote>,
}

impl DeliveryResult {
    /// Result for a user with no channels configured.
    pub fn no_channels() -> Self {
        Self { outcomes: Vec::new(), note: Some(DeliveryNote::NoChannelsConfigured) }
    }

    /// Number of outcomes with the given status.
    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// True if at least one channel failed.
    pub fn has_failures(&self) -> bool {
        self.count(OutcomeStatus::Failed) > 0
    }
}

/// A registered webhook receiver, read-only to this core.
///
/// Owned by the application's subscription store; herald only matches
/// subscriptions by topic and delivers to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSubscription {
    /// Unique identifier for this subscription.
    pub id: SubscriptionId,

    /// HTTP endpoint events are POSTed to.
    pub endpoint_url: String,

    /// Shared secret used to sign delivered payloads.
    pub secret: String,

    /// Topics this subscriber wants to receive.
    pub subscribed_topics: HashSet<String>,

    /// Inactive subscriptions are never dispatched to.
    pub active: bool,
}

impl WebhookSubscription {
    /// True if this subscription should receive events on `topic`.
    pub fn matches(&self, topic: &str) -> bool {
        self.active && self.subscribed_topics.contains(topic)
    }
}

/// State machine for a webhook delivery attempt.
///
/// `Pending -> Retrying -> Delivered | Abandoned`. Terminal states are never
/// left: an abandoned attempt is surfaced to operators, never retried
/// automatically, and a delivered attempt is never re-sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    /// First attempt not yet resolved.
    Pending,
    /// At least one attempt failed; a retry is scheduled.
    Retrying,
    /// The receiver returned 2xx.
    Delivered,
    /// Retries exhausted; set aside for operator inspection.
    Abandoned,
}

impl AttemptState {
    /// Returns the lowercase string form used in logs.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retrying => "retrying",
            Self::Delivered => "delivered",
            Self::Abandoned => "abandoned",
        }
    }

    /// True for `Delivered` and `Abandoned`.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Abandoned)
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracked delivery lifecycle for one (subscription, event) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDeliveryAttempt {
    /// Unique identifier for this delivery lifecycle.
    pub id: Uuid,

    /// Subscription being delivered to.
    pub subscription_id: SubscriptionId,

    /// Topic of the event being delivered.
    pub topic: String,

    /// Partition key of the event being delivered.
    pub event_key: String,

    /// Number of HTTP attempts made so far (1-based once dispatched).
    pub attempt_number: u32,

    /// Current lifecycle state.
    pub state: AttemptState,

    /// When the next retry is due, while in `Retrying`.
    pub next_retry_at: Option<DateTime<Utc>>,

    /// Last failure description, if any attempt failed.
    pub last_error: Option<String>,
}

impl WebhookDeliveryAttempt {
    /// Creates a fresh pending attempt for a subscription and event.
    pub fn new(subscription_id: SubscriptionId, event: &Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscription_id,
            topic: event.topic.clone(),
            event_key: event.key.clone(),
            attempt_number: 0,
            state: AttemptState::Pending,
            next_retry_at: None,
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn subscription_matching_requires_active_and_topic() {
        let mut sub = WebhookSubscription {
            id: SubscriptionId::new(),
            endpoint_url: "https://example.com/hook".to_string(),
            secret: "s3cret".to_string(),
            subscribed_topics: ["item.created".to_string()].into_iter().collect(),
            active: true,
        };

        assert!(sub.matches("item.created"));
        assert!(!sub.matches("user.signed_up"));

        sub.active = false;
        assert!(!sub.matches("item.created"));
    }

    #[test]
    fn attempt_states_classify_terminal() {
        assert!(!AttemptState::Pending.is_terminal());
        assert!(!AttemptState::Retrying.is_terminal());
        assert!(AttemptState::Delivered.is_terminal());
        assert!(AttemptState::Abandoned.is_terminal());
    }

    #[test]
    fn delivery_result_counts_outcomes() {
        let now = Utc::now();
        let result = DeliveryResult {
            outcomes: vec![
                DeliveryOutcome {
                    channel: Channel::Push,
                    target: "token-1".to_string(),
                    status: OutcomeStatus::Failed,
                    error: Some("provider 500".to_string()),
                    attempted_at: now,
                },
                DeliveryOutcome {
                    channel: Channel::Sms,
                    target: "+15550100".to_string(),
                    status: OutcomeStatus::Sent,
                    error: None,
                    attempted_at: now,
                },
            ],
            note: None,
        };

        assert_eq!(result.count(OutcomeStatus::Sent), 1);
        assert_eq!(result.count(OutcomeStatus::Failed), 1);
        assert!(result.has_failures());
    }

    #[test]
    fn no_channels_result_is_not_a_failure() {
        let result = DeliveryResult::no_channels();
        assert!(result.outcomes.is_empty());
        assert_eq!(result.note, Some(DeliveryNote::NoChannelsConfigured));
        assert!(!result.has_failures());
    }

    #[test]
    fn notification_request_deserializes_with_defaults() {
        let raw = serde_json::json!({
            "user_id": Uuid::new_v4(),
            "title": "New item",
            "body": "An item you follow was created",
        });

        let request: NotificationRequest = serde_json::from_value(raw).expect("valid request");
        assert!(request.channels.is_empty());
        assert!(request.metadata.is_null());
    }
}
