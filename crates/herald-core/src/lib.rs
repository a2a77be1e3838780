//! Core domain models and shared primitives for the herald background
//! processing system.
//!
//! Provides strongly-typed domain primitives (events, notification requests,
//! delivery outcomes), the clock abstraction used for deterministic testing,
//! the shared retry policy, and the traits through which herald consumes its
//! external collaborators (message bus, preference and subscription stores).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bus;
pub mod error;
pub mod models;
pub mod retry;
pub mod stores;
pub mod time;

pub use bus::{BusMessage, InMemoryBus, MessageBus};
pub use error::{CoreError, Result};
pub use models::{
    AttemptState, Channel, ChannelTarget, DeliveryNote, DeliveryOutcome, DeliveryResult, Event,
    NotificationRequest, OutcomeStatus, SubscriptionId, UserId, WebhookDeliveryAttempt,
    WebhookSubscription,
};
pub use retry::{BackoffStrategy, RetryDecision, RetryPolicy};
pub use stores::{InMemoryPreferences, InMemorySubscriptions, PreferenceStore, SubscriptionStore};
pub use time::{Clock, RealClock, TestClock};
