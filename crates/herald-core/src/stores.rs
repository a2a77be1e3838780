//! External-collaborator store traits.
//!
//! User channel preferences and webhook subscriptions live in the
//! application's persistence layer; herald only reads them through these
//! traits. The in-memory implementations back tests and local runs.

use std::{
    collections::HashMap,
    sync::{Mutex, RwLock},
};

use async_trait::async_trait;

use crate::{
    error::Result,
    models::{ChannelTarget, UserId, WebhookSubscription},
};

/// Read-only lookup of a user's enabled notification channels.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Channel targets the user has enabled, empty if the user opted out.
    async fn channel_targets(&self, user_id: UserId) -> Result<Vec<ChannelTarget>>;
}

/// Read-only lookup of active webhook subscriptions by topic.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Active subscriptions whose topic set contains `topic`.
    async fn active_for_topic(&self, topic: &str) -> Result<Vec<WebhookSubscription>>;
}

/// In-memory preference store for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryPreferences {
    targets: RwLock<HashMap<UserId, Vec<ChannelTarget>>>,
}

impl InMemoryPreferences {
    /// Creates an empty preference store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the channel targets stored for a user.
    pub fn set_targets(&self, user_id: UserId, targets: Vec<ChannelTarget>) {
        self.targets.write().unwrap_or_else(|e| e.into_inner()).insert(user_id, targets);
    }
}

#[async_trait]
impl PreferenceStore for InMemoryPreferences {
    async fn channel_targets(&self, user_id: UserId) -> Result<Vec<ChannelTarget>> {
        let targets = self.targets.read().unwrap_or_else(|e| e.into_inner());
        Ok(targets.get(&user_id).cloned().unwrap_or_default())
    }
}

/// In-memory subscription store for tests and local runs.
#[derive(Default)]
pub struct InMemorySubscriptions {
    subscriptions: Mutex<Vec<WebhookSubscription>>,
}

impl InMemorySubscriptions {
    /// Creates an empty subscription store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscription.
    pub fn insert(&self, subscription: WebhookSubscription) {
        self.subscriptions.lock().unwrap_or_else(|e| e.into_inner()).push(subscription);
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptions {
    async fn active_for_topic(&self, topic: &str) -> Result<Vec<WebhookSubscription>> {
        let subscriptions = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        Ok(subscriptions.iter().filter(|s| s.matches(topic)).cloned().collect())
    }
}
