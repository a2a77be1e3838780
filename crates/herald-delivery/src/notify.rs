//! Multi-channel notification dispatch.
//!
//! Resolves a notification request against the user's channel
//! preferences, fans out to the registered adapters concurrently, and
//! records one outcome per channel. Channels fail independently: a push
//! rejection never suppresses the SMS outcome.

use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::future::join_all;
use herald_core::{
    Channel, ChannelTarget, Clock, DeliveryOutcome, DeliveryResult, NotificationRequest,
    OutcomeStatus, PreferenceStore,
};
use tracing::{info, warn};

use crate::{channel::ChannelAdapter, error::Result};

/// Routes notifications to channel adapters by user preference.
pub struct NotificationDispatcher {
    adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
    preferences: Arc<dyn PreferenceStore>,
    clock: Arc<dyn Clock>,
    send_timeout: Duration,
}

impl NotificationDispatcher {
    /// Creates a dispatcher with no adapters registered.
    pub fn new(preferences: Arc<dyn PreferenceStore>, clock: Arc<dyn Clock>) -> Self {
        Self { adapters: HashMap::new(), preferences, clock, send_timeout: Duration::from_secs(30) }
    }

    /// Registers an adapter under its channel, replacing any previous one.
    pub fn register_adapter(mut self, adapter: Arc<dyn ChannelAdapter>) -> Self {
        self.adapters.insert(adapter.channel(), adapter);
        self
    }

    /// Overrides the per-channel send timeout.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Delivers a notification across the user's enabled channels.
    ///
    /// The request's explicit channel list narrows the user's stored
    /// preferences; an empty list means every enabled channel. A user
    /// with nothing enabled yields a no-channels result, not an error.
    /// Only the preference lookup can fail; per-channel failures are
    /// recorded in the outcomes.
    pub async fn dispatch(&self, request: &NotificationRequest) -> Result<DeliveryResult> {
        let stored = self.preferences.channel_targets(request.user_id).await?;

        let (targets, misses) = resolve_targets(&stored, &request.channels);
        if targets.is_empty() && misses.is_empty() {
            info!(user_id = %request.user_id, "user has no notification channels configured");
            return Ok(DeliveryResult::no_channels());
        }

        let mut outcomes: Vec<DeliveryOutcome> = misses
            .into_iter()
            .map(|channel| DeliveryOutcome {
                channel,
                target: String::new(),
                status: OutcomeStatus::Skipped,
                error: Some(format!("no {channel} target configured for user")),
                attempted_at: self.clock.now_utc(),
            })
            .collect();

        let attempts =
            join_all(targets.iter().map(|target| self.attempt(target, request))).await;
        outcomes.extend(attempts);

        let result = DeliveryResult { outcomes, note: None };
        info!(
            user_id = %request.user_id,
            sent = result.count(OutcomeStatus::Sent),
            failed = result.count(OutcomeStatus::Failed),
            skipped = result.count(OutcomeStatus::Skipped),
            "notification dispatched"
        );
        Ok(result)
    }

    async fn attempt(
        &self,
        target: &ChannelTarget,
        request: &NotificationRequest,
    ) -> DeliveryOutcome {
        let attempted_at = self.clock.now_utc();

        let Some(adapter) = self.adapters.get(&target.channel) else {
            warn!(channel = %target.channel, "no adapter registered for channel");
            return DeliveryOutcome {
                channel: target.channel,
                target: target.target.clone(),
                status: OutcomeStatus::Skipped,
                error: Some(format!("no adapter registered for channel {}", target.channel)),
                attempted_at,
            };
        };

        let send = adapter.send(&target.target, request);
        let (status, error) = match tokio::time::timeout(self.send_timeout, send).await {
            Ok(Ok(())) => (OutcomeStatus::Sent, None),
            Ok(Err(err)) => {
                warn!(channel = %target.channel, error = %err, "channel delivery failed");
                (OutcomeStatus::Failed, Some(err.to_string()))
            },
            Err(_) => {
                warn!(channel = %target.channel, "channel delivery timed out");
                (
                    OutcomeStatus::Failed,
                    Some(format!("timed out after {:?}", self.send_timeout)),
                )
            },
        };

        DeliveryOutcome {
            channel: target.channel,
            target: target.target.clone(),
            status,
            error,
            attempted_at,
        }
    }
}

/// Narrows stored targets by the request's explicit channel list.
///
/// Returns the targets to attempt plus the explicitly requested channels
/// the user has no target for.
fn resolve_targets(
    stored: &[ChannelTarget],
    requested: &[Channel],
) -> (Vec<ChannelTarget>, Vec<Channel>) {
    if requested.is_empty() {
        return (stored.to_vec(), Vec::new());
    }

    let mut targets = Vec::new();
    let mut misses = Vec::new();
    for channel in requested {
        match stored.iter().find(|t| t.channel == *channel) {
            Some(target) => targets.push(target.clone()),
            None => misses.push(*channel),
        }
    }
    (targets, misses)
}
