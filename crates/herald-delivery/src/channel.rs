//! Notification channel adapters.
//!
//! Each adapter knows how to hand one notification to one provider.
//! The dispatcher stays provider-agnostic and talks to adapters through
//! [`ChannelAdapter`] only, so adding a channel means adding an adapter
//! and registering it.

use async_trait::async_trait;
use herald_core::{Channel, NotificationRequest};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    client::{DeliveryClient, HttpRequest, RequestBody},
    error::{DispatchError, Result},
};

/// Sends one notification to one target over a specific channel.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Channel this adapter serves.
    fn channel(&self) -> Channel;

    /// Delivers the notification to the target.
    async fn send(&self, target: &str, notification: &NotificationRequest) -> Result<()>;
}

/// Push gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Gateway endpoint receiving push sends.
    pub endpoint_url: String,
}

/// Push notifications via an HTTP gateway.
///
/// Posts the device token and notification content as JSON; any
/// non-success status is a provider rejection.
#[derive(Debug, Clone)]
pub struct PushChannel {
    client: DeliveryClient,
    config: PushConfig,
}

impl PushChannel {
    /// Creates a push adapter over the shared client.
    pub fn new(client: DeliveryClient, config: PushConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ChannelAdapter for PushChannel {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    async fn send(&self, target: &str, notification: &NotificationRequest) -> Result<()> {
        let body = serde_json::json!({
            "device_token": target,
            "title": notification.title,
            "body": notification.body,
            "metadata": notification.metadata,
        });

        let response =
            self.client.post(HttpRequest::new(&self.config.endpoint_url, RequestBody::Json(body))).await?;
        if !response.is_success {
            return Err(DispatchError::provider(format!(
                "push gateway returned HTTP {}: {}",
                response.status_code, response.body
            )));
        }

        debug!(user_id = %notification.user_id, "push notification accepted");
        Ok(())
    }
}

/// SMS provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    /// Provider message endpoint.
    pub endpoint_url: String,
    /// Account identifier, used as the basic-auth user.
    pub account_sid: String,
    /// Auth token, used as the basic-auth password.
    pub auth_token: String,
    /// Sender phone number.
    pub from_number: String,
}

/// SMS via a provider speaking the form-encoded messages API.
#[derive(Debug, Clone)]
pub struct SmsChannel {
    client: DeliveryClient,
    config: SmsConfig,
}

impl SmsChannel {
    /// Creates an SMS adapter over the shared client.
    pub fn new(client: DeliveryClient, config: SmsConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl ChannelAdapter for SmsChannel {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, target: &str, notification: &NotificationRequest) -> Result<()> {
        let form = vec![
            ("To".to_string(), target.to_string()),
            ("From".to_string(), self.config.from_number.clone()),
            ("Body".to_string(), format!("{}: {}", notification.title, notification.body)),
        ];

        let mut request = HttpRequest::new(&self.config.endpoint_url, RequestBody::Form(form));
        request.basic_auth =
            Some((self.config.account_sid.clone(), self.config.auth_token.clone()));

        let response = self.client.post(request).await?;
        if !response.is_success {
            return Err(DispatchError::provider(format!(
                "sms provider returned HTTP {}: {}",
                response.status_code, response.body
            )));
        }

        debug!(user_id = %notification.user_id, "sms accepted by provider");
        Ok(())
    }
}
