//! Outbound delivery: notification channels and signed webhooks.
//!
//! Two dispatch paths share one HTTP client. The notification
//! dispatcher fans a request out across a user's enabled channels and
//! records per-channel outcomes; the webhook dispatcher POSTs signed
//! event payloads to matching subscriptions with retry and backoff.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod client;
pub mod error;
pub mod notify;
pub mod signing;
pub mod webhook;

pub use channel::{ChannelAdapter, PushChannel, PushConfig, SmsChannel, SmsConfig};
pub use client::{ClientConfig, DeliveryClient, HttpRequest, HttpResponse, RequestBody};
pub use error::{DispatchError, Result};
pub use notify::NotificationDispatcher;
pub use webhook::WebhookDispatcher;
