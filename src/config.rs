//! Configuration management for the herald background service.

use std::time::Duration;

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use herald_consumer::ConsumerConfig;
use herald_core::{BackoffStrategy, RetryPolicy};
use herald_delivery::{ClientConfig, PushConfig, SmsConfig};
use herald_runtime::SchedulerConfig;
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "config.toml";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`config.toml`)
/// 3. Built-in defaults (lowest priority)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Consumer
    /// Consumer group name for offset tracking.
    ///
    /// Environment variable: `CONSUMER_GROUP`
    #[serde(default = "default_consumer_group", alias = "CONSUMER_GROUP")]
    pub consumer_group: String,
    /// Maximum messages fetched per poll.
    ///
    /// Environment variable: `CONSUMER_BATCH_SIZE`
    #[serde(default = "default_batch_size", alias = "CONSUMER_BATCH_SIZE")]
    pub consumer_batch_size: usize,
    /// Idle wait between polls in milliseconds.
    ///
    /// Environment variable: `CONSUMER_POLL_INTERVAL_MS`
    #[serde(default = "default_poll_interval_ms", alias = "CONSUMER_POLL_INTERVAL_MS")]
    pub consumer_poll_interval_ms: u64,
    /// Topics carrying events to forward to webhook subscribers,
    /// comma-separated.
    ///
    /// Environment variable: `EVENT_TOPICS`
    #[serde(default = "default_event_topics", alias = "EVENT_TOPICS")]
    pub event_topics: String,
    /// Topic carrying notification requests.
    ///
    /// Environment variable: `NOTIFICATION_TOPIC`
    #[serde(default = "default_notification_topic", alias = "NOTIFICATION_TOPIC")]
    pub notification_topic: String,

    // Handler retry
    /// Maximum attempts per message before dead-lettering.
    ///
    /// Environment variable: `HANDLER_MAX_ATTEMPTS`
    #[serde(default = "default_handler_attempts", alias = "HANDLER_MAX_ATTEMPTS")]
    pub handler_max_attempts: u32,
    /// Base delay for handler retry backoff in milliseconds.
    ///
    /// Environment variable: `HANDLER_RETRY_BASE_DELAY_MS`
    #[serde(default = "default_handler_base_delay_ms", alias = "HANDLER_RETRY_BASE_DELAY_MS")]
    pub handler_retry_base_delay_ms: u64,
    /// Maximum delay between handler retries in milliseconds.
    ///
    /// Environment variable: `HANDLER_RETRY_MAX_DELAY_MS`
    #[serde(default = "default_handler_max_delay_ms", alias = "HANDLER_RETRY_MAX_DELAY_MS")]
    pub handler_retry_max_delay_ms: u64,

    // Webhook retry
    /// Maximum delivery attempts per webhook subscription.
    ///
    /// Environment variable: `WEBHOOK_MAX_ATTEMPTS`
    #[serde(default = "default_webhook_attempts", alias = "WEBHOOK_MAX_ATTEMPTS")]
    pub webhook_max_attempts: u32,
    /// Base delay for webhook retry backoff in milliseconds.
    ///
    /// Environment variable: `WEBHOOK_RETRY_BASE_DELAY_MS`
    #[serde(default = "default_webhook_base_delay_ms", alias = "WEBHOOK_RETRY_BASE_DELAY_MS")]
    pub webhook_retry_base_delay_ms: u64,
    /// Maximum delay between webhook retries in milliseconds.
    ///
    /// Environment variable: `WEBHOOK_RETRY_MAX_DELAY_MS`
    #[serde(default = "default_webhook_max_delay_ms", alias = "WEBHOOK_RETRY_MAX_DELAY_MS")]
    pub webhook_retry_max_delay_ms: u64,
    /// Jitter factor for retry timing (0.0 to 1.0).
    ///
    /// Environment variable: `WEBHOOK_RETRY_JITTER_FACTOR`
    #[serde(default = "default_jitter_factor", alias = "WEBHOOK_RETRY_JITTER_FACTOR")]
    pub webhook_retry_jitter_factor: f64,

    // Delivery
    /// HTTP timeout for outbound delivery in seconds.
    ///
    /// Environment variable: `DELIVERY_TIMEOUT_SECONDS`
    #[serde(default = "default_delivery_timeout", alias = "DELIVERY_TIMEOUT_SECONDS")]
    pub delivery_timeout_seconds: u64,
    /// Push gateway endpoint URL.
    ///
    /// Environment variable: `PUSH_ENDPOINT_URL`
    #[serde(default = "default_push_endpoint", alias = "PUSH_ENDPOINT_URL")]
    pub push_endpoint_url: String,
    /// SMS provider message endpoint URL.
    ///
    /// Environment variable: `SMS_ENDPOINT_URL`
    #[serde(default = "default_sms_endpoint", alias = "SMS_ENDPOINT_URL")]
    pub sms_endpoint_url: String,
    /// SMS provider account identifier.
    ///
    /// Environment variable: `SMS_ACCOUNT_SID`
    #[serde(default, alias = "SMS_ACCOUNT_SID")]
    pub sms_account_sid: String,
    /// SMS provider auth token.
    ///
    /// Environment variable: `SMS_AUTH_TOKEN`
    #[serde(default, alias = "SMS_AUTH_TOKEN")]
    pub sms_auth_token: String,
    /// Sender phone number for SMS.
    ///
    /// Environment variable: `SMS_FROM_NUMBER`
    #[serde(default, alias = "SMS_FROM_NUMBER")]
    pub sms_from_number: String,

    // Scheduler
    /// Hour (UTC) at which the daily digest job runs.
    ///
    /// Environment variable: `DIGEST_HOUR`
    #[serde(default = "default_digest_hour", alias = "DIGEST_HOUR")]
    pub digest_hour: u32,
    /// Minute at which the daily digest job runs.
    ///
    /// Environment variable: `DIGEST_MINUTE`
    #[serde(default = "default_digest_minute", alias = "DIGEST_MINUTE")]
    pub digest_minute: u32,

    // Shutdown
    /// Grace period for in-flight work during shutdown, in seconds.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECONDS`
    #[serde(default = "default_shutdown_timeout", alias = "SHUTDOWN_TIMEOUT_SECONDS")]
    pub shutdown_timeout_seconds: u64,

    // Logging
    /// Log level configuration.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level", alias = "RUST_LOG")]
    pub rust_log: String,
}

impl Config {
    /// Load configuration from defaults, config file, and environment
    /// variable overrides.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Event topics as a list, trimmed and de-blanked.
    pub fn event_topic_list(&self) -> Vec<String> {
        self.event_topics
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Convert to the consumer framework's configuration.
    pub fn to_consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            group: self.consumer_group.clone(),
            batch_size: self.consumer_batch_size,
            poll_interval: Duration::from_millis(self.consumer_poll_interval_ms),
            handler_retry: RetryPolicy {
                max_attempts: self.handler_max_attempts,
                base_delay: Duration::from_millis(self.handler_retry_base_delay_ms),
                max_delay: Duration::from_millis(self.handler_retry_max_delay_ms),
                jitter_factor: self.webhook_retry_jitter_factor,
                backoff_strategy: BackoffStrategy::Exponential,
            },
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_seconds),
        }
    }

    /// Convert to the webhook dispatcher's retry policy.
    pub fn to_webhook_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.webhook_max_attempts,
            base_delay: Duration::from_millis(self.webhook_retry_base_delay_ms),
            max_delay: Duration::from_millis(self.webhook_retry_max_delay_ms),
            jitter_factor: self.webhook_retry_jitter_factor,
            backoff_strategy: BackoffStrategy::Exponential,
        }
    }

    /// Convert to the HTTP client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.delivery_timeout_seconds),
            user_agent: "Herald/1.0".to_string(),
            max_redirects: 3,
            verify_tls: true,
        }
    }

    /// Convert to the scheduler configuration.
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_seconds),
        }
    }

    /// Convert to the push adapter configuration.
    pub fn to_push_config(&self) -> PushConfig {
        PushConfig { endpoint_url: self.push_endpoint_url.clone() }
    }

    /// Convert to the SMS adapter configuration.
    pub fn to_sms_config(&self) -> SmsConfig {
        SmsConfig {
            endpoint_url: self.sms_endpoint_url.clone(),
            account_sid: self.sms_account_sid.clone(),
            auth_token: self.sms_auth_token.clone(),
            from_number: self.sms_from_number.clone(),
        }
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.consumer_group.is_empty() {
            anyhow::bail!("consumer_group cannot be empty");
        }

        if self.consumer_batch_size == 0 {
            anyhow::bail!("consumer_batch_size must be greater than 0");
        }

        if self.event_topic_list().is_empty() && self.notification_topic.is_empty() {
            anyhow::bail!("at least one topic must be configured");
        }

        if self.handler_max_attempts == 0 {
            anyhow::bail!("handler_max_attempts must be greater than 0");
        }

        if self.webhook_max_attempts == 0 {
            anyhow::bail!("webhook_max_attempts must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.webhook_retry_jitter_factor) {
            anyhow::bail!("webhook_retry_jitter_factor must be between 0.0 and 1.0");
        }

        if self.digest_hour > 23 || self.digest_minute > 59 {
            anyhow::bail!("digest time must be a valid HH:MM");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            consumer_group: default_consumer_group(),
            consumer_batch_size: default_batch_size(),
            consumer_poll_interval_ms: default_poll_interval_ms(),
            event_topics: default_event_topics(),
            notification_topic: default_notification_topic(),
            handler_max_attempts: default_handler_attempts(),
            handler_retry_base_delay_ms: default_handler_base_delay_ms(),
            handler_retry_max_delay_ms: default_handler_max_delay_ms(),
            webhook_max_attempts: default_webhook_attempts(),
            webhook_retry_base_delay_ms: default_webhook_base_delay_ms(),
            webhook_retry_max_delay_ms: default_webhook_max_delay_ms(),
            webhook_retry_jitter_factor: default_jitter_factor(),
            delivery_timeout_seconds: default_delivery_timeout(),
            push_endpoint_url: default_push_endpoint(),
            sms_endpoint_url: default_sms_endpoint(),
            sms_account_sid: String::new(),
            sms_auth_token: String::new(),
            sms_from_number: String::new(),
            digest_hour: default_digest_hour(),
            digest_minute: default_digest_minute(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
            rust_log: default_log_level(),
        }
    }
}

fn default_consumer_group() -> String {
    "herald-workers".to_string()
}

fn default_batch_size() -> usize {
    25
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_event_topics() -> String {
    "item.created,item.deleted".to_string()
}

fn default_notification_topic() -> String {
    "notification.requested".to_string()
}

fn default_handler_attempts() -> u32 {
    3
}

fn default_handler_base_delay_ms() -> u64 {
    1000
}

fn default_handler_max_delay_ms() -> u64 {
    30_000
}

fn default_webhook_attempts() -> u32 {
    5
}

fn default_webhook_base_delay_ms() -> u64 {
    1000
}

fn default_webhook_max_delay_ms() -> u64 {
    300_000
}

fn default_jitter_factor() -> f64 {
    0.25
}

fn default_delivery_timeout() -> u64 {
    30
}

fn default_push_endpoint() -> String {
    "http://localhost:8081/push".to_string()
}

fn default_sms_endpoint() -> String {
    "http://localhost:8082/messages".to_string()
}

fn default_digest_hour() -> u32 {
    8
}

fn default_digest_minute() -> u32 {
    0
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info,herald=debug".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn topic_list_is_trimmed_and_filtered() {
        let config = Config {
            event_topics: "item.created, item.deleted,,  user.created ".to_string(),
            ..Default::default()
        };
        assert_eq!(config.event_topic_list(), vec![
            "item.created",
            "item.deleted",
            "user.created"
        ]);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = Config { consumer_batch_size: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_jitter_is_rejected() {
        let config = Config { webhook_retry_jitter_factor: 1.5, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_digest_time_is_rejected() {
        let config = Config { digest_hour: 24, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_log_filter_is_a_valid_directive() {
        let config = Config::default();
        assert!(tracing_subscriber::EnvFilter::try_new(&config.rust_log).is_ok());
    }

    #[test]
    fn retry_policies_map_from_raw_fields() {
        let config = Config::default();

        let webhook = config.to_webhook_retry_policy();
        assert_eq!(webhook.max_attempts, 5);
        assert_eq!(webhook.base_delay, Duration::from_secs(1));
        assert_eq!(webhook.max_delay, Duration::from_secs(300));

        let consumer = config.to_consumer_config();
        assert_eq!(consumer.group, "herald-workers");
        assert_eq!(consumer.handler_retry.max_attempts, 3);
    }
}
