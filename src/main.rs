//! Herald background-processing service.
//!
//! Main entry point. Wires the message bus, consumer handlers, delivery
//! dispatchers, and scheduled jobs into a supervisor and coordinates
//! graceful startup and shutdown.

mod config;
mod handlers;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use herald_consumer::ConsumerFramework;
use herald_core::{
    Clock, InMemoryBus, InMemoryPreferences, InMemorySubscriptions, MessageBus, RealClock,
};
use herald_delivery::{
    DeliveryClient, NotificationDispatcher, PushChannel, SmsChannel, WebhookDispatcher,
};
use herald_runtime::{Cadence, Scheduler, Supervisor};
use tracing::info;

use crate::{
    config::Config,
    handlers::{DigestJob, NotificationHandler, WebhookForwardHandler},
};

/// Topic the daily digest job publishes its trigger events on.
const DIGEST_TOPIC: &str = "digest.due";

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log);

    info!("Starting herald background service");
    info!(
        consumer_group = %config.consumer_group,
        notification_topic = %config.notification_topic,
        event_topics = ?config.event_topic_list(),
        "Configuration loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(RealClock::new());

    // In-memory infrastructure; deployments substitute broker- and
    // database-backed implementations behind the same traits.
    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new(clock.clone()));
    let preferences = Arc::new(InMemoryPreferences::new());
    let subscriptions = Arc::new(InMemorySubscriptions::new());

    let client = DeliveryClient::new(config.to_client_config())?;
    let notifications = Arc::new(
        NotificationDispatcher::new(preferences, clock.clone())
            .register_adapter(Arc::new(PushChannel::new(client.clone(), config.to_push_config())))
            .register_adapter(Arc::new(SmsChannel::new(client.clone(), config.to_sms_config())))
            .with_send_timeout(Duration::from_secs(config.delivery_timeout_seconds)),
    );
    let webhooks = Arc::new(
        WebhookDispatcher::new(client, subscriptions, clock.clone())
            .with_retry_policy(config.to_webhook_retry_policy()),
    );

    let mut consumer =
        ConsumerFramework::new(bus.clone(), config.to_consumer_config(), clock.clone());
    consumer.subscribe(
        &config.notification_topic,
        Arc::new(NotificationHandler::new(notifications)),
    )?;

    let forward = Arc::new(WebhookForwardHandler::new(webhooks));
    for topic in config.event_topic_list() {
        consumer.subscribe(topic, forward.clone())?;
    }
    consumer.subscribe(DIGEST_TOPIC, forward)?;

    let scheduler = Scheduler::new(config.to_scheduler_config(), clock.clone());
    scheduler
        .register(
            "daily-digest",
            Cadence::Daily { hour: config.digest_hour, minute: config.digest_minute },
            Arc::new(DigestJob::new(bus.clone(), clock.clone(), DIGEST_TOPIC)),
        )
        .await?;

    let mut supervisor = Supervisor::new(scheduler, consumer);
    supervisor.start().await?;
    info!("Herald is processing events");

    shutdown_signal().await;
    info!("Shutdown signal received, starting graceful shutdown");

    supervisor.shutdown().await?;
    info!("Herald shutdown complete");
    Ok(())
}

/// Initializes tracing.
///
/// `RUST_LOG` in the environment wins; otherwise the configured filter
/// applies.
fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer().with_target(true).with_thread_ids(true).with_thread_names(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
