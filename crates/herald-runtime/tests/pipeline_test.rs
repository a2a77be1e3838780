//! Supervisor wiring test: a scheduled job produces events the
//! supervised consumer picks up off the bus.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::Bytes;
use herald_core::{InMemoryBus, MessageBus, TestClock};
use herald_consumer::{handler_fn, ConsumerConfig, ConsumerFramework};
use herald_runtime::{job_fn, Cadence, Scheduler, SchedulerConfig, Supervisor};

const DIGEST_TOPIC: &str = "digest.due";

#[tokio::test]
async fn scheduled_job_feeds_the_consumer_through_the_bus() {
    let clock = Arc::new(TestClock::new());
    let bus = Arc::new(InMemoryBus::new(clock.clone()));

    let processed = Arc::new(AtomicU64::new(0));
    let mut consumer = ConsumerFramework::new(bus.clone(), ConsumerConfig::default(), clock.clone());
    consumer
        .subscribe(DIGEST_TOPIC, {
            let processed = processed.clone();
            Arc::new(handler_fn(move |_event| {
                let processed = processed.clone();
                async move {
                    processed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }))
        })
        .expect("subscribe");

    let scheduler = Scheduler::new(SchedulerConfig::default(), clock.clone());
    scheduler
        .register("digest-producer", Cadence::Every(Duration::from_secs(60)), {
            let bus = bus.clone();
            Arc::new(job_fn(move || {
                let bus = bus.clone();
                async move {
                    let payload = serde_json::json!({ "kind": "digest" }).to_string();
                    bus.publish(DIGEST_TOPIC, "digest", Bytes::from(payload)).await?;
                    Ok(())
                }
            }))
        })
        .await
        .expect("register");

    let mut supervisor = Supervisor::new(scheduler, consumer);
    supervisor.start().await.expect("start");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while processed.load(Ordering::SeqCst) < 2 {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for digest events");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    supervisor.shutdown().await.expect("shutdown");

    assert!(bus.published_count(DIGEST_TOPIC) >= 2);
    let committed = bus.committed_offset("herald-workers", DIGEST_TOPIC).unwrap_or(0);
    assert!(committed >= 2, "consumed digest events must be committed");
}

#[tokio::test]
async fn failed_start_leaves_nothing_running() {
    let clock = Arc::new(TestClock::new());
    let bus = Arc::new(InMemoryBus::new(clock.clone()));

    // no handlers registered, so the consumer rejects startup
    let consumer = ConsumerFramework::new(bus, ConsumerConfig::default(), clock.clone());
    let scheduler = Scheduler::new(SchedulerConfig::default(), clock);

    let mut supervisor = Supervisor::new(scheduler, consumer);
    assert!(supervisor.start().await.is_err());

    // shutdown after a failed start is safe and a no-op
    supervisor.shutdown().await.expect("shutdown");
}
