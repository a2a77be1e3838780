//! Scheduler behavior tests on a virtual clock.
//!
//! The tick loop sleeps on the injected clock, so cadences measured in
//! minutes elapse instantly while assertions wait on short real time.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use herald_core::TestClock;
use herald_runtime::{job_fn, Cadence, JobHandler, RuntimeError, Scheduler, SchedulerConfig};
use tokio::sync::Semaphore;

fn scheduler() -> (Scheduler, Arc<TestClock>) {
    let clock = Arc::new(TestClock::new());
    (Scheduler::new(SchedulerConfig::default(), clock.clone()), clock)
}

fn counting_job(count: Arc<AtomicU64>) -> Arc<dyn JobHandler> {
    Arc::new(job_fn(move || {
        let count = count.clone();
        async move {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }))
}

/// Polls a condition until it holds or a real-time deadline passes.
async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if check().await {
            return;
        }
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn job_runs_repeatedly_on_its_cadence() {
    let (mut scheduler, clock) = scheduler();
    let count = Arc::new(AtomicU64::new(0));

    scheduler
        .register("minute-sync", Cadence::Every(Duration::from_secs(60)), counting_job(count.clone()))
        .await
        .expect("register");
    scheduler.start().expect("start");

    eventually("two dispatches", {
        let count = count.clone();
        move || {
            let count = count.clone();
            async move { count.load(Ordering::SeqCst) >= 2 }
        }
    })
    .await;
    scheduler.stop().await.expect("stop");

    let stats = scheduler.stats().await;
    assert!(stats.jobs_dispatched >= 2);
    assert_eq!(stats.jobs_failed, 0);
    assert!(clock.elapsed() >= Duration::from_secs(120), "two runs need two full cadences");
    assert!(scheduler.last_run("minute-sync").await.expect("job exists").is_some());
}

#[tokio::test]
async fn overlapping_slot_is_skipped_not_stacked() {
    let (mut scheduler, _clock) = scheduler();
    let entered = Arc::new(AtomicU64::new(0));
    let gate = Arc::new(Semaphore::new(0));

    let blocking = {
        let entered = entered.clone();
        let gate = gate.clone();
        Arc::new(job_fn(move || {
            let entered = entered.clone();
            let gate = gate.clone();
            async move {
                entered.fetch_add(1, Ordering::SeqCst);
                let _permit = gate.acquire().await?;
                Ok(())
            }
        }))
    };

    scheduler
        .register("slow-report", Cadence::Every(Duration::from_secs(10)), blocking)
        .await
        .expect("register");
    scheduler.start().expect("start");

    let s = &scheduler;
    eventually("skipped slots recorded", move || async move {
        s.stats().await.jobs_skipped >= 2
    })
    .await;

    assert_eq!(entered.load(Ordering::SeqCst), 1, "job must never run concurrently");

    gate.add_permits(100);
    scheduler.stop().await.expect("stop");

    let stats = scheduler.stats().await;
    assert!(stats.jobs_skipped >= 2);
}

#[tokio::test]
async fn duplicate_job_names_are_rejected() {
    let (scheduler, _clock) = scheduler();
    let count = Arc::new(AtomicU64::new(0));

    scheduler
        .register("digest", Cadence::Every(Duration::from_secs(60)), counting_job(count.clone()))
        .await
        .expect("register");

    let err = scheduler
        .register("digest", Cadence::Every(Duration::from_secs(30)), counting_job(count))
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::DuplicateJob { .. }));
}

#[tokio::test]
async fn registering_after_start_is_rejected() {
    let (mut scheduler, _clock) = scheduler();
    let count = Arc::new(AtomicU64::new(0));

    scheduler
        .register("early", Cadence::Every(Duration::from_secs(60)), counting_job(count.clone()))
        .await
        .expect("register");
    scheduler.start().expect("start");

    let err = scheduler
        .register("late", Cadence::Every(Duration::from_secs(60)), counting_job(count))
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Configuration { .. }));

    scheduler.stop().await.expect("stop");
    assert_eq!(scheduler.job_names().await, vec!["early"], "rejected job must not be kept");
}

#[tokio::test]
async fn failing_job_stays_scheduled() {
    let (mut scheduler, _clock) = scheduler();

    let failing = Arc::new(job_fn(|| async { Err(anyhow::anyhow!("upstream down")) }));
    scheduler
        .register("flaky-sync", Cadence::Every(Duration::from_secs(60)), failing)
        .await
        .expect("register");
    scheduler.start().expect("start");

    let s = &scheduler;
    eventually("repeated failures", move || async move { s.stats().await.jobs_failed >= 2 }).await;
    scheduler.stop().await.expect("stop");
}

#[tokio::test]
async fn disabled_job_does_not_run_until_reenabled() {
    let (mut scheduler, _clock) = scheduler();
    let count = Arc::new(AtomicU64::new(0));

    scheduler
        .register("digest", Cadence::Every(Duration::from_secs(60)), counting_job(count.clone()))
        .await
        .expect("register");
    scheduler.set_enabled("digest", false).await.expect("disable");
    scheduler.start().expect("start");

    // plenty of virtual cadences elapse while disabled
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);

    scheduler.set_enabled("digest", true).await.expect("enable");
    eventually("job runs after re-enable", {
        let count = count.clone();
        move || {
            let count = count.clone();
            async move { count.load(Ordering::SeqCst) >= 1 }
        }
    })
    .await;
    scheduler.stop().await.expect("stop");
}

#[tokio::test]
async fn toggling_an_unknown_job_fails() {
    let (scheduler, _clock) = scheduler();
    let err = scheduler.set_enabled("ghost", false).await.unwrap_err();
    assert!(matches!(err, RuntimeError::JobNotFound { .. }));
}

#[tokio::test]
async fn stop_waits_for_the_in_flight_run() {
    let (mut scheduler, _clock) = scheduler();
    let entered = Arc::new(AtomicU64::new(0));
    let finished = Arc::new(AtomicU64::new(0));

    let slow = {
        let entered = entered.clone();
        let finished = finished.clone();
        Arc::new(job_fn(move || {
            let entered = entered.clone();
            let finished = finished.clone();
            async move {
                entered.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }))
    };

    scheduler
        .register("slow-job", Cadence::Every(Duration::from_secs(1)), slow)
        .await
        .expect("register");
    scheduler.start().expect("start");

    eventually("job entered", {
        let entered = entered.clone();
        move || {
            let entered = entered.clone();
            async move { entered.load(Ordering::SeqCst) >= 1 }
        }
    })
    .await;
    scheduler.stop().await.expect("stop");

    assert!(
        finished.load(Ordering::SeqCst) >= 1,
        "graceful stop must let the in-flight run finish"
    );
}
