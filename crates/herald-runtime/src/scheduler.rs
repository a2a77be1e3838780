//! Periodic job scheduler driven by the injected clock.
//!
//! Jobs are named, carry a cadence, and run on a shared task tracker.
//! The tick loop dispatches due jobs without awaiting them; a job still
//! running when its next slot arrives is skipped for that slot, never
//! stacked. A failing run is logged and counted, and the job stays
//! scheduled.

use std::{
    collections::BTreeMap,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use herald_core::Clock;
use tokio::{sync::RwLock, task::JoinHandle};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use crate::error::{Result, RuntimeError};

/// How often a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Fixed interval between scheduled runs.
    Every(Duration),
    /// Once per day at the given UTC wall-clock time.
    Daily {
        /// Hour of day, 0 to 23.
        hour: u32,
        /// Minute of hour, 0 to 59.
        minute: u32,
    },
}

impl Cadence {
    fn validate(&self) -> Result<()> {
        match self {
            Self::Every(interval) => {
                if interval.is_zero() {
                    return Err(RuntimeError::configuration("cadence interval cannot be zero"));
                }
                if chrono::Duration::from_std(*interval).is_err() {
                    return Err(RuntimeError::configuration("cadence interval out of range"));
                }
            },
            Self::Daily { hour, minute } => {
                if *hour > 23 || *minute > 59 {
                    return Err(RuntimeError::configuration(format!(
                        "invalid daily time {hour:02}:{minute:02}"
                    )));
                }
            },
        }
        Ok(())
    }

    /// First scheduled run after `now`.
    pub fn first_run(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Every(interval) => now + interval_delta(*interval),
            Self::Daily { hour, minute } => next_daily(now, *hour, *minute),
        }
    }

    /// Scheduled run following the slot at `scheduled`.
    ///
    /// Fixed-rate: slots stay aligned to the original schedule, and
    /// slots already in the past are skipped rather than burst through.
    pub fn next_run(&self, scheduled: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Every(interval) => {
                let step = interval_delta(*interval);
                let mut next = scheduled + step;
                while next <= now {
                    next += step;
                }
                next
            },
            Self::Daily { hour, minute } => next_daily(now, *hour, *minute),
        }
    }
}

fn interval_delta(interval: Duration) -> chrono::Duration {
    chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::MAX)
}

fn next_daily(now: DateTime<Utc>, hour: u32, minute: u32) -> DateTime<Utc> {
    let today = now
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .unwrap_or_else(|| now.date_naive().and_hms_opt(0, 0, 0).unwrap_or_default())
        .and_utc();

    if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}

/// A unit of periodic work.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Runs the job once. Errors are logged and counted; the job stays
    /// scheduled.
    async fn run(&self) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into a [`JobHandler`].
pub struct JobFn<F> {
    func: F,
}

/// Wraps an async closure as a [`JobHandler`].
pub fn job_fn<F, Fut>(func: F) -> JobFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    JobFn { func }
}

#[async_trait]
impl<F, Fut> JobHandler for JobFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn run(&self) -> anyhow::Result<()> {
        (self.func)().await
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Resolution of the scheduling loop.
    pub tick_interval: Duration,

    /// Grace period allowed for in-flight jobs during shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_interval: Duration::from_secs(1), shutdown_timeout: Duration::from_secs(30) }
    }
}

/// Counters describing scheduler activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Job runs dispatched.
    pub jobs_dispatched: u64,

    /// Slots skipped because the previous run was still in progress.
    pub jobs_skipped: u64,

    /// Dispatched runs that returned an error.
    pub jobs_failed: u64,
}

struct JobEntry {
    cadence: Cadence,
    handler: Arc<dyn JobHandler>,
    enabled: bool,
    running: Arc<AtomicBool>,
    next_run: DateTime<Utc>,
    last_run: Option<DateTime<Utc>>,
}

/// Named periodic jobs on a shared tick loop.
pub struct Scheduler {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    jobs: Arc<RwLock<BTreeMap<String, JobEntry>>>,
    stats: Arc<RwLock<SchedulerStats>>,
    tracker: TaskTracker,
    cancellation: CancellationToken,
    started: AtomicBool,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Creates a stopped scheduler.
    pub fn new(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            jobs: Arc::new(RwLock::new(BTreeMap::new())),
            stats: Arc::new(RwLock::new(SchedulerStats::default())),
            tracker: TaskTracker::new(),
            cancellation: CancellationToken::new(),
            started: AtomicBool::new(false),
            handle: None,
        }
    }

    /// Registers a named job.
    ///
    /// Fails after `start`; the job set is fixed once the tick loop
    /// runs. The first run lands one full cadence after registration.
    pub async fn register(
        &self,
        name: impl Into<String>,
        cadence: Cadence,
        handler: Arc<dyn JobHandler>,
    ) -> Result<()> {
        if self.started.load(Ordering::Acquire) {
            return Err(RuntimeError::configuration("cannot register jobs after start"));
        }

        let name = name.into();
        if name.is_empty() {
            return Err(RuntimeError::configuration("job name cannot be empty"));
        }
        cadence.validate()?;

        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&name) {
            return Err(RuntimeError::duplicate_job(name));
        }

        let next_run = cadence.first_run(self.clock.now_utc());
        debug!(job = %name, %next_run, "job registered");
        jobs.insert(
            name,
            JobEntry {
                cadence,
                handler,
                enabled: true,
                running: Arc::new(AtomicBool::new(false)),
                next_run,
                last_run: None,
            },
        );
        Ok(())
    }

    /// Enables or disables a job without unregistering it.
    ///
    /// Re-enabling reschedules from now, so a job disabled for a week
    /// does not burst through the missed slots.
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(name).ok_or_else(|| RuntimeError::job_not_found(name))?;

        if enabled && !job.enabled {
            job.next_run = job.cadence.first_run(self.clock.now_utc());
        }
        job.enabled = enabled;
        info!(job = %name, enabled, "job toggled");
        Ok(())
    }

    /// Registered job names, sorted.
    pub async fn job_names(&self) -> Vec<String> {
        self.jobs.read().await.keys().cloned().collect()
    }

    /// When the named job last dispatched, if ever.
    pub async fn last_run(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        let jobs = self.jobs.read().await;
        let job = jobs.get(name).ok_or_else(|| RuntimeError::job_not_found(name))?;
        Ok(job.last_run)
    }

    /// Snapshot of the activity counters.
    pub async fn stats(&self) -> SchedulerStats {
        self.stats.read().await.clone()
    }

    /// Spawns the tick loop.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(RuntimeError::configuration("scheduler already started"));
        }
        if self.cancellation.is_cancelled() {
            return Err(RuntimeError::configuration("scheduler cannot be restarted"));
        }

        let worker = TickWorker {
            tick_interval: self.config.tick_interval,
            clock: Arc::clone(&self.clock),
            jobs: Arc::clone(&self.jobs),
            stats: Arc::clone(&self.stats),
            tracker: self.tracker.clone(),
            cancellation: self.cancellation.clone(),
        };
        self.started.store(true, Ordering::Release);
        self.handle = Some(tokio::spawn(worker.run()));
        Ok(())
    }

    /// Stops the tick loop and waits for in-flight jobs.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        self.cancellation.cancel();
        if let Err(join_err) = handle.await {
            error!(error = %join_err, "scheduler loop failed");
        }

        self.tracker.close();
        if tokio::time::timeout(self.config.shutdown_timeout, self.tracker.wait()).await.is_err() {
            return Err(RuntimeError::ShutdownTimeout { timeout: self.config.shutdown_timeout });
        }
        Ok(())
    }
}

struct TickWorker {
    tick_interval: Duration,
    clock: Arc<dyn Clock>,
    jobs: Arc<RwLock<BTreeMap<String, JobEntry>>>,
    stats: Arc<RwLock<SchedulerStats>>,
    tracker: TaskTracker,
    cancellation: CancellationToken,
}

impl TickWorker {
    async fn run(self) {
        info!("scheduler started");

        loop {
            tokio::select! {
                () = self.cancellation.cancelled() => break,
                () = self.clock.sleep(self.tick_interval) => {},
            }
            self.tick().await;
        }

        info!("scheduler stopped");
    }

    async fn tick(&self) {
        let now = self.clock.now_utc();
        let mut due = Vec::new();
        let mut skipped = 0u64;

        {
            let mut jobs = self.jobs.write().await;
            for (name, job) in jobs.iter_mut() {
                if !job.enabled || now < job.next_run {
                    continue;
                }

                job.next_run = job.cadence.next_run(job.next_run, now);

                if job.running.load(Ordering::Acquire) {
                    warn!(job = %name, "previous run still in progress, skipping slot");
                    skipped += 1;
                    continue;
                }

                job.running.store(true, Ordering::Release);
                job.last_run = Some(now);
                due.push((name.clone(), Arc::clone(&job.handler), Arc::clone(&job.running)));
            }
        }

        if skipped > 0 {
            self.stats.write().await.jobs_skipped += skipped;
        }

        for (name, handler, running) in due {
            self.stats.write().await.jobs_dispatched += 1;
            let stats = Arc::clone(&self.stats);
            self.tracker.spawn(async move {
                debug!(job = %name, "job started");
                if let Err(err) = handler.run().await {
                    warn!(job = %name, error = %err, "job failed");
                    stats.write().await.jobs_failed += 1;
                }
                running.store(false, Ordering::Release);
            });
        }
    }
}
