//! Process supervisor tying the scheduler and consumer together.
//!
//! Owns both background components explicitly; there is no global
//! registry. Startup is fail-fast: if either component rejects its
//! configuration nothing is left half-running. Shutdown stops the
//! scheduler first so no new work is produced while the consumer
//! drains.

use herald_consumer::ConsumerFramework;
use tracing::info;

use crate::{
    error::Result,
    scheduler::Scheduler,
};

/// Owns and supervises the background processing components.
pub struct Supervisor {
    scheduler: Scheduler,
    consumer: ConsumerFramework,
}

impl Supervisor {
    /// Creates a supervisor over a configured scheduler and consumer.
    pub fn new(scheduler: Scheduler, consumer: ConsumerFramework) -> Self {
        Self { scheduler, consumer }
    }

    /// The supervised scheduler, for job registration and toggles.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The supervised consumer, for handler registration before start.
    pub fn consumer_mut(&mut self) -> &mut ConsumerFramework {
        &mut self.consumer
    }

    /// The supervised consumer, for stats reads.
    pub fn consumer(&self) -> &ConsumerFramework {
        &self.consumer
    }

    /// Starts the consumer, then the scheduler.
    ///
    /// If the scheduler rejects startup the consumer is stopped again,
    /// so a failed start leaves nothing running.
    pub async fn start(&mut self) -> Result<()> {
        self.consumer.start()?;

        if let Err(err) = self.scheduler.start() {
            self.consumer.stop().await?;
            return Err(err);
        }

        info!("supervisor started");
        Ok(())
    }

    /// Stops the scheduler, then drains and stops the consumer.
    ///
    /// Both components are always asked to stop; the first failure is
    /// reported after both had their chance.
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("supervisor shutting down");

        let scheduler_result = self.scheduler.stop().await;
        let consumer_result = self.consumer.stop().await;

        scheduler_result?;
        consumer_result?;

        info!("supervisor stopped");
        Ok(())
    }
}
