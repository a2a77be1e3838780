//! Background runtime: periodic scheduling and process supervision.
//!
//! The scheduler runs named jobs on fixed or daily cadences with
//! overlap protection; the supervisor owns the scheduler and the event
//! consumer as one unit with ordered startup and graceful shutdown.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod scheduler;
pub mod supervisor;

pub use error::{Result, RuntimeError};
pub use scheduler::{
    job_fn, Cadence, JobFn, JobHandler, Scheduler, SchedulerConfig, SchedulerStats,
};
pub use supervisor::Supervisor;
