//! Runtime error types.

use std::time::Duration;

use thiserror::Error;

/// Convenience alias for runtime results.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors raised by the scheduler and supervisor.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A job with this name is already registered.
    #[error("job '{name}' is already registered")]
    DuplicateJob {
        /// Name of the conflicting job.
        name: String,
    },

    /// No job with this name exists.
    #[error("no job named '{name}'")]
    JobNotFound {
        /// Name that failed to resolve.
        name: String,
    },

    /// The scheduler was misconfigured or misused.
    #[error("configuration error: {message}")]
    Configuration {
        /// What was wrong.
        message: String,
    },

    /// In-flight jobs did not finish within the shutdown grace period.
    #[error("scheduler shutdown timed out after {timeout:?}")]
    ShutdownTimeout {
        /// Grace period that elapsed.
        timeout: Duration,
    },

    /// The supervised consumer failed.
    #[error(transparent)]
    Consumer(#[from] herald_consumer::ConsumerError),
}

impl RuntimeError {
    /// Creates a duplicate-job error.
    pub fn duplicate_job(name: impl Into<String>) -> Self {
        Self::DuplicateJob { name: name.into() }
    }

    /// Creates a job-not-found error.
    pub fn job_not_found(name: impl Into<String>) -> Self {
        Self::JobNotFound { name: name.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }
}
