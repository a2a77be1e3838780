//! Consumer framework error types.

use std::time::Duration;

use thiserror::Error;

/// Convenience alias for consumer results.
pub type Result<T> = std::result::Result<T, ConsumerError>;

/// Errors surfaced by the consumer framework.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// The consumer was misconfigured or misused.
    #[error("configuration error: {message}")]
    Configuration {
        /// What was wrong.
        message: String,
    },

    /// A message payload could not be decoded into an event.
    #[error("failed to decode message on topic {topic}: {message}")]
    Decode {
        /// Topic the message arrived on.
        topic: String,
        /// Decode failure detail.
        message: String,
    },

    /// The underlying message bus failed.
    #[error("bus error: {message}")]
    Bus {
        /// Bus failure detail.
        message: String,
    },

    /// The consumer did not drain within the shutdown grace period.
    #[error("consumer shutdown timed out after {timeout:?}")]
    ShutdownTimeout {
        /// Grace period that elapsed.
        timeout: Duration,
    },
}

impl ConsumerError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Creates a decode error for a message on the given topic.
    pub fn decode(topic: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode { topic: topic.into(), message: message.into() }
    }

    /// Creates a bus error.
    pub fn bus(message: impl Into<String>) -> Self {
        Self::Bus { message: message.into() }
    }
}

impl From<herald_core::CoreError> for ConsumerError {
    fn from(err: herald_core::CoreError) -> Self {
        Self::Bus { message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_context() {
        let err = ConsumerError::decode("item.created", "invalid JSON at byte 3");
        assert_eq!(
            err.to_string(),
            "failed to decode message on topic item.created: invalid JSON at byte 3"
        );

        let err = ConsumerError::ShutdownTimeout { timeout: Duration::from_secs(30) };
        assert!(err.to_string().contains("30s"));
    }

    #[test]
    fn core_errors_map_to_bus_errors() {
        let core = herald_core::CoreError::bus("broker unavailable");
        let err = ConsumerError::from(core);
        assert!(matches!(err, ConsumerError::Bus { .. }));
        assert!(err.to_string().contains("broker unavailable"));
    }
}
