//! Error types for delivery operations.
//!
//! Errors are categorized for retry decisions: transport failures and
//! unexpected HTTP statuses are retryable, configuration and store
//! failures are not.

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Error conditions raised while delivering notifications or webhooks.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// Network-level connectivity failure.
    #[error("network connection failed: {message}")]
    Network {
        /// What went wrong at the transport level.
        message: String,
    },

    /// HTTP request timeout exceeded.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Seconds before the request timed out.
        timeout_seconds: u64,
    },

    /// The receiver answered with a non-success HTTP status.
    #[error("unexpected response: HTTP {status_code}")]
    HttpStatus {
        /// HTTP status code returned.
        status_code: u16,
        /// Response body content, truncated.
        body: String,
    },

    /// A channel provider rejected the send.
    #[error("provider error: {message}")]
    Provider {
        /// Provider failure detail.
        message: String,
    },

    /// Invalid client or adapter configuration.
    #[error("configuration error: {message}")]
    Configuration {
        /// Configuration failure detail.
        message: String,
    },

    /// A preference or subscription lookup failed.
    #[error("store error: {message}")]
    Store {
        /// Store failure detail.
        message: String,
    },
}

impl DispatchError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates an HTTP status error from a response.
    pub fn http_status(status_code: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus { status_code, body: body.into() }
    }

    /// Creates a provider error.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Creates a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store { message: message.into() }
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Receivers fail transiently in every way a network allows, so any
    /// failure that reached or crossed the wire is retryable. Only local
    /// misconfiguration and store failures are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::HttpStatus { .. }
            | Self::Provider { .. } => true,
            Self::Configuration { .. } | Self::Store { .. } => false,
        }
    }
}

impl From<herald_core::CoreError> for DispatchError {
    fn from(err: herald_core::CoreError) -> Self {
        Self::Store { message: err.to_string() }
    }
}
