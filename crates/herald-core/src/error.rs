//! Error types and result handling for core operations.
//!
//! Errors from the bus and store collaborators; the consuming crates
//! carry their own taxonomies and convert these at the boundary. Store
//! lookups that find nothing return empty results, not errors.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type for domain and collaborator operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid input to a core operation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Message bus operation failed.
    #[error("bus error: {0}")]
    Bus(String),
}

impl CoreError {
    /// Creates an invalid-input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Creates a bus error.
    pub fn bus(message: impl Into<String>) -> Self {
        Self::Bus(message.into())
    }
}
