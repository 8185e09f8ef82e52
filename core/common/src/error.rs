//! Common error types for DriveGate.

use thiserror::Error;

/// Top-level error type for DriveGate operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Exchanging the refresh credential for an access token failed.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The remote store answered with a non-success status or a body
    /// that could not be understood.
    #[error("Remote error ({status}): {message}")]
    Remote {
        /// Upstream HTTP status code.
        status: u16,
        /// Upstream error body or parse failure description.
        message: String,
    },

    /// The remote store could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// The client request is structurally invalid.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Resource not found, or found with the wrong kind.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build a remote error from an upstream status and body.
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: message.into(),
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
