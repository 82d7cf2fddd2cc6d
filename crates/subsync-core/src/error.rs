//! Error types for subsync
//!
//! This module defines all error types used throughout the workspace.

use thiserror::Error;

/// Result type alias for subsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for subsync
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Document store errors (read or write)
    #[error("Document store error: {0}")]
    Store(String),

    /// Request never produced a response (connect, timeout, TLS)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Upstream answered with a status other than 200
    #[error("{operation} returned HTTP {status}")]
    UpstreamStatus {
        /// What was being attempted, e.g. "subscription listing"
        operation: String,
        /// HTTP status code
        status: u16,
    },

    /// Upstream answered 200 but the body was not what we expect
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a document store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an upstream status error
    pub fn upstream_status(operation: impl Into<String>, status: u16) -> Self {
        Self::UpstreamStatus {
            operation: operation.into(),
            status,
        }
    }

    /// Create an invalid response error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// HTTP status carried by this error, if upstream rejected the call
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::UpstreamStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
