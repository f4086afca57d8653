//! Common error types for the discovery workspace.

use std::fmt;

/// A specialized Result type for process-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for process-level operations.
///
/// Domain errors (bad user input, unreachable services) have their own
/// enums in the crates that raise them; this type covers the plumbing
/// around them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Healthcheck error: {0}")]
    Healthcheck(String),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new healthcheck error.
    pub fn healthcheck(msg: impl fmt::Display) -> Self {
        Error::Healthcheck(msg.to_string())
    }

    /// Create a new discovery error.
    pub fn discovery(msg: impl fmt::Display) -> Self {
        Error::Discovery(msg.to_string())
    }

    /// Create a new gateway error.
    pub fn gateway(msg: impl fmt::Display) -> Self {
        Error::Gateway(msg.to_string())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new other error.
    pub fn other(msg: impl fmt::Display) -> Self {
        Error::Other(msg.to_string())
    }
}
