//! Discovery error types.

use healthcheck::AddressError;
use thiserror::Error;

/// Errors surfaced by the discovery controller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    /// Malformed address or empty identity; rejected before any I/O
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The one-shot probe did not come back online
    #[error("service at {address} is unreachable: {reason}")]
    Unreachable { address: String, reason: String },

    /// Unexpected fault inside the scan loop
    #[error("internal scan failure: {0}")]
    InternalScanFailure(String),
}

impl From<AddressError> for DiscoveryError {
    fn from(err: AddressError) -> Self {
        DiscoveryError::InvalidInput(err.to_string())
    }
}

impl From<DiscoveryError> for common::Error {
    fn from(err: DiscoveryError) -> Self {
        common::Error::discovery(err)
    }
}

/// A specialized Result type for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;
