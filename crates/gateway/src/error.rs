//! Gateway error types.

/// Errors from the language-model server
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Base URL could not be parsed
    #[error("Invalid gateway URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Server unreachable, or the request timed out
    #[error("Could not connect to model server: {0}")]
    Connection(String),

    /// `generate` called with no model argument and none selected
    #[error("No model selected")]
    ModelNotSelected,

    /// Server answered with a non-2xx status
    #[error("Model server returned HTTP {0}")]
    Status(u16),

    /// Response body did not have the expected shape
    #[error("Unexpected response from model server: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidUrl { .. } => "invalid_url",
            GatewayError::Connection(_) => "connection",
            GatewayError::ModelNotSelected => "model_not_selected",
            GatewayError::Status(_) => "status",
            GatewayError::Decode(_) => "decode",
        }
    }
}

impl From<GatewayError> for common::Error {
    fn from(err: GatewayError) -> Self {
        common::Error::gateway(err)
    }
}

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
