//! Error types for the broadcast protocol

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Protocol error types
#[derive(Debug, Error)]
pub enum Error {
    /// Inbound document does not match any known message shape
    #[error("deserialization error: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Outbound message could not be encoded
    #[error("serialization error: {0}")]
    Serialization(#[source] serde_json::Error),
}
