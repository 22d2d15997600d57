//! Error types for the RepGrid wire model.

use thiserror::Error;

/// Result type alias for wire model operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors that can occur while encoding or decoding wire objects.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("serialization error: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("deserialization error: {0}")]
    Deserialize(#[source] serde_json::Error),
}
