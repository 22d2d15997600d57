//! Client error types.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for workload API and transport operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type alias for configuration store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the HTTP transport and the workload API client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Errors raised by configuration store clients.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The watch ended because its stop signal fired.
    #[error("watch stopped by user")]
    WatchStoppedByUser,

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("etcd error {code}: {message}")]
    Etcd { code: u64, message: String },

    #[error("watch failed: {0}")]
    Watch(String),

    #[error("malformed store response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("store transport error: {0}")]
    Transport(#[from] ClientError),
}

impl StoreError {
    /// True if this error is the normal end of a stopped watch.
    pub fn is_stopped_by_user(&self) -> bool {
        matches!(self, StoreError::WatchStoppedByUser)
    }
}
