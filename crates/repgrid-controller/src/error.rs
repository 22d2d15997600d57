//! Controller error types.

use thiserror::Error;

use repgrid_api::ApiError;
use repgrid_client::{ClientError, StoreError};

/// Result type alias for controller operations.
pub type ControllerResult<T> = Result<T, ControllerError>;

/// Errors that can occur while reconciling controllers.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("failed to list pods: {0}")]
    ListPods(#[source] ClientError),

    #[error("{failed} of {attempted} pod deletions failed")]
    DeleteFailed { failed: usize, attempted: usize },

    #[error("failed to list controllers: {0}")]
    ListControllers(#[source] StoreError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The controller selects no labels, so it would claim every pod.
    #[error("controller {controller:?} has an empty selector; refusing to reconcile")]
    EmptySelector { controller: String },
}

/// A watch notification or stored value that could not be turned into a
/// replication controller.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{action:?} notification carries no node")]
    MissingNode { action: String },

    #[error("bad controller data at {key:?}: {source}")]
    BadData {
        key: String,
        #[source]
        source: ApiError,
    },
}
