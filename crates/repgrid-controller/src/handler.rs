//! The per-controller sync callback shared by the watch loop and the
//! periodic synchronizer.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use repgrid_api::ReplicationController;

use crate::error::ControllerResult;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Callback invoked once per controller to converge its pods.
///
/// Replaceable so tests can observe which controllers were synced.
pub type SyncHandler =
    Arc<dyn Fn(ReplicationController) -> BoxFuture<ControllerResult<()>> + Send + Sync>;

/// Wrap an async closure as a `SyncHandler`.
pub fn sync_handler<F, Fut>(f: F) -> SyncHandler
where
    F: Fn(ReplicationController) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ControllerResult<()>> + Send + 'static,
{
    Arc::new(move |controller: ReplicationController| -> BoxFuture<ControllerResult<()>> {
        Box::pin(f(controller))
    })
}
