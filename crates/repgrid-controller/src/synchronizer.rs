//! Periodic full pass over every stored controller.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use repgrid_api::ReplicationController;
use repgrid_client::{ConfigStore, Node, StoreError};

use crate::error::{ControllerError, ControllerResult, DecodeError};
use crate::handler::SyncHandler;

/// Counts from one full pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Controllers handed to the sync handler.
    pub synced: usize,
    /// Of those, how many returned an error.
    pub failed: usize,
    /// Stored entries that could not be decoded.
    pub skipped: usize,
}

/// Lists all controllers from the store and runs the sync handler for
/// each of them concurrently.
#[derive(Clone)]
pub struct Synchronizer {
    store: Arc<dyn ConfigStore>,
    handler: SyncHandler,
    prefix: String,
}

impl Synchronizer {
    pub fn new(store: Arc<dyn ConfigStore>, handler: SyncHandler, prefix: impl Into<String>) -> Self {
        Self {
            store,
            handler,
            prefix: prefix.into(),
        }
    }

    /// Read and decode every controller under the prefix.
    ///
    /// A missing directory means no controllers yet. Entries that fail to
    /// decode are returned separately so one bad record never blocks the
    /// rest.
    pub async fn list_controllers(
        &self,
    ) -> ControllerResult<(Vec<ReplicationController>, Vec<DecodeError>)> {
        let response = match self.store.get(&self.prefix, true).await {
            Ok(r) => r,
            Err(StoreError::KeyNotFound(_)) => {
                debug!(prefix = %self.prefix, "no controllers stored");
                return Ok((Vec::new(), Vec::new()));
            }
            Err(e) => return Err(ControllerError::ListControllers(e)),
        };

        let mut controllers = Vec::new();
        let mut bad = Vec::new();
        let children = response.node.map(|n| n.nodes).unwrap_or_default();
        for node in children.iter().filter(|n| !n.dir) {
            match decode_node(node) {
                Ok(rc) => controllers.push(rc),
                Err(e) => bad.push(e),
            }
        }
        Ok((controllers, bad))
    }

    /// Run one full pass. Errors are logged; the next pass retries.
    pub async fn synchronize(&self) -> PassReport {
        let (controllers, bad) = match self.list_controllers().await {
            Ok(listed) => listed,
            Err(e) => {
                error!(prefix = %self.prefix, error = %e, "synchronization failed");
                return PassReport::default();
            }
        };

        let mut report = PassReport {
            skipped: bad.len(),
            ..PassReport::default()
        };
        for e in &bad {
            warn!(error = %e, "skipping undecodable controller");
        }

        let mut tasks = JoinSet::new();
        for controller in controllers {
            let handler = Arc::clone(&self.handler);
            let id = controller.id.clone();
            tasks.spawn(async move { (id, handler(controller).await) });
        }
        report.synced = tasks.len();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((id, Err(e))) => {
                    error!(controller = %id, error = %e, "sync failed");
                    report.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "sync task panicked");
                    report.failed += 1;
                }
            }
        }

        info!(
            synced = report.synced,
            failed = report.failed,
            skipped = report.skipped,
            "synchronization pass complete"
        );
        report
    }
}

fn decode_node(node: &Node) -> Result<ReplicationController, DecodeError> {
    ReplicationController::from_json(node.value.as_bytes()).map_err(|source| DecodeError::BadData {
        key: node.key.clone(),
        source,
    })
}
