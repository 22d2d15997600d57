//! Replication manager: wires the store, the workload API and the sync
//! handler together and drives both the watch and the periodic pass.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use repgrid_api::ReplicationController;
use repgrid_client::{wait_for_stop, ConfigStore, WorkloadApi};

use crate::error::ControllerResult;
use crate::handler::SyncHandler;
use crate::pod_control::{PodControl, RealPodControl};
use crate::reconciler::{Reconciler, SyncSummary};
use crate::synchronizer::{PassReport, Synchronizer};
use crate::watch::{WatchExit, WatchLoop};
use crate::CONTROLLERS_PREFIX;

/// Keeps every stored replication controller at its desired pod count.
pub struct ReplicationManager {
    store: Arc<dyn ConfigStore>,
    api: Arc<dyn WorkloadApi>,
    pod_control: Arc<dyn PodControl>,
    /// Overrides the reconciler when set.
    sync_handler: Option<SyncHandler>,
    prefix: String,
}

impl ReplicationManager {
    /// Create a manager that creates and deletes pods through `api`.
    pub fn new(store: Arc<dyn ConfigStore>, api: Arc<dyn WorkloadApi>) -> Self {
        let pod_control = Arc::new(RealPodControl::new(Arc::clone(&api)));
        Self {
            store,
            api,
            pod_control,
            sync_handler: None,
            prefix: CONTROLLERS_PREFIX.to_string(),
        }
    }

    pub fn with_pod_control(mut self, pod_control: Arc<dyn PodControl>) -> Self {
        self.pod_control = pod_control;
        self
    }

    /// Replace the per-controller handler used by the watch and the
    /// periodic pass.
    pub fn with_sync_handler(mut self, handler: SyncHandler) -> Self {
        self.sync_handler = Some(handler);
        self
    }

    /// Watch and list a different store directory.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(Arc::clone(&self.api), Arc::clone(&self.pod_control))
    }

    /// The active handler: the override, or the reconciler.
    pub fn sync_handler(&self) -> SyncHandler {
        match &self.sync_handler {
            Some(handler) => Arc::clone(handler),
            None => self.reconciler().into_handler(),
        }
    }

    /// Reconcile a single controller.
    pub async fn sync_replication_controller(
        &self,
        controller: &ReplicationController,
    ) -> ControllerResult<SyncSummary> {
        self.reconciler().sync_replication_controller(controller).await
    }

    pub fn synchronizer(&self) -> Synchronizer {
        Synchronizer::new(Arc::clone(&self.store), self.sync_handler(), self.prefix.clone())
    }

    /// Run one full pass over every stored controller.
    pub async fn synchronize(&self) -> PassReport {
        self.synchronizer().synchronize().await
    }

    pub fn watch_loop(&self) -> WatchLoop {
        WatchLoop::new(Arc::clone(&self.store), self.sync_handler(), self.prefix.clone())
    }

    /// Consume store notifications until `stop` fires or the watch ends.
    pub async fn watch_controllers(&self, stop: watch::Receiver<bool>) -> WatchExit {
        self.watch_loop().run(stop).await
    }

    /// Run the manager until `shutdown` fires.
    ///
    /// A full pass runs at startup and then every `period`. The watch is
    /// restarted `period` after it ends for any reason other than
    /// shutdown.
    pub async fn run(&self, period: Duration, shutdown: watch::Receiver<bool>) {
        info!(period_ms = period.as_millis() as u64, prefix = %self.prefix, "replication manager started");

        let synchronizer = self.synchronizer();
        let mut sync_shutdown = shutdown.clone();
        let sync_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                if *sync_shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    _ = ticker.tick() => {
                        synchronizer.synchronize().await;
                    }
                    _ = wait_for_stop(&mut sync_shutdown) => break,
                }
            }
        });

        let watch_loop = self.watch_loop();
        let mut shutdown = shutdown;
        loop {
            match watch_loop.run(shutdown.clone()).await {
                WatchExit::Stopped if *shutdown.borrow() => break,
                WatchExit::Stopped => info!("controller watch ended, restarting"),
                WatchExit::Failed(e) => warn!(error = %e, "controller watch failed, restarting"),
            }
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(period) => {}
                _ = wait_for_stop(&mut shutdown) => break,
            }
        }

        if let Err(e) = sync_task.await {
            warn!(error = %e, "sync task ended abnormally");
        }
        info!("replication manager shutting down");
    }
}
