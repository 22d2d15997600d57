//! Pod creation and deletion on behalf of a controller.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

use repgrid_api::{Pod, ReplicationController};
use repgrid_client::{ClientError, ClientResult, WorkloadApi};

use crate::CONTROLLER_LABEL;

/// Side effects the reconciler performs on the workload API.
#[async_trait]
pub trait PodControl: Send + Sync {
    /// Create one pod from the controller's template. Failures are
    /// logged, not returned; the next sync pass retries.
    async fn create_replica(&self, controller: &ReplicationController);

    /// Delete one pod.
    async fn delete_pod(&self, pod_id: &str) -> ClientResult<()>;
}

/// Build the pod a controller's template describes, with a fresh id.
///
/// Labels are the template labels plus `replicationController=<id>`.
pub fn pod_from_template(controller: &ReplicationController) -> Pod {
    let template = &controller.desired_state.pod_template;
    let mut labels = template.labels.clone();
    if !controller.id.is_empty() {
        labels.insert(CONTROLLER_LABEL.to_string(), controller.id.clone());
    }
    Pod {
        id: Uuid::new_v4().simple().to_string(),
        labels,
        desired_state: template.desired_state.clone(),
        ..Pod::default()
    }
}

/// `PodControl` that talks to a live workload API.
#[derive(Clone)]
pub struct RealPodControl {
    api: Arc<dyn WorkloadApi>,
}

impl RealPodControl {
    pub fn new(api: Arc<dyn WorkloadApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PodControl for RealPodControl {
    async fn create_replica(&self, controller: &ReplicationController) {
        let pod = pod_from_template(controller);
        match self.api.create_pod(&pod).await {
            Ok(created) => {
                info!(controller = %controller.id, pod = %created.id, "created replica");
            }
            Err(e) => {
                error!(controller = %controller.id, pod = %pod.id, error = %e, "failed to create replica");
            }
        }
    }

    async fn delete_pod(&self, pod_id: &str) -> ClientResult<()> {
        match self.api.delete_pod(pod_id).await {
            Ok(()) => Ok(()),
            // Already gone: the goal of the delete is met.
            Err(ClientError::NotFound(_)) => {
                debug!(pod = %pod_id, "pod already deleted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Recording `PodControl` for tests.
///
/// Remembers every request in call order. Deletes of ids registered
/// with `fail_delete` return an error and are not recorded.
#[derive(Default)]
pub struct FakePodControl {
    created: Mutex<Vec<ReplicationController>>,
    deleted: Mutex<Vec<String>>,
    failing_deletes: Mutex<HashSet<String>>,
}

impl FakePodControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make deleting `pod_id` fail.
    pub async fn fail_delete(&self, pod_id: &str) {
        self.failing_deletes.lock().await.insert(pod_id.to_string());
    }

    /// Controllers passed to `create_replica`, in call order.
    pub async fn created(&self) -> Vec<ReplicationController> {
        self.created.lock().await.clone()
    }

    /// Pod ids passed to `delete_pod`, in call order.
    pub async fn deleted(&self) -> Vec<String> {
        self.deleted.lock().await.clone()
    }
}

#[async_trait]
impl PodControl for FakePodControl {
    async fn create_replica(&self, controller: &ReplicationController) {
        self.created.lock().await.push(controller.clone());
    }

    async fn delete_pod(&self, pod_id: &str) -> ClientResult<()> {
        if self.failing_deletes.lock().await.contains(pod_id) {
            return Err(ClientError::Status {
                status: 500,
                body: format!("injected failure deleting {pod_id}"),
            });
        }
        self.deleted.lock().await.push(pod_id.to_string());
        Ok(())
    }
}
