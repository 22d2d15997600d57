//! Reconciler: converges one controller's pod count.
//!
//! A single pass lists the pods matching the controller's selector,
//! ignores stopped ones, and then either creates or deletes pods to make
//! the count equal the desired replicas. Never both in one pass.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, info, warn};

use repgrid_api::{Pod, ReplicationController};
use repgrid_client::WorkloadApi;

use crate::error::{ControllerError, ControllerResult};
use crate::handler::{sync_handler, SyncHandler};
use crate::pod_control::PodControl;

/// Outcome of one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Active pods matching the selector before any action.
    pub observed: usize,
    pub desired: usize,
    /// Create requests issued. Failed creates are logged by the pod
    /// control and still counted here.
    pub created: usize,
    pub deleted: usize,
}

/// Reconciles controllers against the workload API.
#[derive(Clone)]
pub struct Reconciler {
    api: Arc<dyn WorkloadApi>,
    pod_control: Arc<dyn PodControl>,
}

impl Reconciler {
    pub fn new(api: Arc<dyn WorkloadApi>, pod_control: Arc<dyn PodControl>) -> Self {
        Self { api, pod_control }
    }

    /// Make the number of active pods selected by `controller` equal its
    /// desired replica count.
    ///
    /// A controller whose selector is empty is rejected before any pods
    /// are listed.
    ///
    /// Creates are issued one after another; a failed create is logged by
    /// the pod control and does not stop the rest. Deletes target the
    /// first surplus pods in listing order; every delete is attempted and
    /// failures are reported together afterwards.
    pub async fn sync_replication_controller(
        &self,
        controller: &ReplicationController,
    ) -> ControllerResult<SyncSummary> {
        let selector = controller.selector();
        if selector.is_empty() {
            warn!(controller = %controller.id, "controller has no selector labels, skipping");
            return Err(ControllerError::EmptySelector {
                controller: controller.id.clone(),
            });
        }

        let listed = self
            .api
            .list_pods(&selector)
            .await
            .map_err(ControllerError::ListPods)?;

        let active: Vec<Pod> = listed.items.into_iter().filter(Pod::is_active).collect();
        let mut summary = SyncSummary {
            observed: active.len(),
            desired: controller.replicas() as usize,
            ..SyncSummary::default()
        };

        match summary.desired.cmp(&summary.observed) {
            Ordering::Equal => {
                debug!(controller = %controller.id, replicas = summary.desired, "replicas in sync");
            }
            Ordering::Greater => {
                let missing = summary.desired - summary.observed;
                info!(
                    controller = %controller.id,
                    observed = summary.observed,
                    desired = summary.desired,
                    missing,
                    "too few replicas, creating"
                );
                for _ in 0..missing {
                    self.pod_control.create_replica(controller).await;
                }
                summary.created = missing;
            }
            Ordering::Less => {
                let surplus = summary.observed - summary.desired;
                info!(
                    controller = %controller.id,
                    observed = summary.observed,
                    desired = summary.desired,
                    surplus,
                    "too many replicas, deleting"
                );
                let mut failed = 0;
                for pod in active.iter().take(surplus) {
                    match self.pod_control.delete_pod(&pod.id).await {
                        Ok(()) => summary.deleted += 1,
                        Err(e) => {
                            warn!(controller = %controller.id, pod = %pod.id, error = %e, "failed to delete pod");
                            failed += 1;
                        }
                    }
                }
                if failed > 0 {
                    return Err(ControllerError::DeleteFailed {
                        failed,
                        attempted: surplus,
                    });
                }
            }
        }

        Ok(summary)
    }

    /// This reconciler as a `SyncHandler`.
    pub fn into_handler(self) -> SyncHandler {
        let reconciler = Arc::new(self);
        sync_handler(move |controller| {
            let reconciler = Arc::clone(&reconciler);
            async move {
                reconciler
                    .sync_replication_controller(&controller)
                    .await
                    .map(|_| ())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repgrid_api::{ContainerManifest, Labels, PodStatus, PodTemplate, Selector};
    use repgrid_client::fake::FakeWorkloadApi;

    use crate::pod_control::FakePodControl;

    fn labels() -> Labels {
        Labels::from([("name".to_string(), "foo".to_string())])
    }

    fn controller(replicas: u32) -> ReplicationController {
        let template = PodTemplate::new(ContainerManifest::with_images(["foo/bar"]), labels());
        ReplicationController::new("foo", replicas, template)
    }

    fn pods(n: usize) -> Vec<Pod> {
        (0..n)
            .map(|i| {
                let mut pod = Pod::new(format!("pod{i}"));
                pod.labels = labels();
                pod
            })
            .collect()
    }

    fn setup(existing: Vec<Pod>) -> (Arc<FakeWorkloadApi>, Arc<FakePodControl>, Reconciler) {
        let api = Arc::new(FakeWorkloadApi::with_pods(existing));
        let control = Arc::new(FakePodControl::new());
        let reconciler = Reconciler::new(api.clone(), control.clone());
        (api, control, reconciler)
    }

    #[tokio::test]
    async fn creates_missing_replicas() {
        let (_api, control, reconciler) = setup(vec![]);
        let summary = reconciler.sync_replication_controller(&controller(2)).await.unwrap();

        assert_eq!(summary.created, 2);
        assert_eq!(summary.deleted, 0);
        assert_eq!(control.created().await, vec![controller(2), controller(2)]);
        assert!(control.deleted().await.is_empty());
    }

    #[tokio::test]
    async fn deletes_surplus_in_listing_order() {
        let (_api, control, reconciler) = setup(pods(2));
        let summary = reconciler.sync_replication_controller(&controller(1)).await.unwrap();

        assert_eq!(summary, SyncSummary { observed: 2, desired: 1, created: 0, deleted: 1 });
        assert_eq!(control.deleted().await, vec!["pod0"]);
        assert!(control.created().await.is_empty());
    }

    #[tokio::test]
    async fn matching_count_does_nothing() {
        let (_api, control, reconciler) = setup(pods(2));
        let summary = reconciler.sync_replication_controller(&controller(2)).await.unwrap();

        assert_eq!(summary.observed, 2);
        assert!(control.created().await.is_empty());
        assert!(control.deleted().await.is_empty());
    }

    #[tokio::test]
    async fn zero_replicas_deletes_everything() {
        let (_api, control, reconciler) = setup(pods(3));
        reconciler.sync_replication_controller(&controller(0)).await.unwrap();
        assert_eq!(control.deleted().await, vec!["pod0", "pod1", "pod2"]);
    }

    #[tokio::test]
    async fn stopped_pods_do_not_count() {
        let mut existing = pods(2);
        existing[1].current_state.status = Some(PodStatus::Stopped);
        let (_api, control, reconciler) = setup(existing);

        let summary = reconciler.sync_replication_controller(&controller(2)).await.unwrap();
        assert_eq!(summary.observed, 1);
        assert_eq!(control.created().await.len(), 1);
    }

    #[tokio::test]
    async fn lists_with_controller_selector() {
        let (api, _control, reconciler) = setup(vec![]);
        reconciler.sync_replication_controller(&controller(0)).await.unwrap();
        assert_eq!(api.selectors().await, vec![Selector::from_labels(&labels())]);
    }

    #[tokio::test]
    async fn list_failure_takes_no_action() {
        let (api, control, reconciler) = setup(vec![]);
        api.fail_list("api down").await;

        let err = reconciler.sync_replication_controller(&controller(3)).await.unwrap_err();
        assert!(matches!(err, ControllerError::ListPods(_)));
        assert!(control.created().await.is_empty());
    }

    #[tokio::test]
    async fn delete_failures_are_collected() {
        let (_api, control, reconciler) = setup(pods(3));
        control.fail_delete("pod0").await;

        let err = reconciler.sync_replication_controller(&controller(1)).await.unwrap_err();
        assert!(matches!(err, ControllerError::DeleteFailed { failed: 1, attempted: 2 }));
        // The remaining delete still went through.
        assert_eq!(control.deleted().await, vec!["pod1"]);
    }

    #[tokio::test]
    async fn label_less_controller_touches_nothing() {
        let (api, control, reconciler) = setup(pods(2));
        let bare = ReplicationController::from_json(br#"{"ID":"typo"}"#).unwrap();

        let err = reconciler.sync_replication_controller(&bare).await.unwrap_err();
        assert!(matches!(err, ControllerError::EmptySelector { ref controller } if controller == "typo"));
        assert!(control.deleted().await.is_empty());
        assert!(control.created().await.is_empty());
        assert!(api.selectors().await.is_empty());
    }

    #[tokio::test]
    async fn replica_selector_alone_is_enough() {
        let mut rc = controller(1);
        rc.desired_state.pod_template.labels.clear();
        rc.desired_state.replica_selector = labels();
        let (_api, control, reconciler) = setup(pods(2));

        let summary = reconciler.sync_replication_controller(&rc).await.unwrap();
        assert_eq!(summary.deleted, 1);
        assert_eq!(control.deleted().await, vec!["pod0"]);
    }

    #[tokio::test]
    async fn handler_wraps_reconciler() {
        let (_api, control, reconciler) = setup(vec![]);
        let handler = reconciler.into_handler();
        handler(controller(1)).await.unwrap();
        assert_eq!(control.created().await.len(), 1);
    }
}
