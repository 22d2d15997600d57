//! repgrid-controller: keeps pod counts equal to declared replicas.
//!
//! For every replication controller stored under `/registry/controllers`
//! the manager compares the desired replica count with the pods the
//! workload API reports for the controller's selector, and creates or
//! deletes pods to close the gap. The algorithm is level-triggered: it
//! looks only at current state, so running it twice, late or out of
//! order is harmless.
//!
//! # Architecture
//!
//! ```text
//! ReplicationManager
//!   ├── Synchronizer  (full pass: list all controllers → handler each)
//!   ├── WatchLoop     (store watch → decode → handler, in order)
//!   └── SyncHandler   (default: Reconciler::sync_replication_controller)
//!         └── Reconciler
//!               ├── WorkloadApi::list_pods(selector)
//!               └── PodControl (create_replica / delete_pod)
//! ```
//!
//! Both passes converge on the same handler. Periodic full passes heal
//! anything an interrupted watch missed, including deleted controllers.

pub mod error;
pub mod handler;
pub mod manager;
pub mod pod_control;
pub mod reconciler;
pub mod synchronizer;
pub mod watch;

pub use error::{ControllerError, ControllerResult, DecodeError};
pub use handler::{sync_handler, SyncHandler};
pub use manager::ReplicationManager;
pub use pod_control::{FakePodControl, PodControl, RealPodControl};
pub use reconciler::{Reconciler, SyncSummary};
pub use synchronizer::{PassReport, Synchronizer};
pub use watch::{decode_watch_response, WatchAction, WatchExit, WatchLoop};

/// Store directory holding replication controllers.
pub const CONTROLLERS_PREFIX: &str = "/registry/controllers";

/// Label stamped on pods created for a controller.
pub const CONTROLLER_LABEL: &str = "replicationController";
