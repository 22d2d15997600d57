//! repgrid-client: clients for RepGrid's external collaborators.
//!
//! The controller talks to two services it does not own:
//!
//! - the **workload API**, which stores and lists pods
//!   (`GET/POST {prefix}/pods`, `DELETE {prefix}/pods/{id}`), and
//! - the **configuration store**, an etcd v2 keys API holding the
//!   replication controllers under `/registry/controllers`.
//!
//! # Architecture
//!
//! ```text
//! HttpTransport (hyper http1, one connection per request)
//!   ├── HttpWorkloadClient  ── impl WorkloadApi
//!   └── EtcdClient          ── impl ConfigStore (get + long-poll watch)
//!
//! fake::FakeWorkloadApi     ── in-memory WorkloadApi
//! fake::FakeConfigStore     ── scriptable ConfigStore
//! ```
//!
//! Both traits are object safe so callers hold them as `Arc<dyn ...>`
//! and share one handle between the watch loop and periodic syncs.

pub mod error;
pub mod etcd;
pub mod fake;
pub mod pods;
pub mod transport;

pub use error::{ClientError, ClientResult, StoreError, StoreResult};
pub use etcd::{wait_for_stop, ConfigStore, EtcdClient, Node, Response};
pub use pods::{HttpWorkloadClient, WorkloadApi, DEFAULT_API_PREFIX};
pub use transport::{HttpResponse, HttpTransport};
