//! repgrid-api: wire data model for RepGrid.
//!
//! Defines the JSON shapes exchanged with the configuration store
//! (replication controllers) and the workload API (pods), plus the
//! label selector used to decide which pods belong to a controller.
//!
//! # Wire shape
//!
//! ```text
//! {
//!   "ID": "frontend",
//!   "DesiredState": {
//!     "Replicas": 2,
//!     "PodTemplate": {
//!       "DesiredState": { "Manifest": { "Containers": [{ "Image": "nginx" }] } },
//!       "Labels": { "name": "frontend" }
//!     }
//!   }
//! }
//! ```
//!
//! Container manifests are opaque to the controller: fields not modelled
//! here are carried through untouched so a controller round-trips exactly.

pub mod error;
pub mod labels;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use labels::{Labels, Selector};
pub use types::*;
