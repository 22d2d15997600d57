//! Domain types exchanged with the configuration store and workload API.
//!
//! Field names follow the PascalCase wire format (`ID`, `DesiredState`,
//! `Replicas`, ...). The pod list is the exception: its array lives under
//! a lowercase `items` key.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ApiError, ApiResult};
use crate::labels::{Labels, Selector};

/// Unique identifier for a replication controller.
pub type ControllerId = String;

/// Unique identifier for a pod.
pub type PodId = String;

// ── Replication controller ────────────────────────────────────────

/// Declared desired state for a set of identical pods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationController {
    #[serde(rename = "ID")]
    pub id: ControllerId,
    #[serde(rename = "DesiredState")]
    pub desired_state: ReplicationControllerState,
}

/// Desired replica count and the template new pods are stamped from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ReplicationControllerState {
    pub replicas: u32,
    /// Explicit selector; when empty the template labels select the pods.
    #[serde(skip_serializing_if = "Labels::is_empty")]
    pub replica_selector: Labels,
    pub pod_template: PodTemplate,
}

/// Template for pods created on behalf of a controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct PodTemplate {
    pub desired_state: PodState,
    #[serde(skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
}

impl ReplicationController {
    pub fn new(id: impl Into<String>, replicas: u32, pod_template: PodTemplate) -> Self {
        Self {
            id: id.into(),
            desired_state: ReplicationControllerState {
                replicas,
                replica_selector: Labels::new(),
                pod_template,
            },
        }
    }

    /// Desired replica count.
    pub fn replicas(&self) -> u32 {
        self.desired_state.replicas
    }

    /// Selector deciding which pods count toward this controller.
    pub fn selector(&self) -> Selector {
        let state = &self.desired_state;
        if state.replica_selector.is_empty() {
            Selector::from_labels(&state.pod_template.labels)
        } else {
            Selector::from_labels(&state.replica_selector)
        }
    }

    /// Decode a controller from its JSON wire form.
    pub fn from_json(data: &[u8]) -> ApiResult<Self> {
        serde_json::from_slice(data).map_err(ApiError::Deserialize)
    }

    /// Encode a controller to its JSON wire form.
    pub fn to_json(&self) -> ApiResult<String> {
        serde_json::to_string(self).map_err(ApiError::Serialize)
    }
}

impl PodTemplate {
    pub fn new(manifest: ContainerManifest, labels: Labels) -> Self {
        Self {
            desired_state: PodState {
                manifest,
                ..PodState::default()
            },
            labels,
        }
    }
}

// ── Manifest ──────────────────────────────────────────────────────

/// Container manifest. Opaque to the controller beyond its containers;
/// unknown fields are preserved verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ContainerManifest {
    pub containers: Vec<Container>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single container in a manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Container {
    pub image: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContainerManifest {
    pub fn with_images<I, S>(images: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            containers: images.into_iter().map(Container::new).collect(),
            extra: Map::new(),
        }
    }
}

impl Container {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            extra: Map::new(),
        }
    }
}

// ── Pod ───────────────────────────────────────────────────────────

/// A running workload instance as reported by the workload API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pod {
    #[serde(rename = "ID", alias = "id")]
    pub id: PodId,
    #[serde(rename = "Labels", skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    #[serde(rename = "DesiredState")]
    pub desired_state: PodState,
    #[serde(rename = "CurrentState")]
    pub current_state: PodState,
}

/// Desired or observed state of a pod.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct PodState {
    pub manifest: ContainerManifest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PodStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// Lifecycle status of a pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodStatus {
    Running,
    Pending,
    Stopped,
    #[serde(other)]
    Unknown,
}

impl Pod {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// A pod counts toward its controller unless it has stopped.
    pub fn is_active(&self) -> bool {
        self.current_state.status != Some(PodStatus::Stopped)
    }
}

/// Response body of `GET /pods`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodList {
    #[serde(rename = "items")]
    pub items: Vec<Pod>,
}

impl PodList {
    pub fn new(items: Vec<Pod>) -> Self {
        Self { items }
    }
}
