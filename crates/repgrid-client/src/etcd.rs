//! Configuration store client: etcd v2 keys API.
//!
//! Replication controllers live as JSON values under a directory such as
//! `/registry/controllers`. A recursive `get` lists them; a recursive
//! long-poll `watch` streams change notifications.

use async_trait::async_trait;
use http::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::transport::{segments_path, HttpResponse, HttpTransport};

/// etcd error code for a missing key.
const ERROR_KEY_NOT_FOUND: u64 = 100;

/// One change notification or listing result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Response {
    /// `get`, `set`, `create`, `update`, `delete`, `expire`, ...
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<Node>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_node: Option<Node>,
}

/// A key or directory in the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Node {
    pub key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dir: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Node>,
    pub modified_index: u64,
    pub created_index: u64,
}

impl Response {
    pub fn new(action: impl Into<String>, node: Option<Node>) -> Self {
        Self {
            action: action.into(),
            node,
            prev_node: None,
        }
    }
}

impl Node {
    /// A leaf node carrying `value`.
    pub fn leaf(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    /// A directory node listing `nodes`.
    pub fn dir(key: impl Into<String>, nodes: Vec<Node>) -> Self {
        Self {
            key: key.into(),
            dir: true,
            nodes,
            ..Self::default()
        }
    }
}

/// Body of a non-2xx etcd reply.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EtcdErrorBody {
    error_code: u64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    cause: String,
}

/// Read and watch access to the configuration store.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read `key`; with `recursive` a directory comes back with all
    /// descendants in `node.nodes`.
    async fn get(&self, key: &str, recursive: bool) -> StoreResult<Response>;

    /// Stream change notifications under `prefix` into `events`.
    ///
    /// `wait_index` of 0 starts from the next change. Runs until `stop`
    /// fires (`Err(WatchStoppedByUser)`), the transport fails (any other
    /// error) or the receiver goes away (`Ok(())`). `events` is dropped
    /// on return, which ends the stream for the consumer.
    async fn watch(
        &self,
        prefix: &str,
        wait_index: u64,
        recursive: bool,
        events: mpsc::Sender<Response>,
        stop: watch::Receiver<bool>,
    ) -> StoreResult<()>;
}

/// Resolve once `stop` holds `true` or its sender is gone. Updates that
/// leave it `false` are ignored.
pub async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

/// `ConfigStore` backed by an etcd v2 server.
#[derive(Debug, Clone)]
pub struct EtcdClient {
    /// Bounded requests (`get`).
    transport: HttpTransport,
    /// Long-poll requests (`watch`), no timeout.
    watch_transport: HttpTransport,
}

impl EtcdClient {
    /// Create a client for `endpoint` (e.g. `http://127.0.0.1:4001`).
    pub fn new(endpoint: &str) -> StoreResult<Self> {
        let transport = HttpTransport::new(endpoint)?;
        Ok(Self::with_transport(transport))
    }

    pub fn with_transport(transport: HttpTransport) -> Self {
        let watch_transport = transport.clone().with_timeout(None);
        Self {
            transport,
            watch_transport,
        }
    }
}

fn keys_path(key: &str) -> String {
    let segments = key.split('/').filter(|s| !s.is_empty());
    format!("/v2/keys{}", segments_path(segments))
}

fn get_path(key: &str, recursive: bool) -> String {
    let mut path = keys_path(key);
    if recursive {
        path.push_str("?recursive=true");
    }
    path
}

fn watch_path(prefix: &str, recursive: bool, wait_index: u64) -> String {
    let mut path = format!("{}?wait=true", keys_path(prefix));
    if recursive {
        path.push_str("&recursive=true");
    }
    if wait_index > 0 {
        path.push_str(&format!("&waitIndex={wait_index}"));
    }
    path
}

fn decode_response(resp: &HttpResponse) -> StoreResult<Response> {
    if resp.is_success() {
        return serde_json::from_slice(&resp.body).map_err(StoreError::Decode);
    }
    match serde_json::from_slice::<EtcdErrorBody>(&resp.body) {
        Ok(body) if body.error_code == ERROR_KEY_NOT_FOUND => Err(StoreError::KeyNotFound(body.cause)),
        Ok(body) => Err(StoreError::Etcd {
            code: body.error_code,
            message: body.message,
        }),
        Err(_) => Err(StoreError::Etcd {
            code: u64::from(resp.status.as_u16()),
            message: resp.body_text(),
        }),
    }
}

#[async_trait]
impl ConfigStore for EtcdClient {
    async fn get(&self, key: &str, recursive: bool) -> StoreResult<Response> {
        let path = get_path(key, recursive);
        let resp = self.transport.send(Method::GET, &path, None).await?;
        decode_response(&resp)
    }

    async fn watch(
        &self,
        prefix: &str,
        wait_index: u64,
        recursive: bool,
        events: mpsc::Sender<Response>,
        mut stop: watch::Receiver<bool>,
    ) -> StoreResult<()> {
        let mut next_index = wait_index;
        debug!(%prefix, wait_index, "etcd watch started");

        loop {
            if *stop.borrow() {
                return Err(StoreError::WatchStoppedByUser);
            }

            let path = watch_path(prefix, recursive, next_index);
            let resp = tokio::select! {
                biased;
                _ = wait_for_stop(&mut stop) => return Err(StoreError::WatchStoppedByUser),
                resp = self.watch_transport.send(Method::GET, &path, None) => resp?,
            };

            // Proxies may close an idle long poll with an empty 200.
            if resp.is_success() && resp.body.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let response = decode_response(&resp)?;
            if let Some(node) = &response.node {
                next_index = node.modified_index + 1;
            }

            tokio::select! {
                biased;
                _ = wait_for_stop(&mut stop) => return Err(StoreError::WatchStoppedByUser),
                sent = events.send(response) => {
                    if sent.is_err() {
                        warn!(%prefix, "watch receiver dropped, ending watch");
                        return Ok(());
                    }
                }
            }
        }
    }
}
