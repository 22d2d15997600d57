//! Workload API client.
//!
//! The workload API owns pods. RepGrid only lists them (filtered by a
//! label selector the server applies), creates them from controller
//! templates and deletes them by id.

use async_trait::async_trait;
use http::{Method, StatusCode};
use tracing::debug;
use url::form_urlencoded;

use repgrid_api::{Pod, PodList, Selector};

use crate::error::{ClientError, ClientResult};
use crate::transport::{segments_path, HttpResponse, HttpTransport};

/// Versioned path prefix of the workload API.
pub const DEFAULT_API_PREFIX: &str = "/api/v1beta1";

/// Pod operations the controller needs from the workload API.
///
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait WorkloadApi: Send + Sync {
    /// List pods whose labels match `selector`.
    async fn list_pods(&self, selector: &Selector) -> ClientResult<PodList>;

    /// Create one pod and return the server's view of it.
    async fn create_pod(&self, pod: &Pod) -> ClientResult<Pod>;

    /// Delete one pod. A missing pod yields `ClientError::NotFound`.
    async fn delete_pod(&self, id: &str) -> ClientResult<()>;
}

/// `WorkloadApi` over HTTP/1.
#[derive(Debug, Clone)]
pub struct HttpWorkloadClient {
    transport: HttpTransport,
    prefix: String,
}

impl HttpWorkloadClient {
    /// Create a client for `server` (e.g. `http://10.0.0.1:8080`) using
    /// the default API prefix.
    pub fn new(server: &str) -> ClientResult<Self> {
        Ok(Self {
            transport: HttpTransport::new(server)?,
            prefix: DEFAULT_API_PREFIX.to_string(),
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.prefix = prefix.trim_end_matches('/').to_string();
        self
    }

    pub fn with_transport(mut self, transport: HttpTransport) -> Self {
        self.transport = transport;
        self
    }

    fn pods_path(&self) -> String {
        format!("{}/pods", self.prefix)
    }

    fn list_path(&self, selector: &Selector) -> String {
        if selector.is_empty() {
            self.pods_path()
        } else {
            let query = form_urlencoded::Serializer::new(String::new())
                .append_pair("labels", &selector.to_string())
                .finish();
            format!("{}?{query}", self.pods_path())
        }
    }

    fn pod_path(&self, id: &str) -> String {
        format!("{}{}", self.pods_path(), segments_path([id]))
    }
}

/// Map non-2xx responses onto `ClientError`.
fn check_status(path: &str, resp: &HttpResponse) -> ClientResult<()> {
    if resp.is_success() {
        return Ok(());
    }
    if resp.status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound(path.to_string()));
    }
    Err(ClientError::Status {
        status: resp.status.as_u16(),
        body: resp.body_text(),
    })
}

#[async_trait]
impl WorkloadApi for HttpWorkloadClient {
    async fn list_pods(&self, selector: &Selector) -> ClientResult<PodList> {
        let path = self.list_path(selector);
        let resp = self.transport.send(Method::GET, &path, None).await?;
        check_status(&path, &resp)?;
        let list: PodList = serde_json::from_slice(&resp.body).map_err(ClientError::Decode)?;
        debug!(%selector, count = list.items.len(), "listed pods");
        Ok(list)
    }

    async fn create_pod(&self, pod: &Pod) -> ClientResult<Pod> {
        let path = self.pods_path();
        let body = serde_json::to_vec(pod).map_err(ClientError::Encode)?;
        let resp = self.transport.send(Method::POST, &path, Some(body)).await?;
        check_status(&path, &resp)?;

        // Some servers acknowledge with an empty body.
        if resp.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(pod.clone());
        }
        let created: Pod = serde_json::from_slice(&resp.body).map_err(ClientError::Decode)?;
        debug!(pod = %pod.id, "created pod");
        Ok(created)
    }

    async fn delete_pod(&self, id: &str) -> ClientResult<()> {
        let path = self.pod_path(id);
        let resp = self.transport.send(Method::DELETE, &path, None).await?;
        check_status(&path, &resp)?;
        debug!(pod = %id, "deleted pod");
        Ok(())
    }
}
