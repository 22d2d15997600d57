//! Minimal HTTP/1 transport shared by the workload API and store clients.
//!
//! Each request opens a fresh TCP connection, performs the hyper
//! handshake, drives the connection in a background task and collects
//! the full response body. Requests are bounded by an optional timeout;
//! long-poll watches run without one.

use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{ClientError, ClientResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A fully read HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Response body as lossy UTF-8, for error messages.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP/1 client bound to one `http://host:port/base` endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// `host:port` to dial.
    addr: String,
    /// Value of the `Host` header.
    authority: String,
    /// Path prefix from the base URL, without a trailing slash.
    base_path: String,
    timeout: Option<Duration>,
}

impl HttpTransport {
    /// Create a transport for a base URL such as `http://10.0.0.1:8080`.
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let uri: Uri = base_url
            .parse()
            .map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;

        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => {
                return Err(ClientError::InvalidUrl(format!(
                    "{base_url}: unsupported scheme {other}"
                )));
            }
            None => {
                return Err(ClientError::InvalidUrl(format!("{base_url}: missing scheme")));
            }
        }

        let authority = uri
            .authority()
            .ok_or_else(|| ClientError::InvalidUrl(format!("{base_url}: missing host")))?;
        let addr = format!("{}:{}", authority.host(), authority.port_u16().unwrap_or(80));

        Ok(Self {
            addr,
            authority: authority.as_str().to_string(),
            base_path: uri.path().trim_end_matches('/').to_string(),
            timeout: Some(DEFAULT_TIMEOUT),
        })
    }

    /// Set the per-request timeout. `None` disables it.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send a request and read the whole response.
    ///
    /// `path` is appended to the base path and may carry a query string.
    /// A body, when present, is sent as `application/json`.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> ClientResult<HttpResponse> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.round_trip(method, path, body))
                .await
                .map_err(|_| ClientError::Timeout(limit))?,
            None => self.round_trip(method, path, body).await,
        }
    }

    async fn round_trip(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> ClientResult<HttpResponse> {
        let uri = format!("{}{}", self.base_path, path);

        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: self.addr.clone(),
                source,
            })?;

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "http connection closed with error");
            }
        });

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(&uri)
            .header(HOST, &self.authority)
            .header(USER_AGENT, "repgrid/0.1");
        let payload = match body {
            Some(bytes) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Full::new(Bytes::from(bytes))
            }
            None => Full::new(Bytes::new()),
        };
        let req = builder
            .body(payload)
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;

        let resp = sender.send_request(req).await?;
        let status = resp.status();
        let body = resp.into_body().collect().await?.to_bytes();

        debug!(%method, %uri, status = status.as_u16(), "http request completed");
        Ok(HttpResponse { status, body })
    }
}

/// Bytes escaped in a single path segment: controls, space, the
/// delimiters that would end or split the segment, and `%` itself.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Join `segments` into an absolute path, escaping each segment.
pub fn segments_path<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    let mut path = String::new();
    for segment in segments {
        path.push('/');
        path.extend(utf8_percent_encode(segment, PATH_SEGMENT));
    }
    path
}
