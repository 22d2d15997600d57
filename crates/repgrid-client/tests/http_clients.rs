//! HTTP client tests against in-process fake servers.
//!
//! Each test binds an axum router on an ephemeral localhost port and
//! points the real client at it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::{mpsc, watch, Mutex};

use repgrid_api::{Labels, Pod, PodList, Selector};
use repgrid_client::{
    ClientError, ConfigStore, EtcdClient, HttpWorkloadClient, Node, Response, StoreError,
    WorkloadApi,
};

const TIMEOUT: Duration = Duration::from_secs(5);

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

// ── Workload API ──────────────────────────────────────────────────

#[derive(Clone, Default)]
struct PodServer {
    pods: Arc<Mutex<Vec<Pod>>>,
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    posted: Arc<Mutex<Vec<Pod>>>,
}

async fn list_pods(
    State(s): State<PodServer>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<PodList> {
    s.queries.lock().await.push(q);
    Json(PodList::new(s.pods.lock().await.clone()))
}

async fn create_pod(State(s): State<PodServer>, Json(pod): Json<Pod>) -> (StatusCode, Json<Pod>) {
    s.posted.lock().await.push(pod.clone());
    s.pods.lock().await.push(pod.clone());
    (StatusCode::CREATED, Json(pod))
}

async fn delete_pod(State(s): State<PodServer>, Path(id): Path<String>) -> StatusCode {
    let mut pods = s.pods.lock().await;
    let before = pods.len();
    pods.retain(|p| p.id != id);
    if pods.len() == before {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    }
}

async fn pod_server(initial: Vec<Pod>) -> (PodServer, HttpWorkloadClient) {
    let state = PodServer::default();
    *state.pods.lock().await = initial;
    let router = Router::new()
        .route("/api/v1beta1/pods", get(list_pods).post(create_pod))
        .route("/api/v1beta1/pods/{id}", axum::routing::delete(delete_pod))
        .with_state(state.clone());
    let base = serve(router).await;
    (state, HttpWorkloadClient::new(&base).unwrap())
}

#[tokio::test]
async fn lists_pods_with_label_selector() {
    let (server, client) = pod_server(vec![Pod::new("pod0"), Pod::new("pod1")]).await;
    let sel = Selector::from_labels(&Labels::from([
        ("name".to_string(), "foo".to_string()),
        ("type".to_string(), "production".to_string()),
    ]));

    let list = client.list_pods(&sel).await.unwrap();
    assert_eq!(list.items.len(), 2);
    assert_eq!(list.items[0].id, "pod0");

    let queries = server.queries.lock().await;
    assert_eq!(queries[0]["labels"], "name=foo,type=production");
}

#[tokio::test]
async fn creates_pod_with_json_body() {
    let (server, client) = pod_server(vec![]).await;
    let mut pod = Pod::new("abc123");
    pod.labels = Labels::from([("name".to_string(), "foo".to_string())]);

    let created = client.create_pod(&pod).await.unwrap();
    assert_eq!(created, pod);
    assert_eq!(server.posted.lock().await.as_slice(), &[pod]);
}

#[tokio::test]
async fn deletes_pod_and_reports_missing() {
    let (server, client) = pod_server(vec![Pod::new("pod0")]).await;

    client.delete_pod("pod0").await.unwrap();
    assert!(server.pods.lock().await.is_empty());

    let err = client.delete_pod("pod0").await.unwrap_err();
    assert!(matches!(err, ClientError::NotFound(_)));
}

#[tokio::test]
async fn empty_create_acknowledgement_returns_submitted_pod() {
    let router = Router::new().route("/api/v1beta1/pods", axum::routing::post(|| async { "" }));
    let base = serve(router).await;
    let client = HttpWorkloadClient::new(&base).unwrap();

    let pod = Pod::new("p");
    assert_eq!(client.create_pod(&pod).await.unwrap(), pod);
}

#[tokio::test]
async fn server_errors_surface_as_status() {
    let router = Router::new().route(
        "/api/v1beta1/pods",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "broken") }),
    );
    let base = serve(router).await;
    let client = HttpWorkloadClient::new(&base).unwrap();

    match client.list_pods(&Selector::everything()).await {
        Err(ClientError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "broken");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

// ── etcd ──────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct EtcdServer {
    wait_indexes: Arc<Mutex<Vec<Option<String>>>>,
}

async fn etcd_keys(
    State(s): State<EtcdServer>,
    Query(q): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    if q.get("wait").map(String::as_str) != Some("true") {
        let listing = Response::new(
            "get",
            Some(Node::dir(
                "/registry/controllers",
                vec![Node::leaf("/registry/controllers/foo", r#"{"ID":"foo"}"#)],
            )),
        );
        return (StatusCode::OK, serde_json::to_string(&listing).unwrap());
    }

    let seen = {
        let mut idx = s.wait_indexes.lock().await;
        idx.push(q.get("waitIndex").cloned());
        idx.len()
    };
    if seen > 2 {
        // Hold the long poll open until the client gives up.
        std::future::pending::<()>().await;
    }
    let mut node = Node::leaf("/registry/controllers/foo", r#"{"ID":"foo"}"#);
    node.modified_index = 4 + seen as u64;
    (
        StatusCode::OK,
        serde_json::to_string(&Response::new("set", Some(node))).unwrap(),
    )
}

async fn etcd_server() -> (EtcdServer, EtcdClient) {
    let state = EtcdServer::default();
    let router = Router::new()
        .route("/v2/keys/registry/controllers", get(etcd_keys))
        .route(
            "/v2/keys/registry/missing",
            get(|| async {
                (
                    StatusCode::NOT_FOUND,
                    r#"{"errorCode":100,"message":"Key not found","cause":"/registry/missing"}"#,
                )
            }),
        )
        .with_state(state.clone());
    let base = serve(router).await;
    (state, EtcdClient::new(&base).unwrap())
}

#[tokio::test]
async fn etcd_get_lists_children() {
    let (_server, client) = etcd_server().await;
    let resp = client.get("/registry/controllers", true).await.unwrap();
    let node = resp.node.unwrap();
    assert_eq!(node.nodes.len(), 1);
    assert_eq!(node.nodes[0].value, r#"{"ID":"foo"}"#);
}

#[tokio::test]
async fn etcd_get_missing_key() {
    let (_server, client) = etcd_server().await;
    let err = client.get("/registry/missing", true).await.unwrap_err();
    assert!(matches!(err, StoreError::KeyNotFound(_)));
}

#[tokio::test]
async fn etcd_watch_advances_wait_index_and_stops() {
    let (server, client) = etcd_server().await;
    let (tx, mut rx) = mpsc::channel(4);
    let (stop_tx, stop_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        client
            .watch("/registry/controllers", 0, true, tx, stop_rx)
            .await
    });

    let first = tokio::time::timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.node.unwrap().modified_index, 5);
    let second = tokio::time::timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(second.node.unwrap().modified_index, 6);

    stop_tx.send(true).unwrap();
    let result = tokio::time::timeout(TIMEOUT, task).await.unwrap().unwrap();
    assert!(matches!(result, Err(StoreError::WatchStoppedByUser)));
    assert!(rx.recv().await.is_none());

    let indexes = server.wait_indexes.lock().await.clone();
    assert_eq!(indexes[0], None);
    assert_eq!(indexes[1].as_deref(), Some("6"));
}

#[tokio::test]
async fn etcd_watch_transport_failure_ends_watch() {
    // Nothing listens on port 1, so the first long poll fails.
    let client = EtcdClient::new("http://127.0.0.1:1").unwrap();
    let (tx, mut rx) = mpsc::channel(1);
    let (_stop_tx, stop_rx) = watch::channel(false);

    let result = tokio::time::timeout(
        TIMEOUT,
        client.watch("/registry/controllers", 0, true, tx, stop_rx),
    )
    .await
    .unwrap();
    assert!(matches!(result, Err(StoreError::Transport(_))));
    assert!(rx.recv().await.is_none());
}
