//! In-memory fakes of the external collaborators.
//!
//! `FakeConfigStore` serves canned `get` results and lets a test drive an
//! active watch: push notifications, inject a transport error or stop it.
//! `FakeWorkloadApi` keeps a pod table, applies selectors the way the
//! real API server does, and records every mutation.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::debug;

use repgrid_api::{Pod, PodList, Selector};

use crate::error::{ClientError, ClientResult, StoreError, StoreResult};
use crate::etcd::{wait_for_stop, ConfigStore, Response};

// ── Configuration store ───────────────────────────────────────────

enum WatchCommand {
    Event(Response),
    Error(String),
    Stop,
}

enum FakeEntry {
    Found(Response),
    Failed(String),
}

/// Scriptable `ConfigStore`.
pub struct FakeConfigStore {
    data: Mutex<HashMap<String, FakeEntry>>,
    watcher: Mutex<Option<mpsc::UnboundedSender<WatchCommand>>>,
    watching: watch::Sender<bool>,
    watches_started: AtomicUsize,
}

impl Default for FakeConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeConfigStore {
    pub fn new() -> Self {
        let (watching, _) = watch::channel(false);
        Self {
            data: Mutex::new(HashMap::new()),
            watcher: Mutex::new(None),
            watching,
            watches_started: AtomicUsize::new(0),
        }
    }

    /// Serve `response` for `get(key, _)`.
    pub async fn set_response(&self, key: &str, response: Response) {
        self.data
            .lock()
            .await
            .insert(key.to_string(), FakeEntry::Found(response));
    }

    /// Fail `get(key, _)` with a watch-style transport error.
    pub async fn set_error(&self, key: &str, message: &str) {
        self.data
            .lock()
            .await
            .insert(key.to_string(), FakeEntry::Failed(message.to_string()));
    }

    /// True while a `watch` call is running.
    pub fn is_watching(&self) -> bool {
        *self.watching.borrow()
    }

    /// Number of `watch` calls made so far.
    pub fn watches_started(&self) -> usize {
        self.watches_started.load(Ordering::SeqCst)
    }

    /// Resolve once a `watch` call is running.
    pub async fn wait_for_watch(&self) {
        let mut rx = self.watching.subscribe();
        let _ = rx.wait_for(|active| *active).await;
    }

    /// Deliver a notification to the active watch. Returns false if no
    /// watch is running.
    pub async fn send_watch_response(&self, response: Response) -> bool {
        self.command(WatchCommand::Event(response)).await
    }

    /// Fail the active watch with a transport error.
    pub async fn inject_watch_error(&self, message: &str) -> bool {
        self.command(WatchCommand::Error(message.to_string())).await
    }

    /// End the active watch as if stopped by its owner.
    pub async fn stop_watch(&self) -> bool {
        self.command(WatchCommand::Stop).await
    }

    async fn command(&self, cmd: WatchCommand) -> bool {
        match self.watcher.lock().await.as_ref() {
            Some(tx) => tx.send(cmd).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl ConfigStore for FakeConfigStore {
    async fn get(&self, key: &str, _recursive: bool) -> StoreResult<Response> {
        match self.data.lock().await.get(key) {
            Some(FakeEntry::Found(resp)) => Ok(resp.clone()),
            Some(FakeEntry::Failed(msg)) => Err(StoreError::Watch(msg.clone())),
            None => Err(StoreError::KeyNotFound(key.to_string())),
        }
    }

    async fn watch(
        &self,
        prefix: &str,
        _wait_index: u64,
        _recursive: bool,
        events: mpsc::Sender<Response>,
        mut stop: watch::Receiver<bool>,
    ) -> StoreResult<()> {
        let (tx, mut commands) = mpsc::unbounded_channel();
        *self.watcher.lock().await = Some(tx);
        self.watches_started.fetch_add(1, Ordering::SeqCst);
        self.watching.send_replace(true);
        debug!(%prefix, "fake watch started");

        let result = loop {
            if *stop.borrow() {
                break Err(StoreError::WatchStoppedByUser);
            }
            tokio::select! {
                _ = wait_for_stop(&mut stop) => break Err(StoreError::WatchStoppedByUser),
                cmd = commands.recv() => match cmd {
                    Some(WatchCommand::Event(resp)) => {
                        if events.send(resp).await.is_err() {
                            break Ok(());
                        }
                    }
                    Some(WatchCommand::Error(msg)) => break Err(StoreError::Watch(msg)),
                    Some(WatchCommand::Stop) | None => break Err(StoreError::WatchStoppedByUser),
                },
            }
        };

        *self.watcher.lock().await = None;
        // Close the outbound stream before announcing the end.
        drop(events);
        self.watching.send_replace(false);
        debug!(%prefix, "fake watch ended");
        result
    }
}

// ── Workload API ──────────────────────────────────────────────────

/// In-memory `WorkloadApi`.
#[derive(Default)]
pub struct FakeWorkloadApi {
    pods: Mutex<Vec<Pod>>,
    created: Mutex<Vec<Pod>>,
    deleted: Mutex<Vec<String>>,
    selectors: Mutex<Vec<Selector>>,
    list_error: Mutex<Option<String>>,
    failing_deletes: Mutex<HashSet<String>>,
    next_id: AtomicUsize,
}

impl FakeWorkloadApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `pods` already present.
    pub fn with_pods(pods: Vec<Pod>) -> Self {
        Self {
            pods: Mutex::new(pods),
            ..Self::default()
        }
    }

    /// Make every `list_pods` call fail with a 500.
    pub async fn fail_list(&self, message: &str) {
        *self.list_error.lock().await = Some(message.to_string());
    }

    /// Make `delete_pod(id)` fail with a 500.
    pub async fn fail_delete(&self, id: &str) {
        self.failing_deletes.lock().await.insert(id.to_string());
    }

    pub async fn pods(&self) -> Vec<Pod> {
        self.pods.lock().await.clone()
    }

    /// Pods created, in call order.
    pub async fn created(&self) -> Vec<Pod> {
        self.created.lock().await.clone()
    }

    /// Pod ids deleted, in call order.
    pub async fn deleted(&self) -> Vec<String> {
        self.deleted.lock().await.clone()
    }

    /// Selectors passed to `list_pods`, in call order.
    pub async fn selectors(&self) -> Vec<Selector> {
        self.selectors.lock().await.clone()
    }
}

#[async_trait]
impl crate::pods::WorkloadApi for FakeWorkloadApi {
    async fn list_pods(&self, selector: &Selector) -> ClientResult<PodList> {
        self.selectors.lock().await.push(selector.clone());
        if let Some(msg) = self.list_error.lock().await.clone() {
            return Err(ClientError::Status {
                status: 500,
                body: msg,
            });
        }
        let items = self
            .pods
            .lock()
            .await
            .iter()
            .filter(|p| selector.matches(&p.labels))
            .cloned()
            .collect();
        Ok(PodList::new(items))
    }

    async fn create_pod(&self, pod: &Pod) -> ClientResult<Pod> {
        let mut pod = pod.clone();
        if pod.id.is_empty() {
            pod.id = format!("fake-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        }
        self.pods.lock().await.push(pod.clone());
        self.created.lock().await.push(pod.clone());
        Ok(pod)
    }

    async fn delete_pod(&self, id: &str) -> ClientResult<()> {
        if self.failing_deletes.lock().await.contains(id) {
            return Err(ClientError::Status {
                status: 500,
                body: format!("injected failure deleting {id}"),
            });
        }
        let mut pods = self.pods.lock().await;
        let before = pods.len();
        pods.retain(|p| p.id != id);
        if pods.len() == before {
            return Err(ClientError::NotFound(id.to_string()));
        }
        self.deleted.lock().await.push(id.to_string());
        Ok(())
    }
}
