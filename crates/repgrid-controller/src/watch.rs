//! Watch loop: turns store change notifications into sync calls.
//!
//! The store's watch runs in its own task and pushes notifications into
//! a channel. This loop consumes them in arrival order, one at a time,
//! and hands each decoded controller to the sync handler. It ends when
//! the stop signal fires or the store closes the channel.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use repgrid_api::ReplicationController;
use repgrid_client::{wait_for_stop, ConfigStore, Response, StoreError};

use crate::error::{ControllerResult, DecodeError};
use crate::handler::SyncHandler;

/// Notifications buffered between the store watch and the loop.
const WATCH_BUFFER: usize = 16;

/// How a notification's action is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    /// Carries the controller's new value.
    Set,
    /// The controller was removed. Its pods are left alone.
    Delete,
    /// Anything else.
    Ignored,
}

impl WatchAction {
    pub fn parse(action: &str) -> Self {
        match action {
            "set" | "create" | "update" | "compareAndSwap" => Self::Set,
            "delete" | "expire" | "compareAndDelete" => Self::Delete,
            _ => Self::Ignored,
        }
    }
}

/// Why a watch loop returned.
#[derive(Debug)]
pub enum WatchExit {
    /// The stop signal fired, or the store ended the watch on request.
    Stopped,
    /// The store watch failed.
    Failed(StoreError),
}

/// Decode the controller carried by a watch notification.
///
/// `Ok(None)` means there is nothing to sync.
pub fn decode_watch_response(
    response: &Response,
) -> Result<Option<ReplicationController>, DecodeError> {
    match WatchAction::parse(&response.action) {
        WatchAction::Set => {
            let node = response.node.as_ref().ok_or_else(|| DecodeError::MissingNode {
                action: response.action.clone(),
            })?;
            ReplicationController::from_json(node.value.as_bytes())
                .map(Some)
                .map_err(|source| DecodeError::BadData {
                    key: node.key.clone(),
                    source,
                })
        }
        WatchAction::Delete | WatchAction::Ignored => Ok(None),
    }
}

/// Consumes one store watch.
#[derive(Clone)]
pub struct WatchLoop {
    store: Arc<dyn ConfigStore>,
    handler: SyncHandler,
    prefix: String,
}

impl WatchLoop {
    pub fn new(store: Arc<dyn ConfigStore>, handler: SyncHandler, prefix: impl Into<String>) -> Self {
        Self {
            store,
            handler,
            prefix: prefix.into(),
        }
    }

    /// Decode one notification and, if it carries a controller, run the
    /// sync handler for it. Returns the controller that was synced.
    pub async fn handle_watch_response(
        &self,
        response: &Response,
    ) -> ControllerResult<Option<ReplicationController>> {
        let Some(controller) = decode_watch_response(response)? else {
            debug!(action = %response.action, "nothing to sync for notification");
            return Ok(None);
        };
        (self.handler)(controller.clone()).await?;
        Ok(Some(controller))
    }

    /// Watch the prefix until `stop` fires or the store watch ends.
    ///
    /// Handler and decode errors are logged and the loop keeps going. A
    /// closed notification channel ends the loop.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) -> WatchExit {
        if *stop.borrow() {
            return WatchExit::Stopped;
        }

        let (tx, mut rx) = mpsc::channel(WATCH_BUFFER);
        let store = Arc::clone(&self.store);
        let prefix = self.prefix.clone();
        let store_stop = stop.clone();
        let watch_task =
            tokio::spawn(async move { store.watch(&prefix, 0, true, tx, store_stop).await });
        info!(prefix = %self.prefix, "watching controllers");

        let stopped = loop {
            tokio::select! {
                biased;
                _ = wait_for_stop(&mut stop) => break true,
                event = rx.recv() => match event {
                    Some(response) => self.dispatch(&response).await,
                    None => break false,
                },
            }
        };

        // The store watch observes the same stop signal and returns.
        drop(rx);
        let result = watch_task.await;
        if stopped {
            info!(prefix = %self.prefix, "controller watch stopped");
            return WatchExit::Stopped;
        }

        match result {
            Ok(Err(e)) if e.is_stopped_by_user() => {
                info!(prefix = %self.prefix, "controller watch stopped");
                WatchExit::Stopped
            }
            Ok(Err(e)) => {
                warn!(prefix = %self.prefix, error = %e, "controller watch failed");
                WatchExit::Failed(e)
            }
            Ok(Ok(())) => WatchExit::Stopped,
            Err(e) => WatchExit::Failed(StoreError::Watch(e.to_string())),
        }
    }

    async fn dispatch(&self, response: &Response) {
        match self.handle_watch_response(response).await {
            Ok(Some(controller)) => debug!(controller = %controller.id, "synced from watch"),
            Ok(None) => {}
            Err(e) => warn!(action = %response.action, error = %e, "failed to handle watch notification"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repgrid_client::Node;

    use crate::error::ControllerError;
    use crate::handler::sync_handler;
    use crate::CONTROLLERS_PREFIX;
    use tokio::sync::Mutex;

    fn set(value: &str) -> Response {
        Response::new("set", Some(Node::leaf("/registry/controllers/foo", value)))
    }

    #[test]
    fn parses_actions() {
        assert_eq!(WatchAction::parse("set"), WatchAction::Set);
        assert_eq!(WatchAction::parse("compareAndSwap"), WatchAction::Set);
        assert_eq!(WatchAction::parse("delete"), WatchAction::Delete);
        assert_eq!(WatchAction::parse("expire"), WatchAction::Delete);
        assert_eq!(WatchAction::parse(""), WatchAction::Ignored);
        assert_eq!(WatchAction::parse("get"), WatchAction::Ignored);
    }

    #[test]
    fn decodes_set_notification() {
        let rc = decode_watch_response(&set(r#"{"ID":"foo","DesiredState":{"Replicas":2}}"#))
            .unwrap()
            .unwrap();
        assert_eq!(rc.id, "foo");
        assert_eq!(rc.replicas(), 2);
    }

    #[test]
    fn set_without_node_is_an_error() {
        let err = decode_watch_response(&Response::new("set", None)).unwrap_err();
        assert!(matches!(err, DecodeError::MissingNode { .. }));
    }

    #[test]
    fn set_with_garbage_is_an_error() {
        let err = decode_watch_response(&set("foobar")).unwrap_err();
        assert!(matches!(err, DecodeError::BadData { .. }));
    }

    #[test]
    fn delete_and_unknown_actions_decode_to_nothing() {
        assert!(decode_watch_response(&Response::new("delete", None)).unwrap().is_none());
        assert!(decode_watch_response(&Response::default()).unwrap().is_none());
    }

    #[tokio::test]
    async fn handler_errors_surface_from_handle() {
        let store = Arc::new(repgrid_client::fake::FakeConfigStore::new());
        let handler = sync_handler(|rc: ReplicationController| async move {
            Err(ControllerError::EmptySelector { controller: rc.id })
        });
        let watch_loop = WatchLoop::new(store, handler, CONTROLLERS_PREFIX);

        let err = watch_loop.handle_watch_response(&set(r#"{"ID":"foo"}"#)).await.unwrap_err();
        assert!(matches!(err, ControllerError::EmptySelector { .. }));
    }

    #[tokio::test]
    async fn handle_invokes_handler_with_decoded_controller() {
        let store = Arc::new(repgrid_client::fake::FakeConfigStore::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = {
            let seen = seen.clone();
            sync_handler(move |rc| {
                let seen = seen.clone();
                async move {
                    seen.lock().await.push(rc);
                    Ok(())
                }
            })
        };
        let watch_loop = WatchLoop::new(store, handler, CONTROLLERS_PREFIX);

        let synced = watch_loop.handle_watch_response(&set(r#"{"ID":"foo"}"#)).await.unwrap();
        assert_eq!(synced.unwrap().id, "foo");
        assert!(watch_loop.handle_watch_response(&Response::new("delete", None)).await.unwrap().is_none());
        assert_eq!(seen.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn already_stopped_returns_immediately() {
        let store = Arc::new(repgrid_client::fake::FakeConfigStore::new());
        let handler = sync_handler(|_| async { Ok(()) });
        let watch_loop = WatchLoop::new(store.clone(), handler, CONTROLLERS_PREFIX);
        let (_tx, rx) = watch::channel(true);

        assert!(matches!(watch_loop.run(rx).await, WatchExit::Stopped));
        assert_eq!(store.watches_started(), 0);
    }
}
