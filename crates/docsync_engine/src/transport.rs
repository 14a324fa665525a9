//! Transport capability consumed by the engine.

use crate::error::{SyncError, SyncResult};
use docsync_protocol::{now_millis, ChangeBatch, ChangeRecord, PullResponse, PushResponse, Timestamp};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Callback invoked with batches of remote changes delivered in real time.
pub type RemoteChangeHandler<T> = Arc<dyn Fn(&[ChangeRecord<T>]) + Send + Sync>;

/// Handle that detaches a real-time subscription.
pub struct RemoteSubscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl RemoteSubscription {
    /// Wraps a cancellation action.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Detaches the subscription.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// A sync transport handles communication with the remote authority.
///
/// This trait abstracts the network layer, allowing different
/// implementations (HTTP, WebSocket, in-process for testing, etc.).
/// Per-call timeouts are the transport's responsibility.
pub trait SyncTransport<T>: Send + Sync {
    /// Transmits a batch of local changes.
    fn push(&self, batch: &ChangeBatch<T>) -> SyncResult<PushResponse<T>>;

    /// Fetches remote changes recorded after `since`.
    fn pull(&self, since: Timestamp) -> SyncResult<PullResponse<T>>;

    /// Cheap reachability check. A probe failure reads as `false`.
    fn is_online(&self) -> bool;

    /// Subscribes to real-time remote changes, when the transport supports
    /// them. The default implementation reports no such support.
    fn subscribe_remote(&self, handler: RemoteChangeHandler<T>) -> Option<RemoteSubscription> {
        let _ = handler;
        None
    }
}

/// A scriptable transport for testing.
///
/// Responses can be pre-set; without a script, pushes and pulls succeed
/// with the current wall-clock timestamp and no data. Failure injection
/// makes every push/pull return a retryable transport error while leaving
/// the connectivity probe untouched.
pub struct MockTransport<T> {
    connected: AtomicBool,
    fail_requests: AtomicBool,
    pull_response: Mutex<Option<PullResponse<T>>>,
    push_response: Mutex<Option<PushResponse<T>>>,
    pushed: Mutex<Vec<ChangeBatch<T>>>,
    remote_handler: Mutex<Option<RemoteChangeHandler<T>>>,
}

impl<T> MockTransport<T> {
    /// Creates a connected mock with no scripted responses.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            fail_requests: AtomicBool::new(false),
            pull_response: Mutex::new(None),
            push_response: Mutex::new(None),
            pushed: Mutex::new(Vec::new()),
            remote_handler: Mutex::new(None),
        }
    }

    /// Sets the connectivity reported to probes.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Makes every push and pull fail with a retryable transport error.
    pub fn set_fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    /// Scripts the next pull responses.
    pub fn set_pull_response(&self, response: PullResponse<T>) {
        *self.pull_response.lock() = Some(response);
    }

    /// Scripts the next push responses.
    pub fn set_push_response(&self, response: PushResponse<T>) {
        *self.push_response.lock() = Some(response);
    }

    /// Returns true if a real-time handler is attached.
    pub fn has_remote_handler(&self) -> bool {
        self.remote_handler.lock().is_some()
    }
}

impl<T: Clone> MockTransport<T> {
    /// Batches recorded by successful pushes.
    pub fn pushed_batches(&self) -> Vec<ChangeBatch<T>> {
        self.pushed.lock().clone()
    }

    /// Forgets previously recorded batches.
    pub fn clear_pushed(&self) {
        self.pushed.lock().clear();
    }

    /// Delivers a batch of remote changes to the subscribed handler.
    pub fn emit_remote(&self, changes: Vec<ChangeRecord<T>>) {
        let handler = self.remote_handler.lock().clone();
        if let Some(handler) = handler {
            handler(&changes);
        }
    }
}

impl<T> Default for MockTransport<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> SyncTransport<T> for MockTransport<T> {
    fn push(&self, batch: &ChangeBatch<T>) -> SyncResult<PushResponse<T>> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SyncError::NotConnected);
        }
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("injected push failure"));
        }
        self.pushed.lock().push(batch.clone());
        Ok(self
            .push_response
            .lock()
            .clone()
            .unwrap_or_else(|| PushResponse::success(now_millis())))
    }

    fn pull(&self, _since: Timestamp) -> SyncResult<PullResponse<T>> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(SyncError::NotConnected);
        }
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("injected pull failure"));
        }
        Ok(self
            .pull_response
            .lock()
            .clone()
            .unwrap_or_else(|| PullResponse::success(Vec::new(), now_millis())))
    }

    fn is_online(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe_remote(&self, handler: RemoteChangeHandler<T>) -> Option<RemoteSubscription> {
        *self.remote_handler.lock() = Some(handler);
        Some(RemoteSubscription::new(|| {}))
    }
}
