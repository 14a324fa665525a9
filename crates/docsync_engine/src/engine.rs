//! The synchronization orchestrator.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncDirection, SyncEvent};
use crate::schedule::{Debounce, Shutdown};
use crate::store::DocumentStore;
use crate::transport::{RemoteChangeHandler, RemoteSubscription, SyncTransport};
use docsync_protocol::{
    now_millis, ChangeBatch, ChangeOp, ChangeRecord, ChangeTracker, ConflictInfo,
    ConflictResolver, Document, DocumentId, LwwResolver, Timestamp, Version,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use uuid::Uuid;

/// Snapshot of the engine's sync state, recomputed on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    /// Server timestamp of the last successful pull.
    pub last_pull_timestamp: Timestamp,
    /// Server timestamp of the last successful push.
    pub last_push_timestamp: Timestamp,
    /// Number of local changes waiting to be pushed.
    pub pending_changes: usize,
    /// Last connectivity probe result.
    pub is_online: bool,
    /// Whether a pull or push currently holds the sync permit.
    pub is_syncing: bool,
}

/// Counters accumulated across sync cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Completed pulls.
    pub pulls_completed: u64,
    /// Completed pushes.
    pub pushes_completed: u64,
    /// Remote changes received across all pulls.
    pub changes_pulled: u64,
    /// Local changes transmitted across all pushes.
    pub changes_pushed: u64,
    /// Conflicts resolved and written back.
    pub conflicts_resolved: u64,
    /// Transport retries performed.
    pub retries: u64,
    /// Most recent sync failure, if any.
    pub last_error: Option<String>,
}

/// Offline-first synchronization engine.
///
/// The engine owns the pending change log and the two last-sync
/// timestamps; the injected [`DocumentStore`] owns durable document state;
/// the injected [`SyncTransport`] owns remote connectivity.
///
/// Local CRUD persists through the store, records a change, emits the
/// matching document event, and schedules a debounced push. Independently,
/// a periodic ticker and a connectivity probe drive pull/apply cycles, and
/// a transport-supplied real-time feed shares the same apply path.
///
/// Every asynchronous path owned by the engine catches its own failures
/// and converts them to `sync:failed` events; [`SyncEngine::sync`] never
/// returns an error.
pub struct SyncEngine<T: Clone + Send + Sync + 'static> {
    inner: Arc<EngineInner<T>>,
}

struct EngineInner<T> {
    config: SyncConfig,
    store: Arc<dyn DocumentStore<T>>,
    transport: Arc<dyn SyncTransport<T>>,
    resolver: Arc<dyn ConflictResolver<T>>,
    events: EventBus<T>,
    tracker: Mutex<ChangeTracker<T>>,
    stats: Mutex<SyncStats>,
    started: AtomicBool,
    online: AtomicBool,
    // Single sync permit: only one of pull/push/sync may hold it.
    syncing: AtomicBool,
    last_pull_ts: AtomicU64,
    last_push_ts: AtomicU64,
    shutdown: Shutdown,
    debounce: Debounce,
    remote_sub: Mutex<Option<RemoteSubscription>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Clone + Send + Sync + 'static> SyncEngine<T> {
    /// Creates an engine with the default last-write-wins resolver.
    pub fn new(
        config: SyncConfig,
        store: Arc<dyn DocumentStore<T>>,
        transport: Arc<dyn SyncTransport<T>>,
    ) -> Self {
        Self::with_resolver(config, store, transport, Arc::new(LwwResolver::new()))
    }

    /// Creates an engine with a custom conflict resolver.
    pub fn with_resolver(
        config: SyncConfig,
        store: Arc<dyn DocumentStore<T>>,
        transport: Arc<dyn SyncTransport<T>>,
        resolver: Arc<dyn ConflictResolver<T>>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                store,
                transport,
                resolver,
                events: EventBus::new(),
                tracker: Mutex::new(ChangeTracker::new()),
                stats: Mutex::new(SyncStats::default()),
                started: AtomicBool::new(false),
                online: AtomicBool::new(false),
                syncing: AtomicBool::new(false),
                last_pull_ts: AtomicU64::new(0),
                last_push_ts: AtomicU64::new(0),
                shutdown: Shutdown::new(),
                debounce: Debounce::new(),
                remote_sub: Mutex::new(None),
                workers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The engine's event bus.
    pub fn events(&self) -> &EventBus<T> {
        &self.inner.events
    }

    /// Starts the engine. Calling `start` on a started engine is a no-op.
    ///
    /// Seeds the last-sync timestamps from the store (defaulting to 0 on
    /// any load failure), probes connectivity once, installs the periodic
    /// and probe tickers plus the debounce worker, subscribes to the
    /// transport's real-time feed when offered, and, if currently online,
    /// runs one full sync before returning.
    pub fn start(&self) {
        let inner = &self.inner;
        if inner.started.swap(true, Ordering::SeqCst) {
            return;
        }
        inner.shutdown.reset();

        let initial = match inner.store.last_sync_timestamp() {
            Ok(Some(ts)) => ts,
            Ok(None) => 0,
            Err(err) => {
                tracing::debug!(error = %err, "last sync timestamp unavailable, starting from 0");
                0
            }
        };
        inner.last_pull_ts.store(initial, Ordering::SeqCst);
        inner.last_push_ts.store(initial, Ordering::SeqCst);

        // The initial probe does not schedule the delayed post-online sync;
        // start itself runs the first sync below.
        EngineInner::probe_once(inner, false);

        if inner.config.sync_interval > std::time::Duration::ZERO {
            let worker = Arc::clone(inner);
            let interval = inner.config.sync_interval;
            inner.spawn_worker(move || loop {
                if worker.shutdown.wait_for(interval) || !worker.started.load(Ordering::SeqCst) {
                    break;
                }
                worker.sync();
            });
        }

        {
            let worker = Arc::clone(inner);
            let interval = inner.config.online_probe_interval;
            inner.spawn_worker(move || loop {
                if worker.shutdown.wait_for(interval) || !worker.started.load(Ordering::SeqCst) {
                    break;
                }
                EngineInner::probe_once(&worker, true);
            });
        }

        {
            let worker = Arc::clone(inner);
            inner.spawn_worker(move || {
                while worker.debounce.wait_expired(&worker.shutdown).is_some() {
                    worker.push();
                }
            });
        }

        let weak = Arc::downgrade(inner);
        let handler: RemoteChangeHandler<T> = Arc::new(move |changes| {
            if let Some(engine) = weak.upgrade() {
                engine.on_remote_changes(changes);
            }
        });
        if let Some(sub) = inner.transport.subscribe_remote(handler) {
            *inner.remote_sub.lock() = Some(sub);
        }

        if inner.online.load(Ordering::SeqCst) {
            inner.sync();
        }
    }

    /// Stops the engine: cancels all tickers and joins the workers.
    ///
    /// In-flight transport calls run to completion and their events are
    /// still delivered. Calling `stop` on a stopped engine is a no-op.
    pub fn stop(&self) {
        let inner = &self.inner;
        if !inner.started.swap(false, Ordering::SeqCst) {
            return;
        }
        inner.shutdown.signal();
        inner.debounce.interrupt();
        if let Some(sub) = inner.remote_sub.lock().take() {
            sub.cancel();
        }
        let workers: Vec<_> = std::mem::take(&mut *inner.workers.lock());
        for handle in workers {
            let _ = handle.join();
        }
    }

    /// Stops the engine and closes the store.
    pub fn close(&self) -> SyncResult<()> {
        self.stop();
        self.inner.store.close()
    }

    /// Reads a document. Pure store read.
    pub fn get(&self, id: &str) -> SyncResult<Option<Document<T>>> {
        self.inner.store.get(id)
    }

    /// Creates a document, synthesizing an id when none is given.
    ///
    /// Persists through the store, records the change, emits
    /// `document:created`, and schedules a debounced push.
    pub fn create(&self, data: T, id: Option<DocumentId>) -> SyncResult<Document<T>> {
        let inner = &self.inner;
        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let document = Document::new(id.clone(), data, Version::new(id, now_millis()));

        inner.store.put(document.clone())?;
        inner.tracker.lock().record_create(&document);
        inner.events.emit(SyncEvent::DocumentCreated {
            document: document.clone(),
        });
        inner.schedule_push();
        Ok(document)
    }

    /// Writes a document verbatim, keeping the caller's version.
    ///
    /// Records an update and emits `document:updated` with the version the
    /// store held before the write (the written version when absent).
    pub fn put(&self, document: Document<T>) -> SyncResult<()> {
        let inner = &self.inner;
        let previous = inner.store.get(&document.id)?.map(|d| d.version);

        inner.store.put(document.clone())?;
        inner.tracker.lock().record_update(&document);
        let previous_version = previous.unwrap_or_else(|| document.version.clone());
        inner.events.emit(SyncEvent::DocumentUpdated {
            document,
            previous_version,
        });
        inner.schedule_push();
        Ok(())
    }

    /// Replaces a document's payload under a strictly greater version.
    ///
    /// Returns `None` when the document does not exist.
    pub fn update(&self, id: &str, data: T) -> SyncResult<Option<Document<T>>> {
        let inner = &self.inner;
        let prior = match inner.store.get(id)? {
            Some(prior) => prior,
            None => return Ok(None),
        };

        let version = prior.version.successor(now_millis());
        let document = Document::new(id.to_string(), data, version);

        inner.store.put(document.clone())?;
        inner.tracker.lock().record_update(&document);
        inner.events.emit(SyncEvent::DocumentUpdated {
            document: document.clone(),
            previous_version: prior.version,
        });
        inner.schedule_push();
        Ok(Some(document))
    }

    /// Deletes a document. Returns false when the document does not exist.
    pub fn delete(&self, id: &str) -> SyncResult<bool> {
        let inner = &self.inner;
        let prior = match inner.store.get(id)? {
            Some(prior) => prior,
            None => return Ok(false),
        };

        inner.store.delete(id)?;
        inner
            .tracker
            .lock()
            .record_delete(id, prior.version.clone());
        inner.events.emit(SyncEvent::DocumentDeleted {
            id: id.to_string(),
            version: prior.version,
        });
        inner.schedule_push();
        Ok(true)
    }

    /// Runs a full sync cycle: pull, then push. Never fails; each half
    /// reports its own failures through `sync:failed` events.
    pub fn sync(&self) {
        self.inner.sync();
    }

    /// Runs the pull half-sync. A no-op while offline or already syncing.
    pub fn pull(&self) {
        self.inner.pull();
    }

    /// Runs the push half-sync. A no-op while offline, already syncing,
    /// or with nothing pending.
    pub fn push(&self) {
        self.inner.push();
    }

    /// Current sync state snapshot.
    pub fn sync_state(&self) -> SyncState {
        self.inner.snapshot()
    }

    /// Accumulated sync counters.
    pub fn stats(&self) -> SyncStats {
        self.inner.stats.lock().clone()
    }

    /// Snapshot of the pending change queue.
    pub fn pending_changes(&self) -> Vec<ChangeRecord<T>> {
        self.inner.tracker.lock().pending_changes()
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for SyncEngine<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<T: Clone + Send + Sync + 'static> EngineInner<T> {
    fn spawn_worker(&self, f: impl FnOnce() + Send + 'static) {
        self.workers.lock().push(std::thread::spawn(f));
    }

    fn schedule_push(&self) {
        self.debounce.schedule(self.config.debounce_delay);
    }

    fn snapshot(&self) -> SyncState {
        SyncState {
            last_pull_timestamp: self.last_pull_ts.load(Ordering::SeqCst),
            last_push_timestamp: self.last_push_ts.load(Ordering::SeqCst),
            pending_changes: self.tracker.lock().pending_count(),
            is_online: self.online.load(Ordering::SeqCst),
            is_syncing: self.syncing.load(Ordering::SeqCst),
        }
    }

    fn sync(&self) {
        if self.syncing.load(Ordering::SeqCst) || !self.online.load(Ordering::SeqCst) {
            return;
        }
        self.pull();
        self.push();
    }

    fn pull(&self) {
        if !self.online.load(Ordering::SeqCst) {
            return;
        }
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        self.events.emit(SyncEvent::SyncStarted {
            direction: SyncDirection::Pull,
        });

        let since = self.last_pull_ts.load(Ordering::SeqCst);
        let outcome = self.with_retry(|| {
            let response = self.transport.pull(since)?;
            if response.success {
                Ok(response)
            } else {
                Err(SyncError::Server(
                    response
                        .error
                        .unwrap_or_else(|| "pull rejected".to_string()),
                ))
            }
        });

        match outcome {
            Ok(response) => {
                let change_count = response.changes.len();
                for change in &response.changes {
                    if let Err(err) = self.apply_remote_change(change) {
                        tracing::warn!(document = %change.id, error = %err, "remote change not applied");
                        self.record_failure(&err);
                        self.events.emit(SyncEvent::SyncFailed {
                            direction: SyncDirection::Pull,
                            error: err.to_string(),
                            document_id: Some(change.id.clone()),
                        });
                    }
                }

                self.last_pull_ts
                    .store(response.timestamp, Ordering::SeqCst);
                match self.store.set_last_sync_timestamp(response.timestamp) {
                    Ok(()) => {
                        let mut stats = self.stats.lock();
                        stats.pulls_completed += 1;
                        stats.changes_pulled += change_count as u64;
                        drop(stats);
                        self.events.emit(SyncEvent::SyncCompleted {
                            direction: SyncDirection::Pull,
                            change_count,
                        });
                    }
                    Err(err) => {
                        self.record_failure(&err);
                        self.events.emit(SyncEvent::SyncFailed {
                            direction: SyncDirection::Pull,
                            error: err.to_string(),
                            document_id: None,
                        });
                    }
                }
            }
            Err(err) => {
                self.record_failure(&err);
                self.events.emit(SyncEvent::SyncFailed {
                    direction: SyncDirection::Pull,
                    error: err.to_string(),
                    document_id: None,
                });
            }
        }

        self.syncing.store(false, Ordering::SeqCst);
        self.events.emit(SyncEvent::StateChanged {
            state: self.snapshot(),
        });
    }

    fn push(&self) {
        if !self.online.load(Ordering::SeqCst) {
            return;
        }
        if !self.tracker.lock().has_pending() {
            return;
        }
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        self.events.emit(SyncEvent::SyncStarted {
            direction: SyncDirection::Push,
        });

        let pending = self.tracker.lock().pending_batch(self.config.batch_size);
        let batch = ChangeBatch::new(
            pending.clone(),
            Some(self.last_push_ts.load(Ordering::SeqCst)),
        );

        let outcome = self.with_retry(|| {
            let response = self.transport.push(&batch)?;
            if response.success {
                Ok(response)
            } else {
                Err(SyncError::Server(
                    response
                        .error
                        .unwrap_or_else(|| "push rejected".to_string()),
                ))
            }
        });

        match outcome {
            Ok(response) => {
                for conflict in response.conflicts {
                    self.resolve_conflict(conflict);
                }

                let cutoff = pending
                    .iter()
                    .map(|c| c.local_ts)
                    .max()
                    .map(|ts| ts + 1)
                    .unwrap_or(0);
                self.tracker.lock().clear_changes_before(cutoff);

                let mut persisted = true;
                if let Some(ts) = response.timestamp {
                    self.last_push_ts.store(ts, Ordering::SeqCst);
                    if let Err(err) = self.store.set_last_sync_timestamp(ts) {
                        persisted = false;
                        self.record_failure(&err);
                        self.events.emit(SyncEvent::SyncFailed {
                            direction: SyncDirection::Push,
                            error: err.to_string(),
                            document_id: None,
                        });
                    }
                }

                if persisted {
                    let mut stats = self.stats.lock();
                    stats.pushes_completed += 1;
                    stats.changes_pushed += pending.len() as u64;
                    drop(stats);
                    self.events.emit(SyncEvent::SyncCompleted {
                        direction: SyncDirection::Push,
                        change_count: pending.len(),
                    });
                }
            }
            Err(err) => {
                self.record_failure(&err);
                self.events.emit(SyncEvent::SyncFailed {
                    direction: SyncDirection::Push,
                    error: err.to_string(),
                    document_id: None,
                });
            }
        }

        self.syncing.store(false, Ordering::SeqCst);
        self.events.emit(SyncEvent::StateChanged {
            state: self.snapshot(),
        });
    }

    /// Calls `f` up to `retry_attempts` times with exponential backoff.
    ///
    /// Only retryable errors are retried; the backoff wait is interrupted
    /// by shutdown, in which case the last error is returned as-is.
    fn with_retry<R>(&self, f: impl Fn() -> SyncResult<R>) -> SyncResult<R> {
        let attempts = self.config.retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= attempts || !err.is_retryable() {
                        return Err(err);
                    }
                    self.stats.lock().retries += 1;
                    let backoff = self.config.retry_backoff(attempt);
                    tracing::debug!(attempt, backoff = ?backoff, error = %err, "retrying transport call");
                    if self.shutdown.wait_for(backoff) {
                        return Err(err);
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Applies one remote change to the local store.
    ///
    /// Creates and updates write the remote copy unless the local head is
    /// strictly newer, which escalates to conflict resolution. Deletes are
    /// authoritative and apply unconditionally.
    fn apply_remote_change(&self, change: &ChangeRecord<T>) -> SyncResult<()> {
        let applied: SyncResult<()> = match change.op {
            ChangeOp::Delete => self.store.delete(&change.id),
            ChangeOp::Create | ChangeOp::Update => {
                let data = match change.data.clone() {
                    Some(data) => data,
                    None => return Ok(()),
                };

                match self.store.get(&change.id) {
                    Ok(Some(local)) if local.version.ts > change.version.ts => {
                        self.resolve_conflict(ConflictInfo {
                            document_id: change.id.clone(),
                            local_version: local.version,
                            remote_version: change.version.clone(),
                            local_data: local.data,
                            remote_data: data,
                        });
                        Ok(())
                    }
                    Ok(_) => self.store.put(Document::new(
                        change.id.clone(),
                        data,
                        change.version.clone(),
                    )),
                    Err(err) => Err(err),
                }
            }
        };

        applied.map_err(|err| SyncError::Apply {
            document_id: change.id.clone(),
            message: err.to_string(),
        })
    }

    /// Resolves one conflict and writes the resolution back.
    ///
    /// The resolved version is clamped so it never regresses below the
    /// newer of the two conflicting versions. The resolution is recorded
    /// as an update so it propagates on the next push. Resolver and
    /// write-back failures surface as per-document `sync:failed` events
    /// and do not stop other conflicts from resolving.
    fn resolve_conflict(&self, conflict: ConflictInfo<T>) {
        let document_id = conflict.document_id.clone();
        let floor = conflict.local_version.ts.max(conflict.remote_version.ts);

        self.events.emit(SyncEvent::ConflictDetected {
            conflict: conflict.clone(),
        });

        let resolution = match self.resolver.resolve(&conflict) {
            Ok(resolution) => resolution,
            Err(err) => {
                let err = SyncError::Resolve {
                    document_id: document_id.clone(),
                    message: err.to_string(),
                };
                self.record_failure(&err);
                self.events.emit(SyncEvent::SyncFailed {
                    direction: SyncDirection::Push,
                    error: err.to_string(),
                    document_id: Some(document_id),
                });
                return;
            }
        };

        let mut version = resolution.resolved_version;
        if version.ts < floor {
            version.ts = floor;
        }
        let document = Document::new(document_id.clone(), resolution.resolved_data, version);

        match self.store.put(document.clone()) {
            Ok(()) => {
                self.tracker.lock().record_update(&document);
                self.stats.lock().conflicts_resolved += 1;
                self.events.emit(SyncEvent::ConflictResolved {
                    document_id,
                    resolved_version: document.version,
                });
            }
            Err(err) => {
                let err = SyncError::Resolve {
                    document_id: document_id.clone(),
                    message: err.to_string(),
                };
                self.record_failure(&err);
                self.events.emit(SyncEvent::SyncFailed {
                    direction: SyncDirection::Push,
                    error: err.to_string(),
                    document_id: Some(document_id),
                });
            }
        }
    }

    /// Runs one connectivity probe and reacts to transitions.
    fn probe_once(this: &Arc<Self>, schedule_post_sync: bool) {
        let online = this.transport.is_online();
        let was_online = this.online.swap(online, Ordering::SeqCst);
        if was_online == online {
            return;
        }

        this.events.emit(if online {
            SyncEvent::ConnectionOnline
        } else {
            SyncEvent::ConnectionOffline
        });
        this.events.emit(SyncEvent::StateChanged {
            state: this.snapshot(),
        });

        if online && schedule_post_sync && this.started.load(Ordering::SeqCst) {
            let worker = Arc::clone(this);
            let delay = this.config.post_online_sync_delay;
            this.spawn_worker(move || {
                if !worker.shutdown.wait_for(delay) && worker.started.load(Ordering::SeqCst) {
                    worker.sync();
                }
            });
        }
    }

    /// Applies a real-time batch of remote changes.
    fn on_remote_changes(&self, changes: &[ChangeRecord<T>]) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }
        for change in changes {
            if let Err(err) = self.apply_remote_change(change) {
                self.record_failure(&err);
                self.events.emit(SyncEvent::SyncFailed {
                    direction: SyncDirection::Pull,
                    error: err.to_string(),
                    document_id: Some(change.id.clone()),
                });
            }
        }
        self.events.emit(SyncEvent::StateChanged {
            state: self.snapshot(),
        });
    }

    fn record_failure(&self, err: &SyncError) {
        self.stats.lock().last_error = Some(err.to_string());
    }
}
