//! Typed publish/subscribe for engine events.

use crate::engine::SyncState;
use docsync_protocol::{ConflictInfo, Document, DocumentId, Version};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// The event taxonomy, keyed by its literal wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `document:created`
    DocumentCreated,
    /// `document:updated`
    DocumentUpdated,
    /// `document:deleted`
    DocumentDeleted,
    /// `sync:started`
    SyncStarted,
    /// `sync:completed`
    SyncCompleted,
    /// `sync:failed`
    SyncFailed,
    /// `conflict:detected`
    ConflictDetected,
    /// `conflict:resolved`
    ConflictResolved,
    /// `connection:online`
    ConnectionOnline,
    /// `connection:offline`
    ConnectionOffline,
    /// `state:changed`
    StateChanged,
}

impl EventKind {
    /// The literal event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DocumentCreated => "document:created",
            EventKind::DocumentUpdated => "document:updated",
            EventKind::DocumentDeleted => "document:deleted",
            EventKind::SyncStarted => "sync:started",
            EventKind::SyncCompleted => "sync:completed",
            EventKind::SyncFailed => "sync:failed",
            EventKind::ConflictDetected => "conflict:detected",
            EventKind::ConflictResolved => "conflict:resolved",
            EventKind::ConnectionOnline => "connection:online",
            EventKind::ConnectionOffline => "connection:offline",
            EventKind::StateChanged => "state:changed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which half-sync an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// Fetching remote changes.
    Pull,
    /// Transmitting pending local changes.
    Push,
}

/// An engine event with its payload.
#[derive(Debug, Clone)]
pub enum SyncEvent<T> {
    /// A document was created locally.
    DocumentCreated {
        /// The created document.
        document: Document<T>,
    },
    /// A document was updated locally.
    DocumentUpdated {
        /// The document after the write.
        document: Document<T>,
        /// Version the document carried before the write.
        previous_version: Version,
    },
    /// A document was deleted locally.
    DocumentDeleted {
        /// Id of the deleted document.
        id: DocumentId,
        /// Version the document carried when deleted.
        version: Version,
    },
    /// A half-sync entered its critical section.
    SyncStarted {
        /// Pull or push.
        direction: SyncDirection,
    },
    /// A half-sync finished successfully.
    SyncCompleted {
        /// Pull or push.
        direction: SyncDirection,
        /// Number of changes processed.
        change_count: usize,
    },
    /// A half-sync, or one of its per-document steps, failed.
    SyncFailed {
        /// Pull or push.
        direction: SyncDirection,
        /// Failure description.
        error: String,
        /// The affected document for per-document failures.
        document_id: Option<DocumentId>,
    },
    /// A divergence between local and remote copies was found.
    ConflictDetected {
        /// The diverged document pair.
        conflict: ConflictInfo<T>,
    },
    /// A divergence was resolved and written back.
    ConflictResolved {
        /// The resolved document.
        document_id: DocumentId,
        /// Version written back as the new head.
        resolved_version: Version,
    },
    /// Connectivity probe observed a transition to online.
    ConnectionOnline,
    /// Connectivity probe observed a transition to offline.
    ConnectionOffline,
    /// Engine state snapshot after a sync or connectivity transition.
    StateChanged {
        /// The snapshot.
        state: SyncState,
    },
}

impl<T> SyncEvent<T> {
    /// The kind this event is dispatched under.
    pub fn kind(&self) -> EventKind {
        match self {
            SyncEvent::DocumentCreated { .. } => EventKind::DocumentCreated,
            SyncEvent::DocumentUpdated { .. } => EventKind::DocumentUpdated,
            SyncEvent::DocumentDeleted { .. } => EventKind::DocumentDeleted,
            SyncEvent::SyncStarted { .. } => EventKind::SyncStarted,
            SyncEvent::SyncCompleted { .. } => EventKind::SyncCompleted,
            SyncEvent::SyncFailed { .. } => EventKind::SyncFailed,
            SyncEvent::ConflictDetected { .. } => EventKind::ConflictDetected,
            SyncEvent::ConflictResolved { .. } => EventKind::ConflictResolved,
            SyncEvent::ConnectionOnline => EventKind::ConnectionOnline,
            SyncEvent::ConnectionOffline => EventKind::ConnectionOffline,
            SyncEvent::StateChanged { .. } => EventKind::StateChanged,
        }
    }
}

type Listener<T> = Arc<dyn Fn(&SyncEvent<T>) + Send + Sync>;

struct BusInner<T> {
    listeners: RwLock<HashMap<EventKind, Vec<(u64, Listener<T>)>>>,
    next_id: AtomicU64,
}

/// Typed publish/subscribe bus.
///
/// Listeners for an event run in registration order. A panicking listener
/// is logged and swallowed; it never prevents subsequent listeners from
/// running nor escapes [`EventBus::emit`].
pub struct EventBus<T> {
    inner: Arc<BusInner<T>>,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> EventBus<T> {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                listeners: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Registers a listener for an event kind.
    ///
    /// The returned handle unsubscribes the listener; dropping the handle
    /// without calling [`Subscription::unsubscribe`] leaves it registered.
    pub fn on(
        &self,
        kind: EventKind,
        listener: impl Fn(&SyncEvent<T>) + Send + Sync + 'static,
    ) -> Subscription<T> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner
            .listeners
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        Subscription {
            bus: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    /// Delivers an event to every listener registered for its kind.
    pub fn emit(&self, event: SyncEvent<T>) {
        let kind = event.kind();
        // Snapshot outside the lock so listeners can re-enter the bus.
        let snapshot: Vec<Listener<T>> = {
            let listeners = self.inner.listeners.read();
            match listeners.get(&kind) {
                Some(entries) => entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
                None => return,
            }
        };

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                tracing::warn!(event = kind.as_str(), "event listener panicked");
            }
        }
    }

    /// Number of listeners registered for a kind.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner
            .listeners
            .read()
            .get(&kind)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// Removes all listeners for `kind`, or for every kind when `None`.
    pub fn remove_all_listeners(&self, kind: Option<EventKind>) {
        let mut listeners = self.inner.listeners.write();
        match kind {
            Some(kind) => {
                listeners.remove(&kind);
            }
            None => listeners.clear(),
        }
    }
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for removing a registered listener. Unsubscribing twice is a no-op.
pub struct Subscription<T> {
    bus: Weak<BusInner<T>>,
    kind: EventKind,
    id: u64,
}

impl<T> Subscription<T> {
    /// Removes the listener from the bus.
    pub fn unsubscribe(&self) {
        if let Some(bus) = self.bus.upgrade() {
            let mut listeners = bus.listeners.write();
            if let Some(entries) = listeners.get_mut(&self.kind) {
                entries.retain(|(id, _)| *id != self.id);
                if entries.is_empty() {
                    listeners.remove(&self.kind);
                }
            }
        }
    }
}
