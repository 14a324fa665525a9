//! Storage capability consumed by the engine.

use crate::error::{SyncError, SyncResult};
use docsync_protocol::{ChangeRecord, Document, DocumentId, Timestamp};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Durable document storage.
///
/// The store owns durable document state and the durable last-sync
/// timestamp. The engine calls it strictly sequentially from its own
/// control flow; implementations only need `Send + Sync` for the engine's
/// background workers.
pub trait DocumentStore<T>: Send + Sync {
    /// Reads a document by id.
    fn get(&self, id: &str) -> SyncResult<Option<Document<T>>>;

    /// Writes a document, replacing any existing copy.
    fn put(&self, document: Document<T>) -> SyncResult<()>;

    /// Removes a document. Removing an absent id is not an error.
    fn delete(&self, id: &str) -> SyncResult<()>;

    /// Reads several documents; absent ids are skipped.
    fn get_batch(&self, ids: &[DocumentId]) -> SyncResult<Vec<Document<T>>>;

    /// Writes several documents.
    fn put_batch(&self, documents: Vec<Document<T>>) -> SyncResult<()>;

    /// All stored documents.
    fn get_all(&self) -> SyncResult<Vec<Document<T>>>;

    /// Ids of all stored documents.
    fn get_all_ids(&self) -> SyncResult<Vec<DocumentId>>;

    /// Persisted changes recorded strictly after `ts`.
    fn changes_since(&self, ts: Timestamp) -> SyncResult<Vec<ChangeRecord<T>>>;

    /// Persists a change record.
    fn put_change(&self, change: ChangeRecord<T>) -> SyncResult<()>;

    /// Drops persisted changes recorded before `ts`.
    fn clear_changes_before(&self, ts: Timestamp) -> SyncResult<()>;

    /// The durable last-sync timestamp, if one was ever stored.
    fn last_sync_timestamp(&self) -> SyncResult<Option<Timestamp>>;

    /// Persists the last-sync timestamp.
    fn set_last_sync_timestamp(&self, ts: Timestamp) -> SyncResult<()>;

    /// Releases backing resources. The default is a no-op.
    fn close(&self) -> SyncResult<()> {
        Ok(())
    }
}

/// In-memory store for tests and ephemeral use.
pub struct MemoryStore<T> {
    documents: RwLock<HashMap<DocumentId, Document<T>>>,
    changes: RwLock<Vec<ChangeRecord<T>>>,
    last_sync: RwLock<Option<Timestamp>>,
    closed: AtomicBool,
}

impl<T> MemoryStore<T> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            changes: RwLock::new(Vec::new()),
            last_sync: RwLock::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns true if no documents are stored.
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    fn check_open(&self) -> SyncResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(SyncError::store("store is closed"))
        } else {
            Ok(())
        }
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync> DocumentStore<T> for MemoryStore<T> {
    fn get(&self, id: &str) -> SyncResult<Option<Document<T>>> {
        self.check_open()?;
        Ok(self.documents.read().get(id).cloned())
    }

    fn put(&self, document: Document<T>) -> SyncResult<()> {
        self.check_open()?;
        self.documents.write().insert(document.id.clone(), document);
        Ok(())
    }

    fn delete(&self, id: &str) -> SyncResult<()> {
        self.check_open()?;
        self.documents.write().remove(id);
        Ok(())
    }

    fn get_batch(&self, ids: &[DocumentId]) -> SyncResult<Vec<Document<T>>> {
        self.check_open()?;
        let documents = self.documents.read();
        Ok(ids.iter().filter_map(|id| documents.get(id).cloned()).collect())
    }

    fn put_batch(&self, documents: Vec<Document<T>>) -> SyncResult<()> {
        self.check_open()?;
        let mut map = self.documents.write();
        for document in documents {
            map.insert(document.id.clone(), document);
        }
        Ok(())
    }

    fn get_all(&self) -> SyncResult<Vec<Document<T>>> {
        self.check_open()?;
        Ok(self.documents.read().values().cloned().collect())
    }

    fn get_all_ids(&self) -> SyncResult<Vec<DocumentId>> {
        self.check_open()?;
        Ok(self.documents.read().keys().cloned().collect())
    }

    fn changes_since(&self, ts: Timestamp) -> SyncResult<Vec<ChangeRecord<T>>> {
        self.check_open()?;
        Ok(self
            .changes
            .read()
            .iter()
            .filter(|c| c.local_ts > ts)
            .cloned()
            .collect())
    }

    fn put_change(&self, change: ChangeRecord<T>) -> SyncResult<()> {
        self.check_open()?;
        self.changes.write().push(change);
        Ok(())
    }

    fn clear_changes_before(&self, ts: Timestamp) -> SyncResult<()> {
        self.check_open()?;
        self.changes.write().retain(|c| c.local_ts >= ts);
        Ok(())
    }

    fn last_sync_timestamp(&self) -> SyncResult<Option<Timestamp>> {
        self.check_open()?;
        Ok(*self.last_sync.read())
    }

    fn set_last_sync_timestamp(&self, ts: Timestamp) -> SyncResult<()> {
        self.check_open()?;
        *self.last_sync.write() = Some(ts);
        Ok(())
    }

    fn close(&self) -> SyncResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
