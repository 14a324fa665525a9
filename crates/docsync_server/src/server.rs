//! The in-memory sync authority.

use crate::config::ServerConfig;
use docsync_protocol::{
    now_millis, ChangeBatch, ChangeOp, ChangeRecord, ConflictInfo, Document, DocumentId,
    PullResponse, PushResponse, Timestamp,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A change accepted by the server, stamped with the server clock.
#[derive(Debug, Clone)]
pub struct LoggedChange<T> {
    /// Server timestamp assigned on acceptance.
    pub server_ts: Timestamp,
    /// The accepted change.
    pub change: ChangeRecord<T>,
}

/// In-memory sync server.
///
/// Maintains the authoritative document table plus an ordered change log.
/// The server clock is monotonic: every accepted change gets a timestamp
/// strictly greater than all previously assigned ones, so pull cursors
/// never skip changes.
pub struct SyncServer<T> {
    config: ServerConfig,
    documents: RwLock<HashMap<DocumentId, Document<T>>>,
    log: RwLock<Vec<LoggedChange<T>>>,
    clock: AtomicU64,
}

impl<T: Clone + Send + Sync> SyncServer<T> {
    /// Creates a server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            documents: RwLock::new(HashMap::new()),
            log: RwLock::new(Vec::new()),
            clock: AtomicU64::new(now_millis()),
        }
    }

    /// The current server cursor (timestamp of the latest accepted change).
    pub fn cursor(&self) -> Timestamp {
        self.clock.load(Ordering::SeqCst)
    }

    /// Number of stored documents.
    pub fn document_count(&self) -> usize {
        self.documents.read().len()
    }

    /// Number of accepted changes.
    pub fn change_count(&self) -> usize {
        self.log.read().len()
    }

    /// Reads a stored document.
    pub fn get_document(&self, id: &str) -> Option<Document<T>> {
        self.documents.read().get(id).cloned()
    }

    /// Processes a pushed batch.
    ///
    /// A create or update whose version is older than the stored head is
    /// not applied; it is reported back as a conflict with the pushing
    /// client's copy on the local side. Deletes always apply.
    pub fn handle_push(&self, batch: ChangeBatch<T>) -> PushResponse<T> {
        let mut conflicts = Vec::new();
        let mut documents = self.documents.write();
        let mut log = self.log.write();

        for change in batch.changes {
            match change.op {
                ChangeOp::Delete => {
                    documents.remove(&change.id);
                    let server_ts = self.tick();
                    log.push(LoggedChange { server_ts, change });
                }
                ChangeOp::Create | ChangeOp::Update => {
                    let data = match &change.data {
                        Some(data) => data.clone(),
                        None => continue,
                    };

                    if let Some(stored) = documents.get(&change.id) {
                        if stored.version.ts > change.version.ts {
                            conflicts.push(ConflictInfo {
                                document_id: change.id.clone(),
                                local_version: change.version.clone(),
                                remote_version: stored.version.clone(),
                                local_data: data,
                                remote_data: stored.data.clone(),
                            });
                            continue;
                        }
                    }

                    documents.insert(
                        change.id.clone(),
                        Document::new(change.id.clone(), data, change.version.clone()),
                    );
                    let server_ts = self.tick();
                    log.push(LoggedChange { server_ts, change });
                }
            }
        }

        PushResponse::with_conflicts(self.cursor(), conflicts)
    }

    /// Serves changes accepted strictly after `since`.
    pub fn handle_pull(&self, since: Timestamp) -> PullResponse<T> {
        let log = self.log.read();
        let changes: Vec<ChangeRecord<T>> = log
            .iter()
            .filter(|entry| entry.server_ts > since)
            .take(self.config.max_pull_batch)
            .map(|entry| entry.change.clone())
            .collect();

        PullResponse::success(changes, self.cursor())
    }

    /// Liveness check.
    pub fn health(&self) -> bool {
        true
    }

    /// Advances the server clock past both the wall clock and its own past.
    fn tick(&self) -> Timestamp {
        let now = now_millis();
        let mut prev = self.clock.load(Ordering::SeqCst);
        loop {
            let next = now.max(prev + 1);
            match self
                .clock
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_protocol::Version;
    use serde_json::{json, Value};

    fn server() -> SyncServer<Value> {
        SyncServer::new(ServerConfig::default())
    }

    fn create_change(id: &str, ts: Timestamp) -> ChangeRecord<Value> {
        let doc = Document::new(id, json!({ "id": id }), Version::new(id, ts));
        ChangeRecord::create(&doc, ts)
    }

    #[test]
    fn push_then_pull_round_trip() {
        let server = server();
        let cursor_before = server.cursor();

        let response = server.handle_push(ChangeBatch::new(
            vec![create_change("a", 10), create_change("b", 20)],
            None,
        ));
        assert!(response.success);
        assert!(response.conflicts.is_empty());
        assert_eq!(server.document_count(), 2);
        assert_eq!(server.change_count(), 2);

        let pulled = server.handle_pull(cursor_before);
        assert_eq!(pulled.changes.len(), 2);
        assert_eq!(pulled.timestamp, server.cursor());

        // Pulling from the new cursor yields nothing.
        assert!(server.handle_pull(pulled.timestamp).changes.is_empty());
    }

    #[test]
    fn stale_push_is_reported_as_conflict() {
        let server = server();
        server.handle_push(ChangeBatch::new(vec![create_change("x", 200)], None));

        let change_count = server.change_count();
        let response = server.handle_push(ChangeBatch::new(vec![create_change("x", 100)], None));

        assert!(response.success);
        assert_eq!(response.conflicts.len(), 1);
        let conflict = &response.conflicts[0];
        assert_eq!(conflict.document_id, "x");
        // The pushing client's copy is the local side of the report.
        assert_eq!(conflict.local_version.ts, 100);
        assert_eq!(conflict.remote_version.ts, 200);

        // The stale change was not applied or logged.
        assert_eq!(server.get_document("x").unwrap().version.ts, 200);
        assert_eq!(server.change_count(), change_count);
    }

    #[test]
    fn newer_push_replaces_the_stored_document() {
        let server = server();
        server.handle_push(ChangeBatch::new(vec![create_change("x", 100)], None));
        let response = server.handle_push(ChangeBatch::new(vec![create_change("x", 300)], None));

        assert!(response.conflicts.is_empty());
        assert_eq!(server.get_document("x").unwrap().version.ts, 300);
    }

    #[test]
    fn delete_always_applies() {
        let server = server();
        server.handle_push(ChangeBatch::new(vec![create_change("x", 500)], None));

        let delete: ChangeRecord<Value> = ChangeRecord::delete("x", Version::new("x", 1), 1);
        server.handle_push(ChangeBatch::new(vec![delete], None));

        assert!(server.get_document("x").is_none());
        assert_eq!(server.change_count(), 2);
    }

    #[test]
    fn server_clock_is_monotonic() {
        let server = server();
        let before = server.cursor();
        server.handle_push(ChangeBatch::new(
            vec![create_change("a", 1), create_change("b", 2)],
            None,
        ));

        let log = server.log.read();
        assert!(log[0].server_ts > before);
        assert!(log[1].server_ts > log[0].server_ts);
    }

    #[test]
    fn pull_respects_the_batch_limit() {
        let server: SyncServer<Value> =
            SyncServer::new(ServerConfig::new().with_max_pull_batch(2));
        let cursor = server.cursor();
        server.handle_push(ChangeBatch::new(
            vec![
                create_change("a", 1),
                create_change("b", 2),
                create_change("c", 3),
            ],
            None,
        ));

        assert_eq!(server.handle_pull(cursor).changes.len(), 2);
    }

    #[test]
    fn change_without_data_is_skipped() {
        let server = server();
        let mut change = create_change("a", 1);
        change.data = None;
        let response = server.handle_push(ChangeBatch::new(vec![change], None));

        assert!(response.success);
        assert_eq!(server.document_count(), 0);
        assert_eq!(server.change_count(), 0);
    }
}
