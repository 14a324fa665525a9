//! In-memory log of pending local changes.

#[cfg(test)]
use crate::change::ChangeOp;
use crate::change::ChangeRecord;
use crate::document::{now_millis, Document, DocumentId, Timestamp, Version};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Tracks local mutations that have not yet been pushed.
///
/// The tracker maintains two views of the same stream of mutations:
///
/// - an ordered **queue** of every recorded change (the push payload), and
/// - a **latest-per-document index** answering "what is the current local
///   intent for this id".
///
/// The queue may hold several records for the same document; the index
/// always holds exactly one. Both views are truncated together by
/// [`ChangeTracker::clear_changes_before`] after a successful push.
///
/// Purely in-memory; operations never fail.
pub struct ChangeTracker<T> {
    queue: VecDeque<ChangeRecord<T>>,
    latest: HashMap<DocumentId, ChangeRecord<T>>,
}

impl<T: Clone> ChangeTracker<T> {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            latest: HashMap::new(),
        }
    }

    /// Records the creation of a document. Returns the recorded change.
    pub fn record_create(&mut self, document: &Document<T>) -> ChangeRecord<T> {
        self.record(ChangeRecord::create(document, now_millis()))
    }

    /// Records an update of a document. Returns the recorded change.
    pub fn record_update(&mut self, document: &Document<T>) -> ChangeRecord<T> {
        self.record(ChangeRecord::update(document, now_millis()))
    }

    /// Records the deletion of a document. Returns the recorded change.
    pub fn record_delete(&mut self, id: &str, version: Version) -> ChangeRecord<T> {
        self.record(ChangeRecord::delete(id, version, now_millis()))
    }

    fn record(&mut self, record: ChangeRecord<T>) -> ChangeRecord<T> {
        self.queue.push_back(record.clone());
        self.latest.insert(record.id.clone(), record.clone());
        record
    }

    /// Snapshot of the pending queue in insertion order.
    pub fn pending_changes(&self) -> Vec<ChangeRecord<T>> {
        self.queue.iter().cloned().collect()
    }

    /// The first `limit` pending changes in insertion order.
    pub fn pending_batch(&self, limit: usize) -> Vec<ChangeRecord<T>> {
        self.queue.iter().take(limit).cloned().collect()
    }

    /// Number of pending changes.
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if any change is pending.
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Pending changes recorded strictly after `ts`.
    pub fn changes_since(&self, ts: Timestamp) -> Vec<ChangeRecord<T>> {
        self.queue
            .iter()
            .filter(|c| c.local_ts > ts)
            .cloned()
            .collect()
    }

    /// The most recent change recorded for a document, if any.
    pub fn latest_change(&self, id: &str) -> Option<&ChangeRecord<T>> {
        self.latest.get(id)
    }

    /// Drops every change recorded before `cutoff` from both views.
    ///
    /// After clearing, every remaining record has `local_ts >= cutoff`.
    pub fn clear_changes_before(&mut self, cutoff: Timestamp) {
        self.queue.retain(|c| c.local_ts >= cutoff);
        self.latest.retain(|_, c| c.local_ts >= cutoff);
    }

    /// Accepts records produced elsewhere (another tracker, a persisted log).
    ///
    /// Every record is appended to the queue. The index entry for a document
    /// is replaced only when the incoming record's version timestamp exceeds
    /// the current entry's.
    pub fn merge_changes(&mut self, external: Vec<ChangeRecord<T>>) {
        for record in external {
            match self.latest.get(&record.id) {
                Some(current) if current.version.ts >= record.version.ts => {}
                _ => {
                    self.latest.insert(record.id.clone(), record.clone());
                }
            }
            self.queue.push_back(record);
        }
    }

    /// Discards all pending changes.
    pub fn clear_all(&mut self) {
        self.queue.clear();
        self.latest.clear();
    }

    /// Exports the tracker contents for persistence handoff.
    pub fn export_state(&self) -> TrackerState<T> {
        TrackerState {
            changes: self.queue.iter().cloned().collect(),
            latest: self.latest.clone(),
        }
    }

    /// Replaces the tracker contents with previously exported state.
    pub fn import_state(&mut self, state: TrackerState<T>) {
        self.queue = state.changes.into();
        self.latest = state.latest;
    }
}

impl<T: Clone> Default for ChangeTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable snapshot of a [`ChangeTracker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct TrackerState<T> {
    /// The pending queue in insertion order.
    pub changes: Vec<ChangeRecord<T>>,
    /// The latest-per-document index.
    pub latest: HashMap<DocumentId, ChangeRecord<T>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn doc(id: &str, ts: Timestamp) -> Document<Value> {
        Document::new(id, json!({ "id": id }), Version::new(id, ts))
    }

    #[test]
    fn records_append_and_index() {
        let mut tracker = ChangeTracker::new();
        tracker.record_create(&doc("a", 1));
        tracker.record_update(&doc("a", 2));
        tracker.record_create(&doc("b", 3));

        assert_eq!(tracker.pending_count(), 3);
        assert!(tracker.has_pending());
        assert_eq!(tracker.latest_change("a").unwrap().op, ChangeOp::Update);
        assert_eq!(tracker.latest_change("b").unwrap().op, ChangeOp::Create);
        assert!(tracker.latest_change("c").is_none());

        let pending = tracker.pending_changes();
        assert_eq!(pending[0].id, "a");
        assert_eq!(pending[2].id, "b");
    }

    #[test]
    fn pending_batch_respects_limit_and_order() {
        let mut tracker = ChangeTracker::new();
        for i in 0..10 {
            tracker.record_create(&doc(&format!("d{i}"), i));
        }
        let batch = tracker.pending_batch(4);
        assert_eq!(batch.len(), 4);
        assert_eq!(batch[0].id, "d0");
        assert_eq!(batch[3].id, "d3");
    }

    #[test]
    fn clear_changes_before_truncates_both_views() {
        let mut tracker = ChangeTracker::new();
        let first = tracker.record_create(&doc("a", 1));
        let second = tracker.record_create(&doc("b", 2));

        tracker.clear_changes_before(second.local_ts.max(first.local_ts + 1));

        for record in tracker.pending_changes() {
            assert!(record.local_ts >= first.local_ts);
        }
        // Index entries whose record was truncated are gone too.
        let cutoff = second.local_ts + 1;
        tracker.clear_changes_before(cutoff);
        assert_eq!(tracker.pending_count(), 0);
        assert!(tracker.latest_change("a").is_none());
        assert!(tracker.latest_change("b").is_none());
    }

    #[test]
    fn delete_then_clear_all() {
        let mut tracker = ChangeTracker::new();
        tracker.record_create(&doc("a", 1));
        tracker.record_delete("a", Version::new("a", 1));
        assert_eq!(tracker.pending_count(), 2);

        tracker.clear_all();
        assert!(!tracker.has_pending());
        assert!(tracker.latest_change("a").is_none());
    }

    #[test]
    fn changes_since_filters_on_local_timestamp() {
        let mut tracker = ChangeTracker::new();
        let record = tracker.record_create(&doc("a", 1));
        assert_eq!(tracker.changes_since(record.local_ts).len(), 0);
        assert_eq!(tracker.changes_since(record.local_ts - 1).len(), 1);
    }

    #[test]
    fn merge_keeps_newest_index_entry_but_queues_everything() {
        let mut tracker = ChangeTracker::new();
        tracker.record_update(&doc("a", 100));

        let older = ChangeRecord::update(&doc("a", 50), 1);
        let newer = ChangeRecord::update(&doc("a", 200), 2);
        tracker.merge_changes(vec![older, newer]);

        // Queue holds all three; index holds the newest version.
        assert_eq!(tracker.pending_count(), 3);
        assert_eq!(tracker.latest_change("a").unwrap().version.ts, 200);
    }

    #[test]
    fn export_import_round_trip() {
        let mut tracker = ChangeTracker::new();
        tracker.record_create(&doc("a", 1));
        tracker.record_update(&doc("a", 2));
        tracker.record_create(&doc("b", 3));
        let original = tracker.pending_changes();

        let state = tracker.export_state();
        let mut restored = ChangeTracker::new();
        restored.import_state(state);

        assert_eq!(restored.pending_changes(), original);
        assert_eq!(restored.latest_change("a").unwrap().version.ts, tracker.latest_change("a").unwrap().version.ts);
    }

    #[test]
    fn tracker_state_serializes() {
        let mut tracker = ChangeTracker::new();
        tracker.record_create(&doc("a", 1));
        let state = tracker.export_state();

        let json = serde_json::to_string(&state).unwrap();
        let back: TrackerState<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
