//! Change records and batches.

use crate::document::{Document, DocumentId, Timestamp, Version};
use serde::{Deserialize, Serialize};

/// The kind of local mutation a change record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    /// A document was created.
    Create,
    /// A document was updated.
    Update,
    /// A document was deleted.
    Delete,
}

/// A single recorded mutation, queued for eventual transmission.
///
/// `data` is present for `Create` and `Update` and absent (`null` on the
/// wire) for `Delete`. `local_ts` is the moment the mutation was recorded
/// on this device, which is distinct from `version.ts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct ChangeRecord<T> {
    /// Id of the mutated document.
    pub id: DocumentId,
    /// Kind of mutation.
    pub op: ChangeOp,
    /// Payload after the mutation; `None` for deletes.
    #[serde(default)]
    pub data: Option<T>,
    /// Version produced by the mutation (prior version for deletes).
    pub version: Version,
    /// Local wall-clock time at which the mutation was recorded.
    pub local_ts: Timestamp,
}

impl<T: Clone> ChangeRecord<T> {
    /// Builds a create record from a document.
    pub fn create(document: &Document<T>, local_ts: Timestamp) -> Self {
        Self {
            id: document.id.clone(),
            op: ChangeOp::Create,
            data: Some(document.data.clone()),
            version: document.version.clone(),
            local_ts,
        }
    }

    /// Builds an update record from a document.
    pub fn update(document: &Document<T>, local_ts: Timestamp) -> Self {
        Self {
            id: document.id.clone(),
            op: ChangeOp::Update,
            data: Some(document.data.clone()),
            version: document.version.clone(),
            local_ts,
        }
    }

    /// Builds a delete record for a document id and its last known version.
    pub fn delete(id: impl Into<DocumentId>, version: Version, local_ts: Timestamp) -> Self {
        Self {
            id: id.into(),
            op: ChangeOp::Delete,
            data: None,
            version,
            local_ts,
        }
    }

    /// Returns true if this record carries a payload.
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }
}

/// The payload of a single push: an ordered slice of the pending queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeBatch<T> {
    /// Changes ordered by `local_ts` ascending.
    pub changes: Vec<ChangeRecord<T>>,
    /// The sender's last successful sync timestamp, if any.
    #[serde(default)]
    pub last_sync_timestamp: Option<Timestamp>,
}

impl<T> ChangeBatch<T> {
    /// Creates a batch.
    pub fn new(changes: Vec<ChangeRecord<T>>, last_sync_timestamp: Option<Timestamp>) -> Self {
        Self {
            changes,
            last_sync_timestamp,
        }
    }

    /// Number of changes in the batch.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns true if the batch carries no changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, ts: Timestamp) -> Document<serde_json::Value> {
        Document::new(id, serde_json::json!({"n": 1}), Version::new(id, ts))
    }

    #[test]
    fn delete_records_carry_no_data() {
        let record: ChangeRecord<serde_json::Value> =
            ChangeRecord::delete("d1", Version::new("d1", 10), 99);
        assert_eq!(record.op, ChangeOp::Delete);
        assert!(!record.has_data());
        assert_eq!(record.local_ts, 99);
    }

    #[test]
    fn create_and_update_snapshot_the_document() {
        let d = doc("d1", 10);
        let create = ChangeRecord::create(&d, 11);
        let update = ChangeRecord::update(&d, 12);

        assert_eq!(create.op, ChangeOp::Create);
        assert_eq!(update.op, ChangeOp::Update);
        assert_eq!(create.data, Some(d.data.clone()));
        assert_eq!(create.version, d.version);
    }

    #[test]
    fn wire_field_names_are_camel_case() {
        let record: ChangeRecord<serde_json::Value> =
            ChangeRecord::create(&doc("d1", 10), 11);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["op"], "create");
        assert_eq!(json["localTs"], 11);
        assert_eq!(json["version"]["ts"], 10);

        let batch = ChangeBatch::new(vec![record], Some(7));
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["lastSyncTimestamp"], 7);
        assert_eq!(json["changes"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn delete_round_trips_through_json() {
        let record: ChangeRecord<serde_json::Value> =
            ChangeRecord::delete("d1", Version::new("d1", 10), 20);
        let json = serde_json::to_string(&record).unwrap();
        let back: ChangeRecord<serde_json::Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
