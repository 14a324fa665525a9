//! Document identity and versioning.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

/// Stable identifier of a document. Opaque, non-empty for a live document.
pub type DocumentId = String;

/// Millisecond-resolution wall-clock timestamp.
pub type Timestamp = u64;

/// Returns the current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Timestamp
}

/// A document version: a `(timestamp, id)` pair.
///
/// Versions are totally ordered by timestamp first, then lexicographically
/// by id. The id tiebreak keeps resolution deterministic when two writers
/// stamp the same millisecond.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    /// Id of the document this version belongs to.
    pub id: DocumentId,
    /// Wall-clock timestamp at which the version was produced.
    pub ts: Timestamp,
}

impl Version {
    /// Creates a new version.
    pub fn new(id: impl Into<DocumentId>, ts: Timestamp) -> Self {
        Self { id: id.into(), ts }
    }

    /// Produces the successor version for a new write to the same document.
    ///
    /// The successor timestamp is strictly greater than this version's,
    /// even when the wall clock has not advanced (or has jumped backwards).
    pub fn successor(&self, wall: Timestamp) -> Self {
        Self {
            id: self.id.clone(),
            ts: wall.max(self.ts + 1),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ts
            .cmp(&other.ts)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// A versioned document carrying an application payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document<T> {
    /// Stable document id.
    pub id: DocumentId,
    /// Application payload.
    pub data: T,
    /// Current version of the document.
    pub version: Version,
    /// Soft-deletion marker.
    #[serde(default)]
    pub deleted: bool,
}

impl<T> Document<T> {
    /// Creates a live (non-deleted) document.
    pub fn new(id: impl Into<DocumentId>, data: T, version: Version) -> Self {
        Self {
            id: id.into(),
            data,
            version,
            deleted: false,
        }
    }

    /// Returns true if the document is soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn version_orders_by_timestamp_first() {
        let a = Version::new("z", 1);
        let b = Version::new("a", 2);
        assert!(a < b);
    }

    #[test]
    fn version_ties_break_on_id() {
        let a = Version::new("a", 5);
        let b = Version::new("b", 5);
        assert!(a < b);
        assert_eq!(a.cmp(&a), Ordering::Equal);
    }

    #[test]
    fn successor_is_strictly_greater() {
        let v = Version::new("doc", 1000);

        // Wall clock ahead: use it.
        let next = v.successor(2000);
        assert_eq!(next.ts, 2000);

        // Wall clock stalled or behind: bump past the prior version.
        let next = v.successor(1000);
        assert_eq!(next.ts, 1001);
        let next = v.successor(500);
        assert_eq!(next.ts, 1001);
    }

    #[test]
    fn document_defaults_to_live() {
        let doc = Document::new("d1", 42u32, Version::new("d1", 1));
        assert!(!doc.is_deleted());
        assert_eq!(doc.version.id, doc.id);
    }

    #[test]
    fn now_millis_is_nonzero() {
        assert!(now_millis() > 0);
    }

    proptest! {
        #[test]
        fn compare_is_antisymmetric(
            ts_a in 0u64..1_000,
            ts_b in 0u64..1_000,
            id_a in "[a-c]{1,3}",
            id_b in "[a-c]{1,3}",
        ) {
            let a = Version::new(id_a, ts_a);
            let b = Version::new(id_b, ts_b);
            prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        }

        #[test]
        fn compare_is_transitive(
            ts in proptest::array::uniform3(0u64..100),
            ids in proptest::array::uniform3("[a-c]{1,2}"),
        ) {
            let mut versions: Vec<Version> = ts
                .iter()
                .zip(ids.iter())
                .map(|(t, i)| Version::new(i.clone(), *t))
                .collect();
            versions.sort();
            prop_assert!(versions[0] <= versions[1]);
            prop_assert!(versions[1] <= versions[2]);
            prop_assert!(versions[0] <= versions[2]);
        }
    }
}
