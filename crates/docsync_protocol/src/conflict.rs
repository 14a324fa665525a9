//! Pointwise conflict detection and resolution.

use crate::document::{DocumentId, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A divergence between the local and remote copies of one document.
///
/// Reported whenever a side-by-side choice must be made: either the server
/// rejected a pushed change, or an incoming remote version is older than
/// the local head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInfo<T> {
    /// The document both sides modified.
    pub document_id: DocumentId,
    /// Version of the local copy.
    pub local_version: Version,
    /// Version of the remote copy.
    pub remote_version: Version,
    /// Local payload.
    pub local_data: T,
    /// Remote payload.
    pub remote_data: T,
}

/// The outcome of resolving a conflict.
///
/// `resolved_version.ts` must be at least `max(local.ts, remote.ts)` so the
/// write-back never regresses the document's version; callers clamp at
/// write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResolution<T> {
    /// Payload to write back as the document's new head.
    pub resolved_data: T,
    /// Version to write back.
    pub resolved_version: Version,
}

/// Error raised by a resolver that could not produce a resolution.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ResolveError(pub String);

impl ResolveError {
    /// Creates a resolve error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Result type for conflict resolution.
pub type ResolveResult<T> = Result<ConflictResolution<T>, ResolveError>;

/// Resolves conflicts one document at a time.
///
/// Implementations must return a resolution whose version the caller can
/// safely write back as the document's new head.
pub trait ConflictResolver<T>: Send + Sync {
    /// Resolves a single conflict.
    fn resolve(&self, conflict: &ConflictInfo<T>) -> ResolveResult<T>;
}

/// Last-write-wins resolver.
///
/// The remote side wins when its version timestamp is greater, or on a
/// timestamp tie when its version id is lexicographically greater; the
/// local side wins otherwise. The winning side's version is returned
/// verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct LwwResolver;

impl LwwResolver {
    /// Creates the resolver.
    pub fn new() -> Self {
        Self
    }
}

impl<T: Clone> ConflictResolver<T> for LwwResolver {
    fn resolve(&self, conflict: &ConflictInfo<T>) -> ResolveResult<T> {
        let remote_wins = conflict.remote_version.ts > conflict.local_version.ts
            || (conflict.remote_version.ts == conflict.local_version.ts
                && conflict.remote_version.id > conflict.local_version.id);

        if remote_wins {
            Ok(ConflictResolution {
                resolved_data: conflict.remote_data.clone(),
                resolved_version: conflict.remote_version.clone(),
            })
        } else {
            Ok(ConflictResolution {
                resolved_data: conflict.local_data.clone(),
                resolved_version: conflict.local_version.clone(),
            })
        }
    }
}

/// Merge function used by [`MergeResolver`]. Returns `None` to decline.
pub type MergeFn<T> = dyn Fn(&ConflictInfo<T>) -> Option<T> + Send + Sync;

/// Resolver that attempts a user-supplied merge and falls back otherwise.
///
/// On a successful merge the resolution carries a synthesized version at
/// `max(local.ts, remote.ts)`. When the merge declines (returns `None`)
/// the conflict is delegated to the fallback resolver.
pub struct MergeResolver<T> {
    merge: Box<MergeFn<T>>,
    fallback: Box<dyn ConflictResolver<T>>,
}

impl<T> MergeResolver<T> {
    /// Creates a merge resolver with an explicit fallback.
    pub fn new(
        merge: impl Fn(&ConflictInfo<T>) -> Option<T> + Send + Sync + 'static,
        fallback: Box<dyn ConflictResolver<T>>,
    ) -> Self {
        Self {
            merge: Box::new(merge),
            fallback,
        }
    }
}

impl<T: Clone> MergeResolver<T> {
    /// Creates a merge resolver that falls back to last-write-wins.
    pub fn with_lww_fallback(
        merge: impl Fn(&ConflictInfo<T>) -> Option<T> + Send + Sync + 'static,
    ) -> Self
    where
        T: 'static,
    {
        Self::new(merge, Box::new(LwwResolver::new()))
    }
}

impl<T: Clone> ConflictResolver<T> for MergeResolver<T> {
    fn resolve(&self, conflict: &ConflictInfo<T>) -> ResolveResult<T> {
        match (self.merge)(conflict) {
            Some(merged) => Ok(ConflictResolution {
                resolved_data: merged,
                resolved_version: Version::new(
                    conflict.document_id.clone(),
                    conflict.local_version.ts.max(conflict.remote_version.ts),
                ),
            }),
            None => self.fallback.resolve(conflict),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn conflict(local_ts: u64, remote_ts: u64) -> ConflictInfo<Value> {
        ConflictInfo {
            document_id: "x".into(),
            local_version: Version::new("x", local_ts),
            remote_version: Version::new("x", remote_ts),
            local_data: json!({"side": "local"}),
            remote_data: json!({"side": "remote"}),
        }
    }

    #[test]
    fn lww_newer_remote_wins() {
        let resolution = LwwResolver::new().resolve(&conflict(100, 200)).unwrap();
        assert_eq!(resolution.resolved_data["side"], "remote");
        assert_eq!(resolution.resolved_version.ts, 200);
    }

    #[test]
    fn lww_newer_local_wins() {
        let resolution = LwwResolver::new().resolve(&conflict(200, 100)).unwrap();
        assert_eq!(resolution.resolved_data["side"], "local");
        assert_eq!(resolution.resolved_version.ts, 200);
    }

    #[test]
    fn lww_tie_breaks_on_greater_version_id() {
        let mut c = conflict(100, 100);
        c.remote_version.id = "y".into();
        let resolution = LwwResolver::new().resolve(&c).unwrap();
        assert_eq!(resolution.resolved_data["side"], "remote");

        let mut c = conflict(100, 100);
        c.local_version.id = "z".into();
        let resolution = LwwResolver::new().resolve(&c).unwrap();
        assert_eq!(resolution.resolved_data["side"], "local");
    }

    #[test]
    fn lww_equal_versions_keep_local() {
        let resolution = LwwResolver::new().resolve(&conflict(100, 100)).unwrap();
        assert_eq!(resolution.resolved_data["side"], "local");
    }

    #[test]
    fn merge_synthesizes_version_at_max_timestamp() {
        let resolver =
            MergeResolver::with_lww_fallback(|c: &ConflictInfo<Value>| {
                Some(json!({
                    "local": c.local_data["side"],
                    "remote": c.remote_data["side"],
                }))
            });

        let resolution = resolver.resolve(&conflict(100, 250)).unwrap();
        assert_eq!(resolution.resolved_version.ts, 250);
        assert_eq!(resolution.resolved_version.id, "x");
        assert_eq!(resolution.resolved_data["local"], "local");
        assert_eq!(resolution.resolved_data["remote"], "remote");
    }

    #[test]
    fn merge_declining_falls_back_to_lww() {
        let resolver = MergeResolver::with_lww_fallback(|_: &ConflictInfo<Value>| None);
        let resolution = resolver.resolve(&conflict(100, 200)).unwrap();
        assert_eq!(resolution.resolved_data["side"], "remote");
    }
}
