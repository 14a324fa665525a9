//! Wire result shapes for the push and pull half-syncs.

use crate::change::ChangeRecord;
use crate::conflict::ConflictInfo;
use crate::document::Timestamp;
use serde::{Deserialize, Serialize};

/// Result of a push request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct PushResponse<T> {
    /// Whether the server accepted the batch.
    pub success: bool,
    /// Documents the server reports as diverged.
    #[serde(default)]
    pub conflicts: Vec<ConflictInfo<T>>,
    /// Server timestamp after processing the batch.
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    /// Server-side error message when `success` is false.
    #[serde(default)]
    pub error: Option<String>,
}

impl<T> PushResponse<T> {
    /// A successful response with no conflicts.
    pub fn success(timestamp: Timestamp) -> Self {
        Self {
            success: true,
            conflicts: Vec::new(),
            timestamp: Some(timestamp),
            error: None,
        }
    }

    /// A successful response reporting conflicts.
    pub fn with_conflicts(timestamp: Timestamp, conflicts: Vec<ConflictInfo<T>>) -> Self {
        Self {
            success: true,
            conflicts,
            timestamp: Some(timestamp),
            error: None,
        }
    }

    /// A rejected push.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            conflicts: Vec::new(),
            timestamp: None,
            error: Some(error.into()),
        }
    }
}

/// Result of a pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct PullResponse<T> {
    /// Whether the server served the request.
    pub success: bool,
    /// Remote changes since the requested timestamp, in server order.
    #[serde(default)]
    pub changes: Vec<ChangeRecord<T>>,
    /// Server timestamp to use as the next pull cursor.
    pub timestamp: Timestamp,
    /// Server-side error message when `success` is false.
    #[serde(default)]
    pub error: Option<String>,
}

impl<T> PullResponse<T> {
    /// A successful response.
    pub fn success(changes: Vec<ChangeRecord<T>>, timestamp: Timestamp) -> Self {
        Self {
            success: true,
            changes,
            timestamp,
            error: None,
        }
    }

    /// A rejected pull.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            changes: Vec::new(),
            timestamp: 0,
            error: Some(error.into()),
        }
    }
}
