//! Error types for the sync engine.

use docsync_protocol::DocumentId;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server processed the request but rejected it (`success: false`).
    #[error("server error: {0}")]
    Server(String),

    /// The store capability failed.
    #[error("store error: {0}")]
    Store(String),

    /// Wire payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A conflict could not be resolved for a document.
    #[error("failed to resolve conflict for {document_id}: {message}")]
    Resolve {
        /// The conflicted document.
        document_id: DocumentId,
        /// Resolver or write-back failure message.
        message: String,
    },

    /// A remote change could not be applied to the local store.
    #[error("failed to apply remote change for {document_id}: {message}")]
    Apply {
        /// The document the change targets.
        document_id: DocumentId,
        /// Underlying failure message.
        message: String,
    },

    /// The transport is not connected.
    #[error("not connected to server")]
    NotConnected,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a store error from any message.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Server(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("bad certificate").is_retryable());
        assert!(SyncError::Server("internal error".into()).is_retryable());
        assert!(!SyncError::store("disk full").is_retryable());
        assert!(!SyncError::NotConnected.is_retryable());
    }

    #[test]
    fn annotated_messages() {
        let err = SyncError::Apply {
            document_id: "d1".into(),
            message: "store error: closed".into(),
        };
        assert!(err.to_string().contains("d1"));
        assert!(err.to_string().starts_with("failed to apply remote change"));

        let err = SyncError::Resolve {
            document_id: "d2".into(),
            message: "merge declined".into(),
        };
        assert!(err.to_string().contains("d2"));
        assert!(err.to_string().starts_with("failed to resolve conflict"));
    }
}
