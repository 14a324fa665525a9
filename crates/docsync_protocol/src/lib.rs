//! # Docsync Protocol
//!
//! Data model and protocol types for the docsync synchronization engine.
//!
//! This crate provides:
//! - `Document` / `Version` model with a deterministic total order
//! - `ChangeRecord` / `ChangeBatch` for the pending change log
//! - `ChangeTracker` for accumulating local changes between syncs
//! - `ConflictInfo` / `ConflictResolver` for pointwise conflict resolution
//! - Wire result shapes (`PushResponse`, `PullResponse`)
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod change;
pub mod conflict;
pub mod document;
pub mod messages;
pub mod tracker;

pub use change::{ChangeBatch, ChangeOp, ChangeRecord};
pub use conflict::{
    ConflictInfo, ConflictResolution, ConflictResolver, LwwResolver, MergeResolver, ResolveError,
    ResolveResult,
};
pub use document::{now_millis, Document, DocumentId, Timestamp, Version};
pub use messages::{PullResponse, PushResponse};
pub use tracker::{ChangeTracker, TrackerState};
