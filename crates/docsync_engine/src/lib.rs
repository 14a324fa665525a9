//! # Docsync Engine
//!
//! Offline-first document synchronization orchestrator.
//!
//! The engine keeps a local collection of versioned documents, records every
//! local mutation in a pending change log, and reconciles local state with a
//! remote authority through batched push/pull cycles. Storage and transport
//! are injected capabilities; conflict resolution is pluggable.
//!
//! This crate provides:
//! - [`SyncEngine`] — lifecycle, CRUD, and the pull/push/resolve state machine
//! - [`DocumentStore`] / [`SyncTransport`] — the consumed capability traits
//! - [`EventBus`] — typed publish/subscribe with isolated listener failures
//! - [`HttpTransport`] — reference transport speaking the JSON sync protocol
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use docsync_engine::{
//!     DocumentStore, MemoryStore, MockTransport, SyncConfig, SyncEngine, SyncTransport,
//! };
//! use serde_json::{json, Value};
//!
//! let store = Arc::new(MemoryStore::<Value>::new());
//! let transport = Arc::new(MockTransport::<Value>::new());
//! let engine = SyncEngine::new(
//!     SyncConfig::default(),
//!     store as Arc<dyn DocumentStore<Value>>,
//!     transport as Arc<dyn SyncTransport<Value>>,
//! );
//!
//! engine.start();
//! let doc = engine.create(json!({"title": "hello"}), None).unwrap();
//! assert!(engine.get(&doc.id).unwrap().is_some());
//! engine.stop();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod http;
pub mod store;
pub mod transport;

mod schedule;

pub use config::SyncConfig;
pub use engine::{SyncEngine, SyncState, SyncStats};
pub use error::{SyncError, SyncResult};
pub use events::{EventBus, EventKind, Subscription, SyncDirection, SyncEvent};
pub use http::{HttpClient, HttpResponse, HttpTransport, HttpTransportConfig, LoopbackClient, LoopbackServer};
pub use store::{DocumentStore, MemoryStore};
pub use transport::{MockTransport, RemoteChangeHandler, RemoteSubscription, SyncTransport};
