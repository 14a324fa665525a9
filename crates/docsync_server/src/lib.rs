//! # Docsync Server
//!
//! In-memory reference implementation of the docsync remote authority.
//!
//! The server maintains a document table and an ordered change log stamped
//! by a monotonic server clock. It detects conflicts on push (a stored
//! version newer than the incoming one is reported back to the client) and
//! serves pulls by server timestamp.
//!
//! [`HttpHandler`] exposes the JSON endpoints (`/sync/pull`, `/sync/push`,
//! `/health`); in a real deployment an HTTP framework would route requests
//! to it, and in tests it sits behind an in-process loopback client.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod handler;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::HttpHandler;
pub use server::{LoggedChange, SyncServer};
