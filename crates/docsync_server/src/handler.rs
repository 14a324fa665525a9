//! JSON endpoint dispatch for the reference server.

use crate::error::{ServerError, ServerResult};
use crate::server::SyncServer;
use docsync_protocol::{ChangeBatch, Timestamp};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Routes the sync endpoints to a [`SyncServer`].
///
/// - `GET /health` — liveness, empty JSON body
/// - `GET /sync/pull?since={ts}` — JSON [`docsync_protocol::PullResponse`]
/// - `POST /sync/push` — body is a JSON [`ChangeBatch`], response a JSON
///   [`docsync_protocol::PushResponse`]
///
/// Responses are `(status, body)` pairs; failures carry a
/// `{"success": false, "error": …}` body.
pub struct HttpHandler<T> {
    server: Arc<SyncServer<T>>,
}

impl<T> HttpHandler<T>
where
    T: Clone + Send + Sync + Serialize + DeserializeOwned,
{
    /// Creates a handler over a shared server.
    pub fn new(server: Arc<SyncServer<T>>) -> Self {
        Self { server }
    }

    /// Handles a GET request.
    pub fn handle_get(&self, path_and_query: &str) -> (u16, Vec<u8>) {
        self.try_get(path_and_query)
            .unwrap_or_else(Self::error_response)
    }

    /// Handles a POST request.
    pub fn handle_post(&self, path: &str, body: &[u8]) -> (u16, Vec<u8>) {
        self.try_post(path, body)
            .unwrap_or_else(Self::error_response)
    }

    fn try_get(&self, path_and_query: &str) -> ServerResult<(u16, Vec<u8>)> {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path_and_query, None),
        };

        match path {
            "/health" => Ok((200, b"{}".to_vec())),
            "/sync/pull" => {
                let since = Self::parse_since(query)?;
                let response = self.server.handle_pull(since);
                Ok((200, serde_json::to_vec(&response)?))
            }
            other => Err(ServerError::UnknownPath(other.to_string())),
        }
    }

    fn try_post(&self, path: &str, body: &[u8]) -> ServerResult<(u16, Vec<u8>)> {
        match path {
            "/sync/push" => {
                let batch: ChangeBatch<T> = serde_json::from_slice(body)
                    .map_err(|err| ServerError::BadRequest(err.to_string()))?;
                let response = self.server.handle_push(batch);
                Ok((200, serde_json::to_vec(&response)?))
            }
            other => Err(ServerError::UnknownPath(other.to_string())),
        }
    }

    fn parse_since(query: Option<&str>) -> ServerResult<Timestamp> {
        let raw = query
            .into_iter()
            .flat_map(|q| q.split('&'))
            .find_map(|pair| pair.strip_prefix("since="));

        match raw {
            None => Ok(0),
            Some(value) => value
                .parse()
                .map_err(|_| ServerError::BadRequest(format!("invalid since value: {value}"))),
        }
    }

    fn error_response(err: ServerError) -> (u16, Vec<u8>) {
        let body = json!({ "success": false, "error": err.to_string() });
        (err.status(), body.to_string().into_bytes())
    }
}
