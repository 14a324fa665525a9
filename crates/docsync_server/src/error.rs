//! Error types for the reference server.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors raised while handling a request.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The request was malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The path does not map to an endpoint.
    #[error("unknown path: {0}")]
    UnknownPath(String),

    /// A response could not be encoded.
    #[error("encode failure: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ServerError {
    /// HTTP status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            ServerError::BadRequest(_) => 400,
            ServerError::UnknownPath(_) => 404,
            ServerError::Encode(_) => 500,
        }
    }
}
