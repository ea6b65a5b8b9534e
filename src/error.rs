use axum::http::StatusCode;
use thiserror::Error;

use crate::codec::CodecError;

/// Errors raised by endpoint handlers
///
/// Each variant maps to one HTTP status; the display text becomes the `msg`
/// field of the error envelope. Nothing here is fatal to the process.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request used a method the endpoint does not serve
    #[error("Only {0} is allowed")]
    MethodNotAllowed(&'static str),
    /// `set` body was not declared as JSON
    #[error("Content-Type should be json")]
    UnsupportedContentType,
    /// Query string could not be parsed
    #[error("invalid query string: {0}")]
    InvalidQuery(String),
    /// No `keys` parameter, or an empty key list
    #[error("no keys")]
    NoKeys,
    /// More keys than the configured per-operation limit
    #[error("key count exceed limit")]
    KeyLimitExceeded,
    /// Request body could not be read
    #[error("failed to read body: {0}")]
    UnreadableBody(String),
    /// `set` body is not a JSON array of key/value pairs
    #[error("invalid json body: {0}")]
    InvalidBody(serde_json::Error),
    /// A `set` pair had an empty key or value
    #[error("invalid key or value")]
    InvalidPair,
    /// Format could not be resolved or a value could not be decoded
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The backing store failed the batch operation
    #[error("{:#}", .0)]
    Store(anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed(_) | ApiError::UnsupportedContentType => {
                StatusCode::METHOD_NOT_ALLOWED
            }
            ApiError::InvalidQuery(_)
            | ApiError::NoKeys
            | ApiError::KeyLimitExceeded
            | ApiError::UnreadableBody(_)
            | ApiError::InvalidBody(_)
            | ApiError::InvalidPair
            | ApiError::Codec(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Store(err)
    }
}
