//! State store errors.

use thiserror::Error;

/// State store error types.
#[derive(Debug, Error)]
pub enum StateError {
    /// The backing database could not be opened.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A query against the backing store failed.
    #[error("Query error: {0}")]
    Query(String),

    /// A stored value does not match the shape its key expects.
    #[error("Invalid value for key {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<tokio_rusqlite::Error> for StateError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        StateError::Query(e.to_string())
    }
}
