//! Queue errors.

use socialhands_state::StateError;
use thiserror::Error;
use uuid::Uuid;

use crate::job::JobStatus;

/// Queue error types.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Job not found.
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// The requested transition is not allowed from the job's current status.
    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    /// Job type or payload rejected at enqueue time.
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Control-plane state could not be read or written.
    #[error("Control state error: {0}")]
    State(#[from] StateError),
}

impl QueueError {
    /// The store could not be reached, as opposed to rejecting the call.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, QueueError::Database(_) | QueueError::State(_))
    }
}

impl From<tokio_rusqlite::Error> for QueueError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        QueueError::Database(e.to_string())
    }
}
