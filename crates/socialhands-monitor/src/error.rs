//! Monitor errors.

use socialhands_state::StateError;
use thiserror::Error;

/// Monitor error types.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Heartbeat could not be read or written.
    #[error("State error: {0}")]
    State(#[from] StateError),
}
