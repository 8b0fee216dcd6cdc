//! Scheduler errors.

use chrono::NaiveDate;
use socialhands_state::StateError;
use socialhands_workqueue::QueueError;
use thiserror::Error;

/// Scheduler error types.
///
/// Slot conflicts are never errors; they are resolved during generation.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Schedule state could not be read or written.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Job queue error.
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Configuration cannot produce a schedule.
    #[error("Invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    /// A requested slot is malformed.
    #[error("Invalid slot: {0}")]
    InvalidSlot(String),

    /// Other writers kept changing the plan for `date` between read and write.
    #[error("Schedule for {0} kept changing under concurrent writers")]
    Contended(NaiveDate),

    /// No schedule or slot with the given identity.
    #[error("Slot {slot_id} not found in schedule for {date}")]
    SlotNotFound { date: NaiveDate, slot_id: String },
}
