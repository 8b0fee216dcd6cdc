//! Shared application state.

use std::sync::Arc;

use socialhands_monitor::StatusCollector;
use socialhands_scheduler::ScheduleService;
use socialhands_state::ControlStore;
use socialhands_workqueue::{Dispatcher, HandlerRegistry, JobQueue};

use crate::auth::UserDirectory;

/// Everything the routes reach into.
#[derive(Clone)]
pub struct AppState {
    pub control: ControlStore,
    pub queue: Arc<JobQueue>,
    pub dispatcher: Dispatcher,
    pub schedule: Arc<ScheduleService>,
    pub status: StatusCollector,
    /// Job types `POST /jobs` accepts.
    pub registry: Arc<HandlerRegistry>,
    pub users: UserDirectory,
}
