//! HTTP route definitions.

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::auth::require_user;
use crate::http::{control, jobs, monitoring, schedule};
use crate::state::AppState;

/// Build the router.
///
/// ## Route Structure
///
/// ```text
/// POST   /commands               - Classify free text into a job
/// POST   /jobs                   - Create job (registered types only)
/// GET    /jobs                   - List jobs (?status=&limit=)
/// GET    /jobs/{id}              - Get job
///
/// POST   /dispatcher/start       - Allow claims
/// POST   /dispatcher/stop        - Stop new claims
/// GET    /dispatcher             - Dispatcher flag
///
/// GET    /mode                   - Agent mode
/// PUT    /mode                   - Set agent mode
///
/// GET    /tasks                  - Task configuration
/// POST   /tasks/{id}/toggle      - Flip a task
///
/// GET    /schedule               - Plan for a date (?date=)
/// POST   /schedule/slots         - Insert an inflexible slot
///
/// GET    /status                 - Control-plane status
/// POST   /admin/reset            - System reset
///
/// GET    /livez                  - Liveness probe (no auth)
/// ```
pub fn create_router(state: AppState) -> Router {
    let job_routes = Router::new()
        .route("/", post(jobs::create_job).get(jobs::list_jobs))
        .route("/{id}", get(jobs::get_job));

    let dispatcher_routes = Router::new()
        .route("/", get(control::dispatcher_status))
        .route("/start", post(control::start_dispatcher))
        .route("/stop", post(control::stop_dispatcher));

    let task_routes = Router::new()
        .route("/", get(control::list_tasks))
        .route("/{id}/toggle", post(control::toggle_task));

    let schedule_routes = Router::new()
        .route("/", get(schedule::get_schedule))
        .route("/slots", post(schedule::insert_slot));

    // Everything except the liveness probe requires a known bearer token
    let authenticated = Router::new()
        .route("/commands", post(jobs::submit_command))
        .nest("/jobs", job_routes)
        .nest("/dispatcher", dispatcher_routes)
        .route("/mode", get(control::get_mode).put(control::set_mode))
        .nest("/tasks", task_routes)
        .nest("/schedule", schedule_routes)
        .route("/status", get(monitoring::status))
        .route("/admin/reset", post(control::reset))
        .route_layer(middleware::from_fn_with_state(
            state.users.clone(),
            require_user,
        ))
        .with_state(state);

    let liveness_route = Router::new().route("/livez", get(monitoring::liveness_probe));

    Router::new()
        .merge(authenticated)
        .merge(liveness_route)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
