//! Control-plane switches.
//!
//! - POST /dispatcher/start, POST /dispatcher/stop, GET /dispatcher
//! - GET /mode, PUT /mode
//! - GET /tasks, POST /tasks/{id}/toggle
//! - POST /admin/reset

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use socialhands_state::AgentMode;

use crate::auth::{User, permissions};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub purge_jobs: bool,
}

/// POST /dispatcher/start
pub async fn start_dispatcher(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, ApiError> {
    user.require(permissions::OPERATE)?;
    let job_id = state.dispatcher.start().await?;
    info!("Dispatcher started by {}", user.id);
    Ok(Json(json!({ "active": true, "job_id": job_id })))
}

/// POST /dispatcher/stop
pub async fn stop_dispatcher(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, ApiError> {
    user.require(permissions::OPERATE)?;
    state.dispatcher.stop().await?;
    info!("Dispatcher stopped by {}", user.id);
    Ok(Json(json!({ "active": false })))
}

/// GET /dispatcher
pub async fn dispatcher_status(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, ApiError> {
    user.require(permissions::READ)?;
    let active = state.dispatcher.is_active().await?;
    Ok(Json(json!({ "active": active })))
}

/// GET /mode
pub async fn get_mode(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, ApiError> {
    user.require(permissions::READ)?;
    let mode = state.control.agent_mode().await?;
    Ok(Json(json!({ "mode": mode })))
}

/// PUT /mode
pub async fn set_mode(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    payload: Result<Json<ModeRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    user.require(permissions::OPERATE)?;
    let Json(request) = payload?;
    let mode: AgentMode = request.mode.parse().map_err(ApiError::Validation)?;

    state.control.set_agent_mode(mode).await?;
    info!("Agent mode set to {} by {}", mode.as_str(), user.id);
    Ok(Json(json!({ "mode": mode })))
}

/// GET /tasks
pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, ApiError> {
    user.require(permissions::READ)?;
    let tasks = state.schedule.task_configuration().await?;
    Ok(Json(json!({ "tasks": tasks })))
}

/// POST /tasks/{id}/toggle
pub async fn toggle_task(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    user.require(permissions::OPERATE)?;
    let enabled = state.schedule.toggle_task(&task_id).await?;
    info!("Task {} toggled to {} by {}", task_id, enabled, user.id);
    Ok(Json(json!({ "task_id": task_id, "enabled": enabled })))
}

/// POST /admin/reset
///
/// Clears the task configuration and today's schedule. With `purge_jobs`
/// also deletes completed and failed jobs; pending and running jobs stay.
pub async fn reset(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    payload: Result<Json<ResetRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    user.require(permissions::ADMIN)?;
    let request = match payload {
        Ok(Json(request)) => request,
        Err(JsonRejection::MissingJsonContentType(_)) => ResetRequest::default(),
        Err(e) => return Err(e.into()),
    };

    state.schedule.reset(Utc::now()).await?;
    let purged = if request.purge_jobs {
        state.queue.purge_terminal().await?
    } else {
        0
    };

    warn!("System reset by {} (purged {} jobs)", user.id, purged);
    Ok(Json(json!({ "reset": true, "purged_jobs": purged })))
}
