//! Work intake and job queries.
//!
//! - POST /commands   - Classify free text into a job
//! - POST /jobs       - Create a job of an explicit, registered type
//! - GET  /jobs       - List jobs
//! - GET  /jobs/{id}  - Get job

use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use socialhands_workqueue::{Job, JobFilter, JobStatus};

use crate::auth::{User, permissions};
use crate::command::classify;
use crate::error::ApiError;
use crate::state::AppState;

const MAX_LIST_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub text: String,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub count: usize,
    pub jobs: Vec<Job>,
}

/// POST /commands
///
/// Types without a registered handler are still queued; the worker fails
/// them with a terminal error when claimed.
pub async fn submit_command(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    payload: Result<Json<CommandRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    user.require(permissions::OPERATE)?;
    let Json(request) = payload?;

    let classified = classify(&request.text)
        .ok_or_else(|| ApiError::Validation("command text is empty".to_string()))?;
    let id = state
        .queue
        .enqueue(classified.job_type, classified.data.clone(), request.priority)
        .await?;

    info!("Command from {} queued as {} ({})", user.id, classified.job_type, id);
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "job_id": id,
            "type": classified.job_type,
            "payload": classified.data,
        })),
    ))
}

/// POST /jobs
pub async fn create_job(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    user.require(permissions::OPERATE)?;
    let Json(request) = payload?;

    let job_type = request.job_type.trim();
    if job_type.is_empty() {
        return Err(ApiError::Validation("'type' is required".to_string()));
    }
    if !state.registry.contains(job_type) {
        return Err(ApiError::UnknownJobType(job_type.to_string()));
    }

    let data = if request.payload.is_null() {
        json!({})
    } else {
        request.payload
    };
    let id = state.queue.enqueue(job_type, data, request.priority).await?;

    info!("Job {} ({}) created by {}", id, job_type, user.id);
    Ok((
        StatusCode::CREATED,
        Json(json!({ "job_id": id, "type": job_type })),
    ))
}

/// GET /jobs?status=&limit=
pub async fn list_jobs(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    query: Result<Query<ListJobsQuery>, QueryRejection>,
) -> Result<Json<JobListResponse>, ApiError> {
    user.require(permissions::READ)?;
    let Query(query) = query?;

    let status = query
        .status
        .as_deref()
        .map(str::parse::<JobStatus>)
        .transpose()
        .map_err(ApiError::Validation)?;
    let mut filter = JobFilter {
        status,
        ..JobFilter::default()
    };
    if let Some(limit) = query.limit {
        filter.limit = limit.clamp(1, MAX_LIST_LIMIT);
    }

    let jobs = state.queue.list(&filter).await?;
    Ok(Json(JobListResponse {
        count: jobs.len(),
        jobs,
    }))
}

/// GET /jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    user.require(permissions::READ)?;
    let id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::Validation(format!("'{}' is not a job id", id)))?;

    state
        .queue
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Job {} not found", id)))
}
