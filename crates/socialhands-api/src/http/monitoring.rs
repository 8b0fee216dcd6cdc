//! Status and liveness.

use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;
use serde_json::json;

use socialhands_monitor::StatusReport;

use crate::auth::{User, permissions};
use crate::error::ApiError;
use crate::state::AppState;

/// GET /status
///
/// Always 200 for an authorized caller; an unreachable store shows up as
/// `database_reachable: false` with null fields.
pub async fn status(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<StatusReport>, ApiError> {
    user.require(permissions::READ)?;
    Ok(Json(state.status.collect(Utc::now()).await))
}

/// GET /livez
pub async fn liveness_probe() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
