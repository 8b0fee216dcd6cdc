//! Daily schedule routes.
//!
//! - GET  /schedule?date=YYYY-MM-DD  - Plan for a date, generated on first read
//! - POST /schedule/slots            - Insert an inflexible slot

use axum::{
    Extension, Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use socialhands_scheduler::{DailySchedule, ScheduleProgress, ScheduleSlot, SlotSpec};

use crate::auth::{User, permissions};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ScheduleQuery {
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct InsertSlotRequest {
    /// Defaults to today.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(flatten)]
    pub slot: SlotSpec,
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub progress: ScheduleProgress,
    pub schedule: DailySchedule,
}

/// GET /schedule
pub async fn get_schedule(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    query: Result<Query<ScheduleQuery>, QueryRejection>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    user.require(permissions::READ)?;
    let Query(query) = query?;
    let date = query
        .date
        .unwrap_or_else(|| state.schedule.local_date(Utc::now()));

    let schedule = state.schedule.schedule_for(date).await?;
    Ok(Json(ScheduleResponse {
        progress: schedule.progress(),
        schedule,
    }))
}

/// POST /schedule/slots
pub async fn insert_slot(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    payload: Result<Json<InsertSlotRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ScheduleSlot>), ApiError> {
    user.require(permissions::OPERATE)?;
    let Json(request) = payload?;
    let date = request
        .date
        .unwrap_or_else(|| state.schedule.local_date(Utc::now()));

    let slot = state.schedule.insert_slot(date, request.slot).await?;
    info!(
        "Slot {} ({:?}) inserted for {} by {}",
        slot.slot_id, slot.status, date, user.id
    );
    Ok((StatusCode::CREATED, Json(slot)))
}
