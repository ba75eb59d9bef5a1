//! Time tracking.

use super::response::ApiResponse;
use super::{AppState, JsonBody, PathParams};
use crate::auth::CurrentUser;
use crate::db::views::TimeEntryView;
use crate::error::{ApiError, ApiResult};
use crate::permissions::{can_delete_time_entry, can_log_time, can_view};
use crate::types::{Hours, TaskId};
use crate::validation::{TimeEntryInput, validate_time_entry};
use axum::extract::State;
use chrono::Utc;
use serde::Serialize;

/// A logged entry with the task's new total.
#[derive(Debug, Serialize)]
pub struct LoggedTime {
    pub entry: TimeEntryView,
    pub actual_hours: Hours,
}

fn actual_hours(state: &AppState, task_id: TaskId) -> ApiResult<Hours> {
    Ok(state
        .db
        .get_task(task_id)?
        .map(|t| t.actual_hours)
        .unwrap_or_default())
}

pub async fn list_entries(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(task_id): PathParams<TaskId>,
) -> ApiResult<ApiResponse<Vec<TimeEntryView>>> {
    let ctx = state.task_context(task_id)?;
    if !can_view(&user, &ctx) {
        return Err(ApiError::forbidden());
    }
    let entries = state.db.get_time_entries(task_id)?;
    Ok(ApiResponse::ok(state.db.time_entry_views(&entries)?))
}

pub async fn log_time(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(task_id): PathParams<TaskId>,
    JsonBody(input): JsonBody<TimeEntryInput>,
) -> ApiResult<ApiResponse<LoggedTime>> {
    let ctx = state.task_context(task_id)?;
    if !can_log_time(&user, &ctx) {
        return Err(ApiError::forbidden());
    }
    let (hours, description, date) = validate_time_entry(input, Utc::now().date_naive())?;
    let entry = state
        .db
        .add_time_entry(task_id, user.id, hours, &description, date)?;

    let entry = state
        .db
        .time_entry_views(std::slice::from_ref(&entry))?
        .pop()
        .ok_or_else(|| ApiError::internal("time entry view missing"))?;
    Ok(ApiResponse::created(LoggedTime {
        entry,
        actual_hours: actual_hours(&state, task_id)?,
    })
    .with_message("Time logged."))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(entry_id): PathParams<i64>,
) -> ApiResult<ApiResponse<Hours>> {
    let entry = state
        .db
        .get_time_entry(entry_id)?
        .ok_or_else(|| ApiError::not_found("Time entry"))?;
    if !can_delete_time_entry(&user, &entry) {
        return Err(ApiError::forbidden());
    }
    state.db.delete_time_entry(entry_id)?;
    Ok(ApiResponse::ok(actual_hours(&state, entry.task_id)?).with_message("Time entry deleted."))
}
