//! Checklist items.

use super::response::ApiResponse;
use super::{AppState, JsonBody, PathParams};
use crate::auth::CurrentUser;
use crate::db::views::ChecklistView;
use crate::error::{ApiError, ApiResult};
use crate::permissions::{can_edit, can_toggle_checklist};
use crate::types::{ChecklistItem, TaskId};
use crate::validation::validate_checklist_text;
use axum::extract::State;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct ChecklistInput {
    pub item_text: Option<String>,
    pub order: Option<i32>,
}

fn load_item(state: &AppState, item_id: i64) -> ApiResult<ChecklistItem> {
    state
        .db
        .get_checklist_item(item_id)?
        .ok_or_else(|| ApiError::not_found("Checklist item"))
}

pub async fn add_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(task_id): PathParams<TaskId>,
    JsonBody(input): JsonBody<ChecklistInput>,
) -> ApiResult<ApiResponse<ChecklistView>> {
    let ctx = state.task_context(task_id)?;
    if !can_edit(&user, &ctx) {
        return Err(ApiError::forbidden());
    }
    let text = validate_checklist_text(input.item_text.as_deref())?;
    let item = state.db.add_checklist_item(task_id, &text, input.order)?;
    Ok(ApiResponse::created(state.db.checklist_view(&item)?))
}

pub async fn toggle_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(item_id): PathParams<i64>,
) -> ApiResult<ApiResponse<ChecklistView>> {
    let item = load_item(&state, item_id)?;
    let ctx = state.task_context(item.task_id)?;
    if !can_toggle_checklist(&user, &ctx) {
        return Err(ApiError::forbidden());
    }
    let item = state.db.toggle_checklist_item(item_id, user.id)?;
    Ok(ApiResponse::ok(state.db.checklist_view(&item)?))
}

pub async fn delete_item(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(item_id): PathParams<i64>,
) -> ApiResult<ApiResponse<()>> {
    let item = load_item(&state, item_id)?;
    let ctx = state.task_context(item.task_id)?;
    if !can_edit(&user, &ctx) {
        return Err(ApiError::forbidden());
    }
    state.db.delete_checklist_item(item_id)?;
    Ok(ApiResponse::message("Checklist item deleted."))
}
