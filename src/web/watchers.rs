//! Task watchers.

use super::response::ApiResponse;
use super::{AppState, JsonBody, PathParams};
use crate::auth::CurrentUser;
use crate::db::views::WatcherView;
use crate::error::{ApiError, ApiResult};
use crate::permissions::{can_manage_watcher, can_view};
use crate::types::{TaskId, UserId};
use axum::extract::State;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct WatcherInput {
    /// Defaults to the requesting user.
    pub user_id: Option<UserId>,
}

fn watcher_list(state: &AppState, task_id: TaskId) -> ApiResult<Vec<WatcherView>> {
    let watchers = state.db.get_watchers(task_id)?;
    Ok(state.db.watcher_views(&watchers)?)
}

pub async fn list_watchers(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(task_id): PathParams<TaskId>,
) -> ApiResult<ApiResponse<Vec<WatcherView>>> {
    let ctx = state.task_context(task_id)?;
    if !can_view(&user, &ctx) {
        return Err(ApiError::forbidden());
    }
    Ok(ApiResponse::ok(watcher_list(&state, task_id)?))
}

pub async fn add_watcher(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(task_id): PathParams<TaskId>,
    JsonBody(input): JsonBody<WatcherInput>,
) -> ApiResult<ApiResponse<Vec<WatcherView>>> {
    let ctx = state.task_context(task_id)?;
    let target = input.user_id.unwrap_or(user.id);
    if !can_manage_watcher(&user, &ctx, target) {
        return Err(ApiError::forbidden());
    }
    match state.db.get_user(target)? {
        Some(u) if u.is_active => {}
        _ => return Err(ApiError::invalid("user_id", "Select a valid user.")),
    }

    let message = if state.db.add_watcher(task_id, target)? {
        "Watcher added."
    } else {
        "User is already watching this task."
    };
    Ok(ApiResponse::ok(watcher_list(&state, task_id)?).with_message(message))
}

pub async fn remove_watcher(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams((task_id, target)): PathParams<(TaskId, UserId)>,
) -> ApiResult<ApiResponse<Vec<WatcherView>>> {
    let ctx = state.task_context(task_id)?;
    if !can_manage_watcher(&user, &ctx, target) {
        return Err(ApiError::forbidden());
    }
    if !state.db.remove_watcher(task_id, target)? {
        return Err(ApiError::not_found("Watcher"));
    }
    Ok(ApiResponse::ok(watcher_list(&state, task_id)?).with_message("Watcher removed."))
}
