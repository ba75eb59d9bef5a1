//! Task endpoints: list, CRUD, history and bulk actions.

use super::response::{ApiResponse, PageMeta};
use super::{AppState, JsonBody, PathParams};
use crate::auth::CurrentUser;
use crate::config::TasksConfig;
use crate::db::now_ms;
use crate::db::tasks::{TaskBulkAction, TaskOrdering, TaskQuery};
use crate::db::views::{HistoryView, TaskDetail, TaskListItem};
use crate::error::{ApiError, ApiResult};
use crate::permissions::{can_admin, can_delete, can_edit, can_view, sees_all_tasks};
use crate::types::{Priority, TaskId, TaskStatus, User, UserId};
use crate::validation::{TaskInput, parse_date, validate_new_task, validate_task_changes};
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

fn parse_filter<T: std::str::FromStr>(params: &HashMap<String, String>, key: &str) -> Option<T> {
    let raw = params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(filter = key, value = raw, "Ignoring invalid task filter");
            None
        }
    }
}

/// Build a task query from list parameters.
///
/// Invalid filters are logged and ignored. A non-numeric `page` falls back
/// to 1; out-of-range pages are resolved by [`Database::query_tasks`].
/// `per_page` falls back to the configured default, clamped to the
/// configured maximum.
///
/// [`Database::query_tasks`]: crate::db::Database::query_tasks
pub fn parse_task_query(
    params: &HashMap<String, String>,
    config: &TasksConfig,
    viewer: &User,
) -> TaskQuery {
    let mut query = TaskQuery {
        status: parse_filter::<TaskStatus>(params, "status"),
        priority: parse_filter::<Priority>(params, "priority"),
        assignee_id: parse_filter::<UserId>(params, "assignee"),
        creator_id: parse_filter::<UserId>(params, "creator"),
        ..Default::default()
    };

    for (key, slot) in [
        ("deadline_from", &mut query.deadline_from),
        ("deadline_to", &mut query.deadline_to),
    ] {
        if let Some(raw) = params.get(key).filter(|v| !v.trim().is_empty()) {
            *slot = parse_date(raw);
            if slot.is_none() {
                warn!(filter = key, value = %raw, "Ignoring invalid date filter");
            }
        }
    }

    query.search = params
        .get("search")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    if let Some(raw) = params.get("tags") {
        query.tag_ids = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| match s.parse() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(value = s, "Ignoring invalid tag id");
                    None
                }
            })
            .collect();
    }

    query.ordering = params
        .get("ordering")
        .and_then(|o| TaskOrdering::parse(o))
        .unwrap_or_default();

    query.page = params
        .get("page")
        .and_then(|p| p.trim().parse::<i64>().ok())
        .unwrap_or(1);

    let max = config.max_page_size.max(1);
    query.per_page = params
        .get("per_page")
        .and_then(|p| p.trim().parse::<i64>().ok())
        .map(|n| n.clamp(1, max))
        .unwrap_or_else(|| config.default_page_size.clamp(1, max));

    if !sees_all_tasks(viewer) {
        query.visible_to = Some(viewer.id);
    }
    query
}

pub async fn list_tasks(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<ApiResponse<Vec<TaskListItem>>> {
    let query = parse_task_query(&params, &state.config.tasks, &user);
    let page = state.db.query_tasks(&query)?;
    let items = state.db.task_list_items(&page.tasks)?;
    Ok(ApiResponse::page(items, PageMeta::from(&page)))
}

pub async fn create_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(input): JsonBody<TaskInput>,
) -> ApiResult<ApiResponse<TaskDetail>> {
    let new_task = validate_new_task(input, now_ms())?;
    let task = state.db.create_task(&user, &new_task)?;
    let detail = state.db.task_detail(&task, state.config.tasks.detail_comments)?;
    Ok(ApiResponse::created(detail).with_message("Task created successfully."))
}

pub async fn get_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(task_id): PathParams<TaskId>,
) -> ApiResult<ApiResponse<TaskDetail>> {
    let ctx = state.task_context(task_id)?;
    if !can_view(&user, &ctx) {
        return Err(ApiError::forbidden());
    }
    let detail = state.db.task_detail(&ctx.task, state.config.tasks.detail_comments)?;
    Ok(ApiResponse::ok(detail))
}

pub async fn update_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(task_id): PathParams<TaskId>,
    JsonBody(input): JsonBody<TaskInput>,
) -> ApiResult<ApiResponse<TaskDetail>> {
    let ctx = state.task_context(task_id)?;
    if !can_edit(&user, &ctx) {
        return Err(ApiError::forbidden());
    }
    let changes = validate_task_changes(input, now_ms())?;
    let task = state.db.update_task(&user, task_id, &changes)?;
    let detail = state.db.task_detail(&task, state.config.tasks.detail_comments)?;
    Ok(ApiResponse::ok(detail).with_message("Task updated successfully."))
}

pub async fn delete_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(task_id): PathParams<TaskId>,
) -> ApiResult<ApiResponse<()>> {
    let ctx = state.task_context(task_id)?;
    if !can_delete(&user, &ctx) {
        return Err(ApiError::forbidden());
    }

    // Subtasks cascade, so collect every stored file in the tree first.
    let files = state.db.get_attachment_paths_in_tree(task_id)?;
    if !state.db.delete_task(task_id)? {
        return Err(ApiError::task_not_found());
    }
    let media_dir = &state.config.server.media_dir;
    for file in files {
        super::attachments::remove_stored_file(media_dir, &file);
    }

    tracing::info!(task_id, user_id = user.id, "Task deleted");
    Ok(ApiResponse::message("Task deleted successfully."))
}

pub async fn task_history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(task_id): PathParams<TaskId>,
) -> ApiResult<ApiResponse<Vec<HistoryView>>> {
    let ctx = state.task_context(task_id)?;
    if !can_view(&user, &ctx) {
        return Err(ApiError::forbidden());
    }
    let history = state.db.get_task_history(task_id)?;
    Ok(ApiResponse::ok(state.db.history_views(&history)?))
}

#[derive(Debug, Deserialize)]
pub struct BulkTasksRequest {
    pub task_ids: Vec<TaskId>,
    pub action: TaskBulkAction,
}

#[derive(Debug, Serialize)]
pub struct BulkResult {
    pub updated: usize,
}

pub async fn bulk_tasks(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(req): JsonBody<BulkTasksRequest>,
) -> ApiResult<ApiResponse<BulkResult>> {
    if !can_admin(&user) {
        return Err(ApiError::forbidden());
    }
    let updated = state.db.bulk_update_tasks(&user, &req.task_ids, req.action)?;
    Ok(ApiResponse::ok(BulkResult { updated }).with_message(format!("{} tasks updated.", updated)))
}
