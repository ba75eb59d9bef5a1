//! Task comments.

use super::response::ApiResponse;
use super::{AppState, JsonBody, PathParams};
use crate::auth::CurrentUser;
use crate::db::views::CommentView;
use crate::error::{ApiError, ApiResult};
use crate::permissions::{can_delete_comment, can_edit_comment, can_view};
use crate::types::{Comment, TaskId};
use crate::validation::validate_comment_text;
use axum::extract::State;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct CommentInput {
    pub text: Option<String>,
}

fn load_comment(state: &AppState, comment_id: i64) -> ApiResult<Comment> {
    state
        .db
        .get_comment(comment_id)?
        .ok_or_else(|| ApiError::not_found("Comment"))
}

pub async fn list_comments(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(task_id): PathParams<TaskId>,
) -> ApiResult<ApiResponse<Vec<CommentView>>> {
    let ctx = state.task_context(task_id)?;
    if !can_view(&user, &ctx) {
        return Err(ApiError::forbidden());
    }
    let views = state
        .db
        .get_comments(task_id)?
        .iter()
        .map(|c| state.db.comment_view(c))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(ApiResponse::ok(views))
}

pub async fn create_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(task_id): PathParams<TaskId>,
    JsonBody(input): JsonBody<CommentInput>,
) -> ApiResult<ApiResponse<CommentView>> {
    let ctx = state.task_context(task_id)?;
    if !can_view(&user, &ctx) {
        return Err(ApiError::forbidden());
    }
    let text = validate_comment_text(input.text.as_deref())?;
    let comment = state.db.add_comment(task_id, user.id, &text)?;
    Ok(ApiResponse::created(state.db.comment_view(&comment)?).with_message("Comment added."))
}

pub async fn update_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(comment_id): PathParams<i64>,
    JsonBody(input): JsonBody<CommentInput>,
) -> ApiResult<ApiResponse<CommentView>> {
    let comment = load_comment(&state, comment_id)?;
    if !can_edit_comment(&user, &comment) {
        return Err(ApiError::forbidden());
    }
    let text = validate_comment_text(input.text.as_deref())?;
    let comment = state.db.update_comment(comment_id, &text)?;
    Ok(ApiResponse::ok(state.db.comment_view(&comment)?).with_message("Comment updated."))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(comment_id): PathParams<i64>,
) -> ApiResult<ApiResponse<()>> {
    let comment = load_comment(&state, comment_id)?;
    let ctx = state.task_context(comment.task_id)?;
    if !can_delete_comment(&user, &comment, &ctx) {
        return Err(ApiError::forbidden());
    }
    state.db.delete_comment(comment_id)?;
    Ok(ApiResponse::message("Comment deleted."))
}
