//! Tags.

use super::response::ApiResponse;
use super::{AppState, JsonBody};
use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::types::Tag;
use crate::validation::validate_tag;
use axum::extract::State;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct TagInput {
    pub name: Option<String>,
    pub color: Option<String>,
}

pub async fn list_tags(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
) -> ApiResult<ApiResponse<Vec<Tag>>> {
    Ok(ApiResponse::ok(state.db.list_tags()?))
}

pub async fn create_tag(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(input): JsonBody<TagInput>,
) -> ApiResult<ApiResponse<Tag>> {
    let (name, color) = validate_tag(input.name.as_deref(), input.color.as_deref())?;
    let tag = state.db.create_tag(&name, color.as_deref(), user.id)?;
    Ok(ApiResponse::created(tag))
}
