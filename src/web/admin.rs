//! User administration. Every endpoint requires an admin.

use super::response::ApiResponse;
use super::tasks::BulkResult;
use super::{AppState, JsonBody, PathParams};
use crate::auth::CurrentUser;
use crate::db::users::UserBulkAction;
use crate::db::views::{AdminUserView, UserView};
use crate::error::{ApiError, ApiResult};
use crate::permissions::can_admin;
use crate::types::{User, UserId};
use axum::extract::State;
use serde::Deserialize;

fn require_admin(user: &User) -> ApiResult<()> {
    if can_admin(user) {
        Ok(())
    } else {
        Err(ApiError::forbidden())
    }
}

pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<ApiResponse<Vec<AdminUserView>>> {
    require_admin(&user)?;
    Ok(ApiResponse::ok(state.db.admin_user_views()?))
}

#[derive(Debug, Deserialize)]
pub struct BulkUsersRequest {
    pub user_ids: Vec<UserId>,
    pub action: UserBulkAction,
}

pub async fn bulk_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(req): JsonBody<BulkUsersRequest>,
) -> ApiResult<ApiResponse<BulkResult>> {
    require_admin(&user)?;
    let updated = state.db.bulk_update_users(&req.user_ids, req.action)?;
    tracing::info!(admin_id = user.id, action = ?req.action, updated, "Bulk user update");
    Ok(ApiResponse::ok(BulkResult { updated }).with_message(format!("{} users updated.", updated)))
}

#[derive(Debug, Default, Deserialize)]
pub struct SupervisorInput {
    pub supervisor_id: Option<UserId>,
}

pub async fn set_supervisor(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(user_id): PathParams<UserId>,
    JsonBody(input): JsonBody<SupervisorInput>,
) -> ApiResult<ApiResponse<UserView>> {
    require_admin(&user)?;
    let updated = state.db.set_supervisor(user_id, input.supervisor_id)?;
    Ok(ApiResponse::ok(UserView::from(&updated)))
}
