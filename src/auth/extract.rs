//! Bearer token extractor.

use super::tokens::TokenSigner;
use crate::error::ApiError;
use crate::types::User;
use crate::web::AppState;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::Utc;

/// The authenticated, active user making the request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(ApiError::unauthenticated)?;
        let user_id = TokenSigner::session_user_id(token).ok_or_else(ApiError::unauthenticated)?;
        let user = state
            .db
            .get_user(user_id)?
            .ok_or_else(ApiError::unauthenticated)?;

        if let Err(e) = state.signer.check_session(&user, token, Utc::now()) {
            tracing::debug!(user_id, error = %e, "Rejected session token");
            return Err(ApiError::unauthenticated());
        }
        if !user.is_active {
            return Err(ApiError::unauthenticated());
        }
        Ok(CurrentUser(user))
    }
}
