//! Accounts: registration, activation, login, password reset and profiles.

use super::response::ApiResponse;
use super::{AppState, JsonBody, PathParams};
use crate::auth::{CurrentUser, TokenPurpose, decode_uid, hash_password, verify_password};
use crate::db::users::ProfileChanges;
use crate::db::views::UserView;
use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::mail::{activation_email, password_reset_email};
use crate::types::{User, UserId};
use crate::validation::{RegisterInput, SetPasswordInput, validate_registration, validate_set_password};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const NAME_MAX: usize = 150;
const TIMEZONE_MAX: usize = 50;

/// A session token and the user it belongs to.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: UserView,
}

fn session_for(state: &AppState, user: &User) -> SessionResponse {
    SessionResponse {
        token: state.signer.make_session(user, Utc::now()),
        token_type: "Bearer",
        expires_in: state.signer.session_ttl(),
        user: UserView::from(user),
    }
}

/// Send the activation mail. Delivery failures are logged, not returned.
async fn send_activation(state: &AppState, user: &User) {
    let token = state
        .signer
        .make_token(TokenPurpose::Activation, user, Utc::now());
    let email = activation_email(
        &state.config.mail.from,
        &state.config.server.public_url(),
        user,
        &token,
    );
    if let Err(e) = state.mailer.send(email).await {
        tracing::error!(user_id = user.id, "Failed to send activation e-mail: {}", e);
    }
}

/// Resolve the user named by a `{uidb64}/{token}` link and check the token.
fn user_from_link(state: &AppState, purpose: TokenPurpose, uidb64: &str, token: &str) -> ApiResult<User> {
    let invalid = || match purpose {
        TokenPurpose::Activation => ApiError::bad_request("Activation link is invalid or has expired."),
        TokenPurpose::PasswordReset => ApiError::bad_request("Password reset link is invalid or has expired."),
    };

    let user_id = decode_uid(uidb64).ok_or_else(invalid)?;
    let user = state.db.get_user(user_id)?.ok_or_else(invalid)?;
    if let Err(e) = state.signer.check_token(purpose, &user, token, Utc::now()) {
        info!(user_id, ?purpose, error = %e, "Rejected one-time token");
        return Err(invalid());
    }
    Ok(user)
}

pub async fn register(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<RegisterInput>,
) -> ApiResult<ApiResponse<UserView>> {
    let new_user = validate_registration(input, state.config.auth.min_password_length)?;
    if state.db.get_user_by_email(&new_user.email)?.is_some() {
        return Err(ApiError::invalid("email", "A user with that e-mail already exists."));
    }

    let hash = hash_password(&new_user.password)?;
    let user = match state.db.create_user(&new_user, &hash) {
        Ok(user) => user,
        // Lost a race with a concurrent registration.
        Err(e) => match ApiError::from(e) {
            err if err.code == ErrorCode::AlreadyExists => {
                return Err(ApiError::invalid("email", "A user with that e-mail already exists."));
            }
            err => return Err(err),
        },
    };
    info!(user_id = user.id, email = %user.email, "Registered user");

    send_activation(&state, &user).await;
    Ok(ApiResponse::created(UserView::from(&user))
        .with_message("Registration successful. Check your e-mail to activate your account."))
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginInput {
    pub email: Option<String>,
    pub password: Option<String>,
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<LoginInput>,
) -> ApiResult<ApiResponse<SessionResponse>> {
    let (Some(email), Some(password)) = (input.email.as_deref(), input.password.as_deref()) else {
        let mut err = ApiError::validation(Default::default());
        if input.email.is_none() {
            err = err.with_field("email", "This field is required.");
        }
        if input.password.is_none() {
            err = err.with_field("password", "This field is required.");
        }
        return Err(err);
    };

    let user = state.db.get_user_by_email(email)?;
    let user = match user {
        Some(user) if verify_password(password, &user.password_hash) => user,
        _ => {
            info!(email, "Failed login");
            return Err(ApiError::invalid(
                "credentials",
                "Please enter a correct e-mail and password.",
            ));
        }
    };
    if !user.is_active {
        return Err(ApiError::invalid("credentials", "This account is inactive."));
    }

    info!(user_id = user.id, "User logged in");
    Ok(ApiResponse::ok(session_for(&state, &user)))
}

pub async fn activate(
    State(state): State<AppState>,
    PathParams((uidb64, token)): PathParams<(String, String)>,
) -> ApiResult<Response> {
    let user = user_from_link(&state, TokenPurpose::Activation, &uidb64, &token)?;
    state.db.mark_verified(user.id)?;
    let user = state
        .db
        .get_user(user.id)?
        .ok_or_else(|| ApiError::not_found("User"))?;
    info!(user_id = user.id, "E-mail verified");

    // Inactive accounts cannot hold a session.
    if !user.is_active {
        return Ok(ApiResponse::ok(UserView::from(&user))
            .with_message("E-mail verified, but the account is inactive.")
            .into_response());
    }
    Ok(ApiResponse::ok(session_for(&state, &user))
        .with_message("Your account has been activated.")
        .into_response())
}

pub async fn resend_activation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<ApiResponse<()>> {
    if user.is_verified {
        return Err(ApiError::bad_request("Your e-mail is already verified."));
    }
    send_activation(&state, &user).await;
    Ok(ApiResponse::message("Activation e-mail sent."))
}

#[derive(Debug, Default, Deserialize)]
pub struct PasswordResetInput {
    pub email: Option<String>,
}

pub async fn password_reset(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<PasswordResetInput>,
) -> ApiResult<ApiResponse<()>> {
    let email = input.email.unwrap_or_default();
    if email.trim().is_empty() {
        return Err(ApiError::invalid("email", "This field is required."));
    }

    // Same answer whether or not the address is registered.
    match state.db.get_user_by_email(&email)? {
        Some(user) if user.is_active => {
            let token = state
                .signer
                .make_token(TokenPurpose::PasswordReset, &user, Utc::now());
            let message = password_reset_email(
                &state.config.mail.from,
                &state.config.server.public_url(),
                &user,
                &token,
            );
            if let Err(e) = state.mailer.send(message).await {
                tracing::error!(user_id = user.id, "Failed to send password reset e-mail: {}", e);
            }
        }
        _ => warn!("Password reset requested for unknown or inactive account"),
    }
    Ok(ApiResponse::message(
        "If an account exists for that e-mail, a reset link has been sent.",
    ))
}

pub async fn reset_password(
    State(state): State<AppState>,
    PathParams((uidb64, token)): PathParams<(String, String)>,
    JsonBody(input): JsonBody<SetPasswordInput>,
) -> ApiResult<ApiResponse<()>> {
    let user = user_from_link(&state, TokenPurpose::PasswordReset, &uidb64, &token)?;
    let password = validate_set_password(input, state.config.auth.min_password_length)?;
    let hash = hash_password(&password)?;
    state.db.set_password_hash(user.id, &hash)?;
    info!(user_id = user.id, "Password reset");
    Ok(ApiResponse::message("Your password has been set. You may log in now."))
}

pub async fn me(CurrentUser(user): CurrentUser) -> ApiResponse<UserView> {
    ApiResponse::ok(UserView::from(&user))
}

fn check_profile(changes: &ProfileChanges) -> ApiResult<()> {
    let mut err = ApiError::validation(Default::default());
    for (field, value) in [
        ("first_name", changes.first_name.as_deref()),
        ("last_name", changes.last_name.as_deref()),
    ] {
        if value.is_some_and(|v| v.trim().chars().count() > NAME_MAX) {
            err = err.with_field(field, format!("Ensure this value has at most {} characters.", NAME_MAX));
        }
    }
    if let Some(Some(tz)) = &changes.timezone
        && tz.chars().count() > TIMEZONE_MAX
    {
        err = err.with_field(
            "timezone",
            format!("Ensure this value has at most {} characters.", TIMEZONE_MAX),
        );
    }
    if err.errors.is_empty() { Ok(()) } else { Err(err) }
}

pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    JsonBody(changes): JsonBody<ProfileChanges>,
) -> ApiResult<ApiResponse<UserView>> {
    check_profile(&changes)?;
    let user = state.db.update_profile(user.id, changes)?;
    Ok(ApiResponse::ok(UserView::from(&user)).with_message("Profile updated."))
}

pub async fn subordinates(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<ApiResponse<Vec<UserView>>> {
    let users = state.db.get_subordinates(user.id)?;
    Ok(ApiResponse::ok(users.iter().map(UserView::from).collect()))
}

pub async fn profile(
    State(state): State<AppState>,
    CurrentUser(_viewer): CurrentUser,
    PathParams(user_id): PathParams<UserId>,
) -> ApiResult<ApiResponse<UserView>> {
    let user = state
        .db
        .get_user(user_id)?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(ApiResponse::ok(UserView::from(&user)))
}
