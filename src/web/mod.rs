//! HTTP API.
//!
//! An axum router serving JSON under `/api`. Every response, including
//! errors, unknown routes and malformed bodies, uses the envelope built in
//! [`response`].

mod admin;
mod attachments;
mod checklist;
mod comments;
mod response;
mod tags;
mod tasks;
mod time_entries;
mod users;
mod watchers;

pub use response::{ApiResponse, PageMeta};
pub use tasks::parse_task_query;

use crate::auth::TokenSigner;
use crate::config::Config;
use crate::db::Database;
use crate::error::{ApiError, ApiResult};
use crate::mail::Mailer;
use crate::permissions::TaskContext;
use crate::types::TaskId;
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::request::Parts;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<Config>,
    pub signer: TokenSigner,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(db: Database, config: Config, mailer: Arc<dyn Mailer>) -> Self {
        let signer = TokenSigner::new(
            config.auth.secret_or_generate(),
            config.auth.token_timeout_seconds,
            config.auth.session_ttl_seconds,
        );
        Self {
            db,
            config: Arc::new(config),
            signer,
            mailer,
        }
    }

    /// Load a task with its permission context, or 404.
    pub(crate) fn task_context(&self, task_id: TaskId) -> ApiResult<TaskContext> {
        self.db
            .get_task_context(task_id)?
            .ok_or_else(ApiError::task_not_found)
    }
}

/// JSON body whose rejections use the API error envelope.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        }
    }
}

/// Path parameters whose rejections use the API error envelope.
pub struct PathParams<T>(pub T);

impl<S, T> FromRequestParts<S> for PathParams<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(PathParams(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        }
    }
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> ApiResponse<HealthResponse> {
    ApiResponse::ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn not_found() -> ApiError {
    ApiError::not_found("Resource")
}

async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        // Users
        .route("/api/users/register", post(users::register))
        .route("/api/users/login", post(users::login))
        .route("/api/users/activate/{uidb64}/{token}", get(users::activate))
        .route("/api/users/resend-activation", post(users::resend_activation))
        .route("/api/users/password-reset", post(users::password_reset))
        .route("/api/users/reset/{uidb64}/{token}", post(users::reset_password))
        .route("/api/users/me", get(users::me).patch(users::update_me))
        .route("/api/users/me/subordinates", get(users::subordinates))
        .route("/api/users/{user_id}", get(users::profile))
        // Administration
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/bulk", post(admin::bulk_users))
        .route("/api/admin/users/{user_id}/supervisor", patch(admin::set_supervisor))
        // Tasks
        .route("/api/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route("/api/tasks/bulk", post(tasks::bulk_tasks))
        .route(
            "/api/tasks/{task_id}",
            get(tasks::get_task)
                .patch(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/api/tasks/{task_id}/history", get(tasks::task_history))
        // Comments
        .route(
            "/api/tasks/{task_id}/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route(
            "/api/comments/{comment_id}",
            patch(comments::update_comment).delete(comments::delete_comment),
        )
        // Watchers
        .route(
            "/api/tasks/{task_id}/watchers",
            get(watchers::list_watchers).post(watchers::add_watcher),
        )
        .route(
            "/api/tasks/{task_id}/watchers/{user_id}",
            delete(watchers::remove_watcher),
        )
        // Checklist
        .route("/api/tasks/{task_id}/checklist", post(checklist::add_item))
        .route("/api/checklist/{item_id}/toggle", post(checklist::toggle_item))
        .route("/api/checklist/{item_id}", delete(checklist::delete_item))
        // Attachments
        .route("/api/tasks/{task_id}/attachments", post(attachments::upload))
        .route(
            "/api/attachments/{attachment_id}",
            get(attachments::download).delete(attachments::delete_attachment),
        )
        // Time tracking
        .route(
            "/api/tasks/{task_id}/time",
            get(time_entries::list_entries).post(time_entries::log_time),
        )
        .route("/api/time/{entry_id}", delete(time_entries::delete_entry))
        // Tags
        .route("/api/tags", get(tags::list_tags).post(tags::create_tag))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve in the background.
///
/// Returns a oneshot sender that triggers graceful shutdown and the bound address.
pub async fn start_server(
    state: AppState,
    addr: SocketAddr,
) -> anyhow::Result<(oneshot::Sender<()>, SocketAddr, tokio::task::JoinHandle<()>)> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    info!("Task tracker listening on http://{}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("Server shutting down");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((shutdown_tx, bound_addr, handle))
}
