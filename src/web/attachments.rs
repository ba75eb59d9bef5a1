//! Attachment upload, download and removal.
//!
//! Uploads arrive as JSON with base64 content and are written to
//! `<media_dir>/task_attachments/<uuid>_<sanitized name>`. The database keeps
//! the path relative to the media directory.

use super::response::ApiResponse;
use super::{AppState, JsonBody, PathParams};
use crate::auth::CurrentUser;
use crate::db::views::AttachmentView;
use crate::error::{ApiError, ApiResult};
use crate::permissions::{can_delete_attachment, can_view};
use crate::types::{Attachment, TaskId};
use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use std::path::{Component, Path as FsPath, PathBuf};

const ATTACHMENT_SUBDIR: &str = "task_attachments";
const FILE_NAME_MAX: usize = 255;

#[derive(Debug, Default, Deserialize)]
pub struct UploadInput {
    pub file_name: Option<String>,
    /// File content, base64 encoded.
    pub content: Option<String>,
}

/// Replace anything outside `[A-Za-z0-9._-]` so the name is safe on disk.
fn sanitize_file_name(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let safe = safe.trim_start_matches('.');
    if safe.is_empty() {
        "file".to_string()
    } else {
        safe.chars().take(100).collect()
    }
}

/// Resolve a stored relative path, refusing anything that escapes the media directory.
fn resolve_stored_path(media_dir: &FsPath, relative: &str) -> Option<PathBuf> {
    let rel = FsPath::new(relative);
    rel.components()
        .all(|c| matches!(c, Component::Normal(_)))
        .then(|| media_dir.join(rel))
}

/// Remove a stored file, logging failures.
pub(super) fn remove_stored_file(media_dir: &FsPath, relative: &str) {
    let Some(path) = resolve_stored_path(media_dir, relative) else {
        tracing::warn!(path = relative, "Refusing to remove file outside media directory");
        return;
    };
    if let Err(e) = std::fs::remove_file(&path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), "Failed to remove attachment file: {}", e);
    }
}

fn load_attachment(state: &AppState, attachment_id: i64) -> ApiResult<Attachment> {
    state
        .db
        .get_attachment(attachment_id)?
        .ok_or_else(|| ApiError::not_found("Attachment"))
}

pub async fn upload(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(task_id): PathParams<TaskId>,
    JsonBody(input): JsonBody<UploadInput>,
) -> ApiResult<ApiResponse<AttachmentView>> {
    let ctx = state.task_context(task_id)?;
    if !can_view(&user, &ctx) {
        return Err(ApiError::forbidden());
    }

    let mut errors = crate::error::FieldErrors::new();
    let file_name = input
        .file_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    match file_name {
        None => {
            errors.insert("file_name".into(), "This field is required.".into());
        }
        Some(n) if n.chars().any(char::is_control) => {
            errors.insert(
                "file_name".into(),
                "File name must not contain control characters.".into(),
            );
        }
        Some(n) if n.chars().count() > FILE_NAME_MAX => {
            errors.insert(
                "file_name".into(),
                format!("Ensure this value has at most {} characters.", FILE_NAME_MAX),
            );
        }
        Some(_) => {}
    }
    let bytes = match input.content.as_deref() {
        None => {
            errors.insert("content".into(), "No file was submitted.".into());
            None
        }
        Some(content) => match STANDARD.decode(content.trim()) {
            Ok(bytes) if bytes.is_empty() => {
                errors.insert("content".into(), "The submitted file is empty.".into());
                None
            }
            Ok(bytes) if bytes.len() > state.config.tasks.max_attachment_bytes => {
                errors.insert(
                    "content".into(),
                    format!(
                        "File too large. Maximum size is {} bytes.",
                        state.config.tasks.max_attachment_bytes
                    ),
                );
                None
            }
            Ok(bytes) => Some(bytes),
            Err(_) => {
                errors.insert("content".into(), "Content must be valid base64.".into());
                None
            }
        },
    };
    let (Some(file_name), Some(bytes), true) = (file_name, bytes, errors.is_empty()) else {
        return Err(ApiError::validation(errors));
    };

    let relative = format!(
        "{}/{}_{}",
        ATTACHMENT_SUBDIR,
        uuid::Uuid::new_v4().simple(),
        sanitize_file_name(file_name)
    );
    let media_dir = &state.config.server.media_dir;
    std::fs::create_dir_all(media_dir.join(ATTACHMENT_SUBDIR)).map_err(ApiError::internal)?;
    std::fs::write(media_dir.join(&relative), &bytes).map_err(ApiError::internal)?;

    let attachment = match state.db.add_attachment(
        task_id,
        &relative,
        file_name,
        bytes.len() as i64,
        user.id,
    ) {
        Ok(attachment) => attachment,
        Err(e) => {
            remove_stored_file(media_dir, &relative);
            return Err(e.into());
        }
    };
    tracing::info!(task_id, attachment_id = attachment.id, size = attachment.file_size, "Stored attachment");

    Ok(ApiResponse::created(state.db.attachment_view(&attachment)?).with_message("File uploaded."))
}

pub async fn download(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(attachment_id): PathParams<i64>,
) -> ApiResult<Response> {
    let attachment = load_attachment(&state, attachment_id)?;
    let ctx = state.task_context(attachment.task_id)?;
    if !can_view(&user, &ctx) {
        return Err(ApiError::forbidden());
    }

    let path = resolve_stored_path(&state.config.server.media_dir, &attachment.file_path)
        .ok_or_else(|| ApiError::not_found("Attachment file"))?;
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found("Attachment file"));
        }
        Err(e) => return Err(ApiError::internal(e)),
    };

    let disposition = content_disposition(&attachment.file_name);
    Ok((
        [
            (CONTENT_TYPE, "application/octet-stream".to_string()),
            (CONTENT_LENGTH, bytes.len().to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// `Content-Disposition` value for a stored file name.
fn content_disposition(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| if c.is_control() || c == '"' || c == '\\' { '_' } else { c })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}

pub async fn delete_attachment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PathParams(attachment_id): PathParams<i64>,
) -> ApiResult<ApiResponse<()>> {
    let attachment = load_attachment(&state, attachment_id)?;
    let ctx = state.task_context(attachment.task_id)?;
    if !can_delete_attachment(&user, &attachment, &ctx) {
        return Err(ApiError::forbidden());
    }
    if let Some(removed) = state.db.delete_attachment(attachment_id)? {
        remove_stored_file(&state.config.server.media_dir, &removed.file_path);
    }
    Ok(ApiResponse::message("Attachment deleted."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report 2024.pdf"), "report_2024.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_file_name("..."), "file");
        assert_eq!(sanitize_file_name("отчёт.txt"), "_____.txt");
    }

    #[test]
    fn test_content_disposition_is_a_valid_header() {
        for name in ["a\u{7}b.txt", "say \"hi\".txt", "tab\there", "отчёт.txt", "del\u{7f}"] {
            let value = content_disposition(name);
            assert!(
                axum::http::HeaderValue::from_str(&value).is_ok(),
                "{:?} -> {:?}",
                name,
                value
            );
        }
        assert_eq!(content_disposition("a\u{7}b.txt"), "attachment; filename=\"a_b.txt\"");
    }

    #[test]
    fn test_resolve_stored_path() {
        let media = FsPath::new("/srv/media");
        assert_eq!(
            resolve_stored_path(media, "task_attachments/a.txt"),
            Some(PathBuf::from("/srv/media/task_attachments/a.txt"))
        );
        assert_eq!(resolve_stored_path(media, "../secret"), None);
        assert_eq!(resolve_stored_path(media, "/etc/passwd"), None);
    }

    #[test]
    fn test_remove_stored_file() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(ATTACHMENT_SUBDIR)).unwrap();
        let rel = format!("{}/x.bin", ATTACHMENT_SUBDIR);
        std::fs::write(dir.path().join(&rel), b"x").unwrap();
        remove_stored_file(dir.path(), &rel);
        assert!(!dir.path().join(&rel).exists());
        // Missing files are fine.
        remove_stored_file(dir.path(), &rel);
    }
}
