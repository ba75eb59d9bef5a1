//! Configuration types.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8000;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
}

impl Config {
    /// Ensure the database's parent directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    pub fn ensure_media_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.server.media_dir)?;
        Ok(())
    }
}

/// Server and storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Directory for uploaded attachments.
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,

    /// Address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL used in e-mailed links. Derived from bind and port when unset.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            media_dir: default_media_dir(),
            bind: default_bind(),
            port: default_port(),
            public_url: None,
        }
    }
}

impl ServerConfig {
    pub fn public_url(&self) -> String {
        match self.public_url {
            Some(ref url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.bind, self.port),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("task-tracker/tasks.db")
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("task-tracker/media")
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Key signing session, activation and reset tokens.
    /// When unset a random key is generated at startup.
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Lifetime of login sessions in seconds (default: 2 weeks).
    #[serde(default = "default_session_ttl")]
    pub session_ttl_seconds: i64,

    /// Lifetime of activation and reset links in seconds (default: 3 days).
    #[serde(default = "default_token_timeout")]
    pub token_timeout_seconds: i64,

    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            session_ttl_seconds: default_session_ttl(),
            token_timeout_seconds: default_token_timeout(),
            min_password_length: default_min_password_length(),
        }
    }
}

impl AuthConfig {
    /// The configured key, or a fresh random one.
    pub fn secret_or_generate(&self) -> String {
        match self.secret_key {
            Some(ref key) if !key.is_empty() => key.clone(),
            _ => {
                tracing::warn!(
                    "No auth.secret_key configured; generated a random key, tokens will not survive a restart"
                );
                format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
            }
        }
    }
}

fn default_session_ttl() -> i64 {
    14 * 24 * 60 * 60
}

fn default_token_timeout() -> i64 {
    3 * 24 * 60 * 60
}

fn default_min_password_length() -> usize {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Sender address for outgoing mail.
    #[serde(default = "default_from")]
    pub from: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: default_from(),
        }
    }
}

fn default_from() -> String {
    "noreply@task-tracker.local".to_string()
}

/// Task listing and attachment limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: i64,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: i64,

    /// Number of latest comments embedded in the task detail view.
    #[serde(default = "default_detail_comments")]
    pub detail_comments: usize,

    /// Largest accepted attachment, in bytes.
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: usize,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            detail_comments: default_detail_comments(),
            max_attachment_bytes: default_max_attachment_bytes(),
        }
    }
}

fn default_page_size() -> i64 {
    20
}

fn default_max_page_size() -> i64 {
    100
}

fn default_detail_comments() -> usize {
    10
}

fn default_max_attachment_bytes() -> usize {
    10 * 1024 * 1024
}
