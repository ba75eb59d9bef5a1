//! Configuration loader with tier-based merging.
//!
//! Loads configuration from multiple tiers and merges them field-by-field.

use super::merge::deep_merge_all;
use super::types::Config;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Configuration tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    /// Embedded defaults (lowest priority)
    Defaults = 0,
    /// Project-level config ($CWD/task-tracker/)
    Project = 1,
    /// User-level config (~/.task-tracker/)
    User = 2,
    /// Explicit file from `--config` or `TASK_TRACKER_CONFIG_PATH`
    Explicit = 3,
    /// Environment variables (highest priority)
    Environment = 4,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Explicit => write!(f, "explicit"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Directories searched for `config.yaml`.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub project_dir: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    /// Discover configuration paths from environment and defaults.
    pub fn discover() -> Self {
        // User dir: TASK_TRACKER_USER_DIR or ~/.task-tracker
        let user_dir = std::env::var("TASK_TRACKER_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".task-tracker")));

        // Project dir: TASK_TRACKER_PROJECT_DIR or $CWD/task-tracker
        let project_dir = std::env::var("TASK_TRACKER_PROJECT_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from("task-tracker")));

        Self {
            project_dir,
            user_dir,
        }
    }

    /// Create paths with explicit directories.
    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
        }
    }
}

/// Read a YAML file as a JSON value. Missing files yield `None`; malformed ones are logged and skipped.
fn read_yaml(path: &Path, tier: ConfigTier) -> Option<Value> {
    if !path.exists() {
        return None;
    }
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), %tier, "Failed to read config file: {}", e);
            return None;
        }
    };
    match serde_yaml::from_str::<Value>(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), %tier, "Ignoring malformed config file: {}", e);
            None
        }
    }
}

/// Configuration loader that handles tier-based merging.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    config: Config,
    /// Config files that contributed, lowest tier first.
    sources: Vec<(ConfigTier, PathBuf)>,
}

impl ConfigLoader {
    /// Load configuration from all tiers, with an optional explicit file.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_with_paths(ConfigPaths::discover(), explicit)
    }

    /// Load configuration with explicit paths.
    pub fn load_with_paths(paths: ConfigPaths, explicit: Option<&Path>) -> Result<Self> {
        let mut configs: Vec<Value> = Vec::new();
        let mut sources = Vec::new();

        // Tier 1: Defaults (embedded)
        configs.push(serde_json::to_value(Config::default())?);

        // Tier 2: Project config
        if let Some(ref project_dir) = paths.project_dir {
            let file = project_dir.join("config.yaml");
            if let Some(value) = read_yaml(&file, ConfigTier::Project) {
                configs.push(value);
                sources.push((ConfigTier::Project, file));
            }
        }

        // Tier 3: User config
        if let Some(ref user_dir) = paths.user_dir {
            let file = user_dir.join("config.yaml");
            if let Some(value) = read_yaml(&file, ConfigTier::User) {
                configs.push(value);
                sources.push((ConfigTier::User, file));
            }
        }

        // Tier 4: Explicit file; unlike the search tiers it must exist and parse.
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("TASK_TRACKER_CONFIG_PATH").ok().map(PathBuf::from));
        if let Some(file) = explicit {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read config file {}", file.display()))?;
            let value: Value = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", file.display()))?;
            configs.push(value);
            sources.push((ConfigTier::Explicit, file));
        }

        let merged = deep_merge_all(configs);
        let mut config: Config = serde_json::from_value(merged)?;

        // Tier 5: Environment variable overrides
        Self::apply_env_overrides(&mut config);

        Ok(Self {
            paths,
            config,
            sources,
        })
    }

    /// Apply environment variable overrides to config.
    fn apply_env_overrides(config: &mut Config) {
        if let Ok(db_path) = std::env::var("TASK_TRACKER_DB_PATH") {
            config.server.db_path = PathBuf::from(db_path);
        }

        if let Ok(media_dir) = std::env::var("TASK_TRACKER_MEDIA_DIR") {
            config.server.media_dir = PathBuf::from(media_dir);
        }

        if let Ok(port) = std::env::var("TASK_TRACKER_PORT") {
            match port.parse() {
                Ok(port) => config.server.port = port,
                Err(_) => warn!(value = %port, "Ignoring invalid TASK_TRACKER_PORT"),
            }
        }

        if let Ok(secret) = std::env::var("TASK_TRACKER_SECRET_KEY") {
            config.auth.secret_key = Some(secret);
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Config files that contributed to the result.
    pub fn sources(&self) -> &[(ConfigTier, PathBuf)] {
        &self.sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        // Empty temp dirs so no config files are found
        let temp = TempDir::new().unwrap();
        let paths = ConfigPaths::with_dirs(
            Some(temp.path().join("project")),
            Some(temp.path().join("user")),
        );

        let loader = ConfigLoader::load_with_paths(paths, None).unwrap();
        let config = loader.config();

        assert_eq!(config.tasks.default_page_size, 20);
        assert_eq!(config.auth.min_password_length, 8);
        assert!(loader.sources().is_empty());
    }

    #[test]
    fn test_project_config_overrides_defaults() {
        let temp = TempDir::new().unwrap();
        let project_dir = temp.path().join("task-tracker");
        std::fs::create_dir_all(&project_dir).unwrap();

        let config_content = r#"
tasks:
  default_page_size: 50
"#;
        std::fs::write(project_dir.join("config.yaml"), config_content).unwrap();

        let paths = ConfigPaths::with_dirs(Some(project_dir), Some(temp.path().join("user")));

        let loader = ConfigLoader::load_with_paths(paths, None).unwrap();
        let config = loader.config();

        assert_eq!(config.tasks.default_page_size, 50);
        assert_eq!(config.tasks.max_page_size, 100);
        assert_eq!(loader.sources().len(), 1);
        assert_eq!(loader.sources()[0].0, ConfigTier::Project);
    }

    #[test]
    fn test_user_and_explicit_tiers() {
        let temp = TempDir::new().unwrap();
        let project_dir = temp.path().join("task-tracker");
        let user_dir = temp.path().join("user");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::create_dir_all(&user_dir).unwrap();

        std::fs::write(
            project_dir.join("config.yaml"),
            "tasks:\n  default_page_size: 10\n  detail_comments: 5\n",
        )
        .unwrap();
        std::fs::write(user_dir.join("config.yaml"), "tasks:\n  default_page_size: 30\n").unwrap();
        let explicit = temp.path().join("explicit.yaml");
        std::fs::write(&explicit, "mail:\n  from: team@example.com\n").unwrap();

        let paths = ConfigPaths::with_dirs(Some(project_dir), Some(user_dir));
        let loader = ConfigLoader::load_with_paths(paths, Some(&explicit)).unwrap();
        let config = loader.config();

        // User overrides project; project survives where user is silent.
        assert_eq!(config.tasks.default_page_size, 30);
        assert_eq!(config.tasks.detail_comments, 5);
        assert_eq!(config.mail.from, "team@example.com");
        assert_eq!(loader.sources().len(), 3);
    }

    #[test]
    fn test_malformed_project_file_is_skipped() {
        let temp = TempDir::new().unwrap();
        let project_dir = temp.path().join("task-tracker");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(project_dir.join("config.yaml"), "tasks: [unclosed").unwrap();

        let paths = ConfigPaths::with_dirs(Some(project_dir), None);
        let loader = ConfigLoader::load_with_paths(paths, None).unwrap();
        assert_eq!(loader.config().tasks.default_page_size, 20);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let paths = ConfigPaths::with_dirs(None, None);
        let missing = temp.path().join("nope.yaml");
        assert!(ConfigLoader::load_with_paths(paths, Some(&missing)).is_err());
    }
}
