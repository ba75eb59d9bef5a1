//! Tiered configuration.
//!
//! Layers are merged field by field, later layers winning:
//! 1. **Defaults** - compiled in
//! 2. **Project** - `$CWD/task-tracker/config.yaml`
//! 3. **User** - `~/.task-tracker/config.yaml`
//! 4. **Explicit** - `--config` or `TASK_TRACKER_CONFIG_PATH`
//! 5. **Environment** - single-value overrides
//!
//! ## Environment Variables
//! - `TASK_TRACKER_CONFIG_PATH` - Explicit config file
//! - `TASK_TRACKER_DB_PATH` - Database path
//! - `TASK_TRACKER_MEDIA_DIR` - Attachment directory
//! - `TASK_TRACKER_PORT` - HTTP port
//! - `TASK_TRACKER_SECRET_KEY` - Token signing key
//! - `TASK_TRACKER_USER_DIR` - User config dir (default: `~/.task-tracker`)
//! - `TASK_TRACKER_PROJECT_DIR` - Project config dir (default: `./task-tracker`)

mod loader;
mod merge;
mod types;

pub use loader::{ConfigLoader, ConfigPaths, ConfigTier};
pub use merge::{deep_merge, deep_merge_all};
pub use types::*;
