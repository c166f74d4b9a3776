mod config;
pub mod database;

pub use config::{Config, NotificationsConfig, SyncConfig};
pub use database::{Database, DayStats};

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::sync::Surface;

/// Returns `~/.config/pomolink[-dev]/` based on POMOLINK_ENV.
///
/// Set POMOLINK_ENV=dev to use development data directory.
/// POMOLINK_DATA_DIR overrides the location entirely; both surfaces must
/// agree on it to share the mailbox.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os("POMOLINK_DATA_DIR") {
        let dir = PathBuf::from(dir);
        std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
        return Ok(dir);
    }

    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("POMOLINK_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("pomolink-dev")
    } else {
        base_dir.join("pomolink")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}

/// Per-surface database file. Each process owns its own timer state.
pub fn surface_db_path(dir: &std::path::Path, surface: Surface) -> PathBuf {
    dir.join(format!("{}.db", surface.as_str()))
}

/// SQLite file shared by both surfaces as their message mailbox.
pub fn mailbox_path(dir: &std::path::Path) -> PathBuf {
    dir.join("mailbox.db")
}

/// JSON document shared with the ambient display.
pub fn ambient_path(dir: &std::path::Path) -> PathBuf {
    dir.join("ambient.json")
}
