//! Centralized path functions for app storage locations.

use std::path::PathBuf;

/// App data root: `~/Library/Application Support/statboard/` (macOS) or `~/.local/share/statboard/` (Linux).
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("statboard"))
}

/// Snapshot cache database: `<app_data_dir>/cache.db`.
pub fn cache_db_path() -> Option<PathBuf> {
    app_data_dir().map(|d| d.join("cache.db"))
}

/// Default config file: `<config_dir>/statboard/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("statboard").join("config.toml"))
}
