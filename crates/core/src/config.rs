// crates/core/src/config.rs
//! Dashboard configuration: TOML file plus environment overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use statboard_types::SourceKind;

use crate::activity::DEFAULT_ACTIVITY_LIMIT;
use crate::aliases::AliasTable;
use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 47893;
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8080/api";
pub const DEFAULT_UPLOAD_LIMIT: usize = 10;

/// `cache_path` value that selects the in-memory cache backend.
pub const MEMORY_CACHE: &str = ":memory:";

/// Where cached snapshots are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLocation {
    Memory,
    File(PathBuf),
}

/// Endpoint path for each source, appended to `api_base_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcePaths {
    pub stats: String,
    pub jobs: String,
    pub activity: String,
    pub performance: String,
    pub analytics: String,
}

impl Default for SourcePaths {
    fn default() -> Self {
        Self {
            stats: "/dashboard/stats".into(),
            jobs: "/jobs?limit=20".into(),
            activity: "/activity?limit=20".into(),
            performance: "/dashboard/performance".into(),
            analytics: "/analytics/series".into(),
        }
    }
}

impl SourcePaths {
    pub fn path_for(&self, source: SourceKind) -> &str {
        match source {
            SourceKind::Stats => &self.stats,
            SourceKind::Jobs => &self.jobs,
            SourceKind::Activity => &self.activity,
            SourceKind::Performance => &self.performance,
            SourceKind::Analytics => &self.analytics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub api_base_url: String,
    pub port: u16,
    /// `None` uses the platform data dir; `":memory:"` keeps the cache in-process.
    pub cache_path: Option<PathBuf>,
    /// Timeline entries shown in "recent activity".
    pub activity_limit: usize,
    /// Rows shown in "recent uploads".
    pub upload_limit: usize,
    pub paths: SourcePaths,
    pub aliases: AliasTable,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.into(),
            port: DEFAULT_PORT,
            cache_path: None,
            activity_limit: DEFAULT_ACTIVITY_LIMIT,
            upload_limit: DEFAULT_UPLOAD_LIMIT,
            paths: SourcePaths::default(),
            aliases: AliasTable::default(),
        }
    }
}

impl DashboardConfig {
    /// Load from `path` if given (the file must exist), otherwise from the
    /// default config location if present, otherwise defaults. Environment
    /// overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match crate::paths::default_config_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Apply `STATBOARD_*` overrides from `lookup` (the process environment in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("STATBOARD_API_URL").filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(port) = lookup("STATBOARD_PORT").and_then(|p| p.parse().ok()) {
            self.port = port;
        }
        if let Some(path) = lookup("STATBOARD_CACHE_PATH").filter(|p| !p.trim().is_empty()) {
            self.cache_path = Some(PathBuf::from(path.trim()));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api_base_url must not be empty".into()));
        }
        if self.activity_limit == 0 {
            return Err(ConfigError::Invalid("activity_limit must be at least 1".into()));
        }
        Ok(())
    }

    pub fn cache_location(&self) -> Option<CacheLocation> {
        match &self.cache_path {
            Some(p) if p.as_os_str() == MEMORY_CACHE => Some(CacheLocation::Memory),
            Some(p) => Some(CacheLocation::File(p.clone())),
            None => crate::paths::cache_db_path().map(CacheLocation::File),
        }
    }

    /// Full URL for one source.
    pub fn source_url(&self, source: SourceKind) -> String {
        format!(
            "{}{}",
            self.api_base_url.trim_end_matches('/'),
            self.paths.path_for(source)
        )
    }
}
