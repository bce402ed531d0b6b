//! SQLite backend configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Settings for a [`SqliteGraph`](crate::SqliteGraph).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file path; `None` opens an in-memory database
    pub path: Option<PathBuf>,

    /// Enable WAL journaling (file-backed databases only)
    pub wal: bool,

    /// Page cache size in KiB
    pub cache_kib: i64,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: None,
            wal: true,
            cache_kib: 64_000,
        }
    }
}

impl SqliteConfig {
    /// In-memory database (the default).
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// File-backed database at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_in_memory() {
        let config = SqliteConfig::default();
        assert!(config.path.is_none());
        assert!(config.wal);
    }

    #[test]
    fn test_parse_toml() {
        let config: SqliteConfig =
            toml::from_str("path = \"/tmp/graph.db\"\nwal = false\n").unwrap();
        assert_eq!(config.path.as_deref(), Some(Path::new("/tmp/graph.db")));
        assert!(!config.wal);
        assert_eq!(config.cache_kib, 64_000);
    }
}
