//! Configuration management for backup-tools.
//!
//! Loads configuration from the environment (optionally seeded by a `.env`
//! file) or from a TOML file. The resulting [`Config`] is built once at
//! startup and handed to every component that needs it.

use crate::utils::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the manifest inside the output directory
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory whose immediate subdirectories are backed up
    #[serde(default = "default_source_path")]
    pub source_path: PathBuf,

    /// Directory receiving the archives and the manifest
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Six-field cron expression (seconds first)
    #[serde(default = "default_cron_expression")]
    pub cron_expression: String,

    /// Deflate level for archived files (1-9, None = library default)
    #[serde(default)]
    pub compression_level: Option<i64>,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_source_path() -> PathBuf {
    PathBuf::from("/data")
}

fn default_output_path() -> PathBuf {
    PathBuf::from("/backups")
}

fn default_cron_expression() -> String {
    "0 15 * * * *".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_path: default_source_path(),
            output_path: default_output_path(),
            cron_expression: default_cron_expression(),
            compression_level: None,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Build configuration from environment variables, loading `.env` first if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BackupError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| BackupError::Config(format!("invalid {}: {}", path.display(), e)))
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            source_path: var("SOURCE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_source_path),
            output_path: var("BACKUP_OUTPUT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_output_path),
            cron_expression: var("CRON_EXPRESSION").unwrap_or_else(default_cron_expression),
            compression_level: var("COMPRESSION_LEVEL").and_then(|v| v.trim().parse().ok()),
            log_level: var("LOG_LEVEL").unwrap_or_else(default_log_level),
        }
    }

    /// Location of the persisted manifest
    pub fn manifest_path(&self) -> PathBuf {
        self.output_path.join(MANIFEST_FILE_NAME)
    }

    /// Location of the archive for a top-level directory
    pub fn archive_path(&self, directory_name: &str) -> PathBuf {
        self.output_path.join(format!("{directory_name}.zip"))
    }
}
