//! Error types for backup runs.
//!
//! [`BackupError`] covers failures that abort a whole run. Failures while
//! archiving a single directory are reported as [`ArchiveError`] and never
//! escalate past that directory.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to scan {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Manifest not found: {}", .0.display())]
    ManifestNotFound(PathBuf),

    #[error("Failed to read manifest {}: {source}", path.display())]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest {}: {source}", path.display())]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to save manifest {}: {source}", path.display())]
    ManifestSave {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cannot prepare output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
}

impl BackupError {
    /// True when the prior manifest simply does not exist yet (first run).
    pub fn is_manifest_not_found(&self) -> bool {
        matches!(self, BackupError::ManifestNotFound(_))
    }
}

/// Failure to archive one top-level directory.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to create archive {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Zip error on {entry}: {source}")]
    Zip {
        entry: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Failed to finalize archive {}: {source}", path.display())]
    Finalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, BackupError>;
