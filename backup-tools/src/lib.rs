//! Backup Tools Library
//!
//! Scheduled incremental backups of a directory tree: the immediate
//! subdirectories of a source root are snapshotted, compared against the
//! manifest from the previous run, and only the changed ones are archived
//! into per-directory zip files.

pub mod config;
pub mod daemon;
pub mod executor;
pub mod fs;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use executor::{BackupRunner, RunSummary};
pub use utils::errors::{ArchiveError, BackupError};
pub type Result<T> = std::result::Result<T, BackupError>;
