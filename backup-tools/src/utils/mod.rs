//! Utility modules for backup-tools.

pub mod errors;
pub mod logger;

pub use errors::{ArchiveError, BackupError, Result};
