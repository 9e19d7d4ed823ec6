//! Directory snapshotting.
//!
//! Builds the two-level snapshot used for change detection: one entry per
//! immediate subdirectory of the root, each holding a flat list of every
//! directory beneath it with `/`-separated relative names.

use super::relative_name;
use crate::executor::manifest::{DirectoryEntry, Snapshot};
use crate::utils::{BackupError, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Walks the backup root once per run.
#[derive(Debug, Clone)]
pub struct TreeScanner {
    root: PathBuf,
}

impl TreeScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Scan the root and produce the current snapshot.
    ///
    /// Only an unreadable root is fatal. A top-level directory that cannot be
    /// inspected is skipped, and one whose descendants cannot be walked is
    /// kept with no children.
    pub fn scan(&self) -> Result<Snapshot> {
        let read_dir = fs::read_dir(&self.root).map_err(|e| BackupError::Scan {
            path: self.root.clone(),
            source: e,
        })?;

        let mut snapshot = Vec::new();

        for entry in read_dir {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(root = %self.root.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            let path = entry.path();
            let is_dir = match entry.file_type() {
                Ok(file_type) => file_type.is_dir(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not get file type, skipping");
                    continue;
                }
            };
            if !is_dir {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let stat = entry.metadata().and_then(|m| modified_time(&m));
            if let Some(top) = top_level_entry(name, &path, stat, || collect_descendants(&path)) {
                snapshot.push(top);
            }
        }

        snapshot.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(snapshot)
    }
}

/// Build a top-level entry from its stat result and descendant walk.
///
/// A failed stat drops the directory; a failed walk keeps it with no children.
fn top_level_entry<F>(
    name: String,
    path: &Path,
    stat: std::io::Result<DateTime<Utc>>,
    descendants: F,
) -> Option<DirectoryEntry>
where
    F: FnOnce() -> std::io::Result<Vec<DirectoryEntry>>,
{
    let mod_time = match stat {
        Ok(t) => t,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not get info for directory, skipping");
            return None;
        }
    };

    let children = match descendants() {
        Ok(children) => children,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not collect descendants, keeping entry without children");
            Vec::new()
        }
    };

    Some(DirectoryEntry::top_level(name, mod_time).with_children(children))
}

/// Collect every directory below `top` (any depth) as a flat list.
fn collect_descendants(top: &Path) -> std::io::Result<Vec<DirectoryEntry>> {
    let mut descendants = Vec::new();

    for entry in WalkDir::new(top)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }

        let metadata = entry.metadata()?;
        let mod_time = modified_time(&metadata)?;
        let Some(name) = relative_name(top, entry.path()) else {
            continue;
        };

        descendants.push(DirectoryEntry::descendant(name, mod_time));
    }

    Ok(descendants)
}

fn modified_time(metadata: &Metadata) -> std::io::Result<DateTime<Utc>> {
    metadata.modified().map(DateTime::<Utc>::from)
}
