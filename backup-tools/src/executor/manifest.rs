//! Snapshot types and manifest persistence for incremental backups.
//!
//! A snapshot is a flat list of top-level [`DirectoryEntry`] values, each
//! carrying every descendant directory one level deep. The manifest is the
//! snapshot of the last run, serialized as pretty-printed JSON in
//! `manifest.json` under the output directory.

use crate::utils::{BackupError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// A snapshot of the source tree: top-level directories in scan order.
pub type Snapshot = Vec<DirectoryEntry>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    #[default]
    Directory,
}

/// One directory node.
///
/// For top-level entries `name` is the directory's base name; for descendants
/// it is the `/`-separated path relative to the top-level ancestor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,

    #[serde(rename = "type", alias = "kind", default)]
    pub kind: EntryKind,

    #[serde(rename = "mod_time", alias = "modTime")]
    pub mod_time: DateTime<Utc>,

    /// Flat list of descendants; always empty on descendants themselves
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DirectoryEntry>,

    /// Set once this directory has been archived successfully
    #[serde(
        rename = "zip_path",
        alias = "archivePath",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub archive_path: Option<PathBuf>,

    /// Computed per run, never persisted
    #[serde(skip)]
    pub needs_backup: bool,
}

impl DirectoryEntry {
    pub fn top_level(name: impl Into<String>, mod_time: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Directory,
            mod_time,
            children: Vec::new(),
            archive_path: None,
            needs_backup: false,
        }
    }

    pub fn descendant(relative_name: impl Into<String>, mod_time: DateTime<Utc>) -> Self {
        Self::top_level(relative_name, mod_time)
    }

    pub fn with_children(mut self, children: Vec<DirectoryEntry>) -> Self {
        self.children = children;
        self
    }
}

/// Overwrite every timestamp in the snapshot (top-level and children) with `now`.
pub fn stamp_snapshot(snapshot: &mut [DirectoryEntry], now: DateTime<Utc>) {
    for entry in snapshot {
        entry.mod_time = now;
        for child in &mut entry.children {
            child.mod_time = now;
        }
    }
}

/// Reads and writes the manifest file.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the prior snapshot.
    ///
    /// Returns [`BackupError::ManifestNotFound`] when no manifest exists, so the
    /// caller can tell a first run apart from an unreadable manifest.
    pub fn load(&self) -> Result<Snapshot> {
        let content = fs::read(&self.path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                BackupError::ManifestNotFound(self.path.clone())
            } else {
                BackupError::ManifestRead {
                    path: self.path.clone(),
                    source: e,
                }
            }
        })?;

        serde_json::from_slice(&content).map_err(|e| BackupError::ManifestParse {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Persist the snapshot, replacing any previous manifest.
    ///
    /// Written to a sibling temp file first and renamed into place so a crash
    /// mid-write never leaves a truncated manifest behind.
    pub fn save(&self, snapshot: &[DirectoryEntry]) -> Result<()> {
        let save_err = |path: &Path, e: std::io::Error| BackupError::ManifestSave {
            path: path.to_path_buf(),
            source: e,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| save_err(parent, e))?;
        }

        let json = serde_json::to_vec_pretty(snapshot)?;
        let temp_path = self.temp_path();

        let file = File::create(&temp_path).map_err(|e| save_err(&temp_path, e))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(&json)
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush())
            .map_err(|e| save_err(&temp_path, e))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| save_err(&temp_path, e))?;
        drop(writer);

        fs::rename(&temp_path, &self.path).map_err(|e| save_err(&self.path, e))?;

        tracing::debug!(path = %self.path.display(), entries = snapshot.len(), "Manifest saved");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
