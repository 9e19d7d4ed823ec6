//! Zip archiving of a single top-level directory.
//!
//! Entry names are relative to the archived directory and use `/`
//! separators. Directories are stored with a trailing `/`; files are
//! deflated, and symlinked files are stored with their target's contents.
//! Symlinked directories, broken links and special files are skipped. The
//! archive is staged next to its destination and only renamed into place
//! once complete, so a failed attempt leaves any previous archive untouched.

use super::relative_name;
use crate::utils::ArchiveError;
use chrono::{DateTime, Datelike, Local, Timelike};
use std::fs::{self, File, Metadata};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Valid deflate levels
const LEVEL_RANGE: std::ops::RangeInclusive<i64> = 1..=9;

/// Counts for a finished archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

impl ArchiveStats {
    pub fn entries(&self) -> usize {
        self.files + self.directories
    }
}

/// Produces one zip archive per directory. Cheap to clone into worker tasks.
#[derive(Debug, Clone, Copy)]
pub struct Archiver {
    level: Option<i64>,
}

impl Archiver {
    /// `level` outside 1-9 falls back to the deflate default.
    pub fn new(level: Option<i64>) -> Self {
        Self {
            level: resolve_level(level),
        }
    }

    pub fn level(&self) -> Option<i64> {
        self.level
    }

    /// Archive everything under `source` into `dest`.
    pub fn archive_directory(&self, source: &Path, dest: &Path) -> Result<ArchiveStats, ArchiveError> {
        fs::metadata(source).map_err(|e| ArchiveError::Read {
            path: source.to_path_buf(),
            source: e,
        })?;

        let staging = staging_path(dest);
        let file = File::create(&staging).map_err(|e| ArchiveError::Create {
            path: staging.clone(),
            source: e,
        })?;

        debug!(
            source = %source.display(),
            dest = %dest.display(),
            level = ?self.level,
            "Zipping directory"
        );

        let stats = match self.write_archive(source, file, &staging) {
            Ok(stats) => stats,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&staging) {
                    warn!(path = %staging.display(), error = %cleanup, "Failed to remove partial archive");
                }
                return Err(e);
            }
        };

        fs::rename(&staging, dest).map_err(|e| ArchiveError::Finalize {
            path: dest.to_path_buf(),
            source: e,
        })?;

        Ok(stats)
    }

    fn write_archive(&self, source: &Path, file: File, staging: &Path) -> Result<ArchiveStats, ArchiveError> {
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let mut stats = ArchiveStats::default();

        for entry in WalkDir::new(source)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| ArchiveError::Walk {
                path: source.to_path_buf(),
                source: e,
            })?;
            let path = entry.path();
            let file_type = entry.file_type();

            let Some(name) = relative_name(source, path) else {
                continue;
            };

            // Symlinked files are archived with their target's contents
            let metadata = if file_type.is_symlink() {
                match fs::metadata(path) {
                    Ok(resolved) if resolved.is_file() => resolved,
                    Ok(_) => {
                        debug!(path = %path.display(), "Skipping symlink to directory");
                        continue;
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping broken symlink");
                        continue;
                    }
                }
            } else if file_type.is_dir() || file_type.is_file() {
                entry.metadata().map_err(|e| ArchiveError::Walk {
                    path: path.to_path_buf(),
                    source: e,
                })?
            } else {
                debug!(path = %path.display(), "Skipping special file");
                continue;
            };

            if metadata.is_dir() {
                let name = format!("{name}/");
                let options = entry_options(&metadata).compression_method(CompressionMethod::Stored);
                zip.add_directory(name.clone(), options)
                    .map_err(|e| ArchiveError::Zip { entry: name, source: e })?;
                stats.directories += 1;
            } else {
                let options = entry_options(&metadata)
                    .compression_method(CompressionMethod::Deflated)
                    .compression_level(self.level);
                zip.start_file(name.clone(), options)
                    .map_err(|e| ArchiveError::Zip { entry: name, source: e })?;

                let read_err = |e: io::Error| ArchiveError::Read {
                    path: path.to_path_buf(),
                    source: e,
                };
                let mut input = File::open(path).map_err(read_err)?;
                stats.bytes += io::copy(&mut input, &mut zip).map_err(read_err)?;
                stats.files += 1;
            }
        }

        let finalize_err = |e: io::Error| ArchiveError::Finalize {
            path: staging.to_path_buf(),
            source: e,
        };
        let writer = zip.finish().map_err(|e| ArchiveError::Zip {
            entry: "central directory".to_string(),
            source: e,
        })?;
        let file = writer.into_inner().map_err(|e| finalize_err(e.into_error()))?;
        file.sync_all().map_err(finalize_err)?;

        Ok(stats)
    }
}

fn resolve_level(level: Option<i64>) -> Option<i64> {
    match level {
        Some(level) if LEVEL_RANGE.contains(&level) => Some(level),
        Some(level) => {
            warn!(level, "Compression level outside 1-9, using default");
            None
        }
        None => None,
    }
}

/// Sibling path the archive is written to before being renamed into place.
fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    dest.with_file_name(name)
}

/// Options carrying the source's timestamp and permissions.
fn entry_options(metadata: &Metadata) -> SimpleFileOptions {
    let mut options = SimpleFileOptions::default();

    if let Some(modified) = metadata.modified().ok().and_then(zip_time) {
        options = options.last_modified_time(modified);
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        options = options.unix_permissions(metadata.permissions().mode() & 0o7777);
    }

    options
}

/// Zip timestamps are local time, 1980-2107, two-second resolution.
fn zip_time(time: std::time::SystemTime) -> Option<zip::DateTime> {
    let local: DateTime<Local> = time.into();
    let year = u16::try_from(local.year()).ok()?;
    zip::DateTime::from_date_and_time(
        year,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .ok()
}
