//! Backup run orchestration.
//!
//! One run is: scan the source tree, load the prior manifest, mark changed
//! top-level directories, archive them concurrently, then persist the new
//! snapshot. Per-directory archive failures are logged and folded into the
//! summary; only scan and manifest failures abort a run.

pub mod diff;
pub mod manifest;

use crate::config::Config;
use crate::fs::archiver::{ArchiveStats, Archiver};
use crate::fs::scanner::TreeScanner;
use crate::utils::{ArchiveError, BackupError, Result};
use chrono::Utc;
use manifest::{stamp_snapshot, DirectoryEntry, ManifestStore, Snapshot};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// What happened during one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// No prior manifest existed; the snapshot was recorded without archiving
    pub first_run: bool,
    pub scanned: usize,
    pub unchanged: usize,
    pub archived: usize,
    pub failed: usize,
}

impl RunSummary {
    /// Directories an archive was attempted for
    pub fn processed(&self) -> usize {
        self.archived + self.failed
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first_run {
            return write!(f, "first manifest created ({} directories)", self.scanned);
        }
        write!(
            f,
            "{} scanned, {} unchanged, {} archived, {} failed",
            self.scanned, self.unchanged, self.archived, self.failed
        )
    }
}

/// Outcome of archiving one flagged directory
struct ArchiveOutcome {
    index: usize,
    dest: PathBuf,
    result: std::result::Result<ArchiveStats, ArchiveError>,
}

/// Runs incremental backups for one configured source/output pair.
pub struct BackupRunner {
    config: Arc<Config>,
    archiver: Archiver,
    manifest: ManifestStore,
}

impl BackupRunner {
    pub fn new(config: Arc<Config>) -> Self {
        let archiver = Archiver::new(config.compression_level);
        let manifest = ManifestStore::new(config.manifest_path());
        Self {
            config,
            archiver,
            manifest,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute one backup run.
    pub async fn run(&self) -> Result<RunSummary> {
        let start_time = Instant::now();
        info!(
            source = %self.config.source_path.display(),
            output = %self.config.output_path.display(),
            "Backup run starting"
        );

        let scanner = TreeScanner::new(&self.config.source_path);
        let mut snapshot = tokio::task::spawn_blocking(move || scanner.scan()).await??;

        let store = self.manifest.clone();
        let previous = match tokio::task::spawn_blocking(move || store.load()).await? {
            Ok(previous) => previous,
            Err(e) if e.is_manifest_not_found() => {
                return self.bootstrap(snapshot).await;
            }
            Err(e) => return Err(e),
        };

        let flagged = diff::mark_changes(&mut snapshot, &previous);
        let mut summary = RunSummary {
            scanned: snapshot.len(),
            unchanged: snapshot.len() - flagged,
            ..RunSummary::default()
        };

        if flagged == 0 {
            info!("There's nothing to backup");
        } else {
            let output = self.config.output_path.clone();
            tokio::task::spawn_blocking(move || {
                std::fs::create_dir_all(&output)
                    .map_err(|e| BackupError::OutputDir { path: output, source: e })
            })
            .await??;

            let (archived, failed) = self.archive_changed(&mut snapshot).await;
            summary.archived = archived;
            summary.failed = failed;
        }

        self.save_manifest(snapshot).await?;

        info!(
            scanned = summary.scanned,
            unchanged = summary.unchanged,
            archived = summary.archived,
            failed = summary.failed,
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Backup run complete: {}",
            summary
        );

        Ok(summary)
    }

    /// First run: record the tree with every timestamp set to now, archive nothing.
    async fn bootstrap(&self, mut snapshot: Snapshot) -> Result<RunSummary> {
        stamp_snapshot(&mut snapshot, Utc::now());
        let summary = RunSummary {
            first_run: true,
            scanned: snapshot.len(),
            ..RunSummary::default()
        };
        self.save_manifest(snapshot).await?;

        info!(path = %self.manifest.path().display(), "First manifest created: {}", summary);
        Ok(summary)
    }

    async fn save_manifest(&self, snapshot: Snapshot) -> Result<()> {
        let store = self.manifest.clone();
        tokio::task::spawn_blocking(move || store.save(&snapshot)).await?
    }

    /// Archive every flagged entry concurrently, one task per directory.
    ///
    /// Each task returns its own outcome; results are written back onto the
    /// snapshot only after every task has finished. Returns (archived, failed).
    async fn archive_changed(&self, snapshot: &mut [DirectoryEntry]) -> (usize, usize) {
        let mut handles = Vec::new();

        for (index, entry) in snapshot.iter().enumerate().filter(|(_, e)| e.needs_backup) {
            let archiver = self.archiver;
            let source = self.config.source_path.join(&entry.name);
            let dest = self.config.archive_path(&entry.name);
            tracing::debug!(dir = %entry.name, "Archiving directory");

            let handle = tokio::task::spawn_blocking(move || {
                let result = archiver.archive_directory(&source, &dest);
                ArchiveOutcome { index, dest, result }
            });
            handles.push((index, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (index, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => outcomes.push(ArchiveOutcome {
                    index,
                    dest: self.config.archive_path(&snapshot[index].name),
                    result: Err(ArchiveError::Task(e.to_string())),
                }),
            }
        }

        let mut archived = 0;
        let mut failed = 0;
        for outcome in outcomes {
            let entry = &mut snapshot[outcome.index];
            match outcome.result {
                Ok(stats) => {
                    info!(
                        dir = %entry.name,
                        archive = %outcome.dest.display(),
                        files = stats.files,
                        directories = stats.directories,
                        bytes = stats.bytes,
                        "Directory archived"
                    );
                    entry.archive_path = Some(outcome.dest);
                    archived += 1;
                }
                Err(e) => {
                    error!(dir = %entry.name, error = %e, "Failed to archive directory");
                    entry.archive_path = None;
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            warn!(archived, failed, "Some directories could not be archived");
        }

        (archived, failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use zip::ZipArchive;

    struct Fixture {
        _temp: TempDir,
        source: PathBuf,
        output: PathBuf,
        runner: BackupRunner,
    }

    fn fixture(dirs: &[&str]) -> Fixture {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("data");
        let output = temp.path().join("backups");

        for dir in dirs {
            fs::create_dir_all(source.join(dir).join("sub")).unwrap();
            fs::write(source.join(dir).join("file.txt"), dir.as_bytes()).unwrap();
            fs::write(source.join(dir).join("sub/nested.txt"), b"nested").unwrap();
        }

        let config = Config {
            source_path: source.clone(),
            output_path: output.clone(),
            ..Config::default()
        };

        Fixture {
            _temp: temp,
            source,
            output,
            runner: BackupRunner::new(Arc::new(config)),
        }
    }

    fn epoch() -> DateTime<Utc> {
        Utc.timestamp_opt(0, 0).unwrap()
    }

    /// Persist a manifest that differs from the tree on every entry.
    fn write_stale_manifest(fx: &Fixture, dirs: &[&str]) {
        let stale: Snapshot = dirs
            .iter()
            .map(|d| DirectoryEntry::top_level(*d, epoch()))
            .collect();
        ManifestStore::new(fx.output.join("manifest.json"))
            .save(&stale)
            .unwrap();
    }

    fn load_manifest(output: &Path) -> Snapshot {
        ManifestStore::new(output.join("manifest.json")).load().unwrap()
    }

    fn zip_files(output: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(output)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".zip"))
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_first_run_records_manifest_without_archiving() {
        let fx = fixture(&["alpha", "beta"]);
        let before = Utc::now();

        let summary = fx.runner.run().await.unwrap();

        assert!(summary.first_run);
        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.processed(), 0);
        assert!(zip_files(&fx.output).is_empty());

        let manifest = load_manifest(&fx.output);
        let names: Vec<_> = manifest.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);

        let stamp = manifest[0].mod_time;
        assert!(stamp >= before);
        for entry in &manifest {
            assert_eq!(entry.mod_time, stamp);
            assert_eq!(entry.children.len(), 1);
            assert!(entry.children.iter().all(|c| c.mod_time == stamp));
            assert!(entry.archive_path.is_none());
        }
    }

    #[tokio::test]
    async fn test_runs_after_bootstrap_archive_then_settle() {
        let fx = fixture(&["alpha", "beta"]);

        fx.runner.run().await.unwrap();

        // Bootstrap timestamps never match the real tree, so everything is archived
        let second = fx.runner.run().await.unwrap();
        assert!(!second.first_run);
        assert_eq!(second.archived, 2);
        assert_eq!(zip_files(&fx.output), vec!["alpha.zip", "beta.zip"]);

        let third = fx.runner.run().await.unwrap();
        assert_eq!(third.archived, 0);
        assert_eq!(third.unchanged, 2);

        // Unchanged entries keep pointing at their archives
        let manifest = load_manifest(&fx.output);
        assert_eq!(manifest[0].archive_path, Some(fx.output.join("alpha.zip")));
        assert_eq!(manifest[1].archive_path, Some(fx.output.join("beta.zip")));
    }

    #[tokio::test]
    async fn test_only_changed_directories_are_archived() {
        let fx = fixture(&["alpha", "beta"]);
        fx.runner.run().await.unwrap();
        fx.runner.run().await.unwrap();
        fs::remove_file(fx.output.join("alpha.zip")).unwrap();
        fs::remove_file(fx.output.join("beta.zip")).unwrap();

        fs::create_dir(fx.source.join("beta/sub/added")).unwrap();
        let summary = fx.runner.run().await.unwrap();

        assert_eq!(summary.archived, 1);
        assert_eq!(zip_files(&fx.output), vec!["beta.zip"]);
    }

    #[tokio::test]
    async fn test_new_directory_is_archived() {
        let fx = fixture(&["alpha"]);
        fx.runner.run().await.unwrap();
        fx.runner.run().await.unwrap();

        fs::create_dir_all(fx.source.join("gamma/inner")).unwrap();
        let summary = fx.runner.run().await.unwrap();

        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.archived, 1);
        let archive = ZipArchive::new(fs::File::open(fx.output.join("gamma.zip")).unwrap()).unwrap();
        assert_eq!(archive.len(), 1);
    }

    #[tokio::test]
    async fn test_archive_failure_is_isolated() {
        let dirs = ["alpha", "beta", "gamma"];
        let fx = fixture(&dirs);
        write_stale_manifest(&fx, &dirs);

        // A directory squatting on beta's staging path makes its archive uncreatable
        fs::create_dir_all(fx.output.join("beta.zip.tmp")).unwrap();

        let summary = fx.runner.run().await.unwrap();

        assert_eq!(summary.archived, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed(), 3);
        assert_eq!(zip_files(&fx.output), vec!["alpha.zip", "gamma.zip"]);

        let manifest = load_manifest(&fx.output);
        assert_eq!(manifest[0].archive_path, Some(fx.output.join("alpha.zip")));
        assert_eq!(manifest[1].archive_path, None);
        assert_eq!(manifest[2].archive_path, Some(fx.output.join("gamma.zip")));
        assert!(manifest.iter().all(|e| e.mod_time != epoch()));
    }

    #[tokio::test]
    async fn test_source_removed_after_scan_fails_only_that_directory() {
        let dirs = ["alpha", "beta", "gamma"];
        let fx = fixture(&dirs);

        let mut snapshot = TreeScanner::new(&fx.source).scan().unwrap();
        for entry in &mut snapshot {
            entry.needs_backup = true;
        }
        fs::remove_dir_all(fx.source.join("beta")).unwrap();
        fs::create_dir_all(&fx.output).unwrap();

        let (archived, failed) = fx.runner.archive_changed(&mut snapshot).await;

        assert_eq!((archived, failed), (2, 1));
        assert!(snapshot[0].archive_path.is_some());
        assert!(snapshot[1].archive_path.is_none());
        assert!(snapshot[2].archive_path.is_some());
    }

    #[tokio::test]
    async fn test_manifest_saved_after_all_archives_complete() {
        let dirs = ["a1", "a2", "a3", "a4", "a5", "a6"];
        let fx = fixture(&dirs);
        write_stale_manifest(&fx, &dirs);

        fx.runner.run().await.unwrap();

        // Every archive referenced by the manifest exists and is complete
        let manifest = load_manifest(&fx.output);
        assert_eq!(manifest.len(), dirs.len());
        for entry in &manifest {
            let path = entry.archive_path.as_ref().unwrap();
            let archive = ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
            assert_eq!(archive.len(), 3);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_runs_inside_spawned_tasks() {
        let fx = fixture(&["alpha"]);
        let runner = Arc::new(fx.runner);

        let first = {
            let runner = runner.clone();
            tokio::spawn(async move { runner.run().await }).await.unwrap().unwrap()
        };
        assert!(first.first_run);

        let second = tokio::spawn(async move { runner.run().await }).await.unwrap().unwrap();
        assert_eq!(second.archived, 1);
        assert!(fx.output.join("alpha.zip").exists());
        assert_eq!(load_manifest(&fx.output)[0].archive_path, Some(fx.output.join("alpha.zip")));
    }

    #[tokio::test]
    async fn test_missing_source_aborts_before_side_effects() {
        let fx = fixture(&[]);
        let err = fx.runner.run().await.unwrap_err();

        assert!(matches!(err, BackupError::Scan { .. }));
        assert!(!fx.output.exists());
    }

    #[tokio::test]
    async fn test_corrupt_manifest_aborts_run() {
        let fx = fixture(&["alpha"]);
        fs::create_dir_all(&fx.output).unwrap();
        fs::write(fx.output.join("manifest.json"), b"not json").unwrap();

        let err = fx.runner.run().await.unwrap_err();

        assert!(matches!(err, BackupError::ManifestParse { .. }));
        assert!(zip_files(&fx.output).is_empty());
        assert_eq!(fs::read(fx.output.join("manifest.json")).unwrap(), b"not json");
    }

    #[test]
    fn test_summary_display() {
        let summary = RunSummary {
            first_run: false,
            scanned: 5,
            unchanged: 2,
            archived: 2,
            failed: 1,
        };
        assert_eq!(summary.to_string(), "5 scanned, 2 unchanged, 2 archived, 1 failed");
        assert_eq!(summary.processed(), 3);
    }
}
