//! Cron-driven backup triggering.
//!
//! Runs never overlap: a trigger that fires while a previous run is still in
//! progress is skipped and logged, and the next trigger tries again. A failed
//! run is logged and does not stop the schedule.

use crate::executor::{BackupRunner, RunSummary};
use crate::utils::{BackupError, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

/// Result of a trigger
#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunSummary),
    Failed(BackupError),
    /// A previous run was still in progress
    Skipped,
}

/// Run once unless another run holds `run_lock`.
pub async fn run_exclusive(runner: &BackupRunner, run_lock: &Mutex<()>) -> RunOutcome {
    let Ok(_guard) = run_lock.try_lock() else {
        tracing::warn!("Skipping scheduled run: previous backup still running");
        return RunOutcome::Skipped;
    };

    let started = chrono::Local::now();
    tracing::info!(at = %started.format("%Y-%m-%d %H:%M:%S"), "Backup is running");

    match runner.run().await {
        Ok(summary) => RunOutcome::Completed(summary),
        Err(e) => {
            tracing::error!(error = %e, "Backup run failed, will retry on next trigger");
            RunOutcome::Failed(e)
        }
    }
}

pub struct BackupScheduler {
    scheduler: Mutex<JobScheduler>,
    runner: Arc<BackupRunner>,
    run_lock: Arc<Mutex<()>>,
}

impl BackupScheduler {
    pub async fn new(runner: Arc<BackupRunner>) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            runner,
            run_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Register the backup job on `cron_expression` (seconds-first, six fields).
    pub async fn schedule(&self, cron_expression: &str) -> Result<()> {
        let runner = self.runner.clone();
        let run_lock = self.run_lock.clone();

        let job = Job::new_async(cron_expression, move |_uuid, _lock| {
            let runner = runner.clone();
            let run_lock = run_lock.clone();
            Box::pin(async move {
                run_exclusive(&runner, &run_lock).await;
            })
        })
        .map_err(|e| {
            BackupError::Config(format!("invalid cron expression {cron_expression:?}: {e}"))
        })?;

        self.scheduler.lock().await.add(job).await?;
        tracing::info!(cron = %cron_expression, "Backup job scheduled");
        Ok(())
    }

    /// Trigger a run immediately, honouring the overlap guard.
    pub async fn trigger(&self) -> RunOutcome {
        run_exclusive(&self.runner, &self.run_lock).await
    }

    pub async fn start(&self) -> Result<()> {
        self.scheduler.lock().await.start().await?;
        Ok(())
    }

    /// Stop triggering and wait for an in-progress run to finish.
    pub async fn shutdown(&self) -> Result<()> {
        self.scheduler.lock().await.shutdown().await?;
        let _idle = self.run_lock.lock().await;
        Ok(())
    }
}
