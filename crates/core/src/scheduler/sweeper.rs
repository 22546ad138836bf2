//! Scheduled full-directory sweeps.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Schedule, SchedulerError};
use crate::metrics;
use crate::queue::{QueueError, SubmitOutcome, TaskQueue};
use crate::task::{TriggerOrigin, WorkItem};
use crate::watcher::ScanFilter;

/// What started a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepTrigger {
    Scheduled,
    Manual,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub trigger: Option<SweepTrigger>,
    pub root: PathBuf,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Files accepted by the scan filter.
    pub scanned: usize,
    /// New tasks queued.
    pub submitted: usize,
    /// Files whose identity already had a queued or running task.
    pub already_active: usize,
    /// Files whose identity succeeded within the recency window.
    pub recently_succeeded: usize,
    pub errors: usize,
}

/// Clears the in-progress flag when a sweep ends, however it ends.
struct InProgress<'a>(&'a AtomicBool);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Enumerates the root on a schedule and submits every eligible file.
pub struct SweepScheduler {
    root: PathBuf,
    preset: Option<String>,
    schedule: Schedule,
    filter: Arc<ScanFilter>,
    queue: Arc<TaskQueue>,

    // Runtime state
    in_progress: AtomicBool,
    running: AtomicBool,
    last_report: RwLock<Option<SweepReport>>,
    next_fire: RwLock<Option<DateTime<Utc>>>,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SweepScheduler {
    pub fn new(
        root: PathBuf,
        schedule: Schedule,
        filter: Arc<ScanFilter>,
        queue: Arc<TaskQueue>,
    ) -> Self {
        Self {
            root,
            preset: None,
            schedule,
            filter,
            queue,
            in_progress: AtomicBool::new(false),
            running: AtomicBool::new(false),
            last_report: RwLock::new(None),
            next_fire: RwLock::new(None),
            shutdown: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    pub fn with_preset(mut self, preset: Option<String>) -> Self {
        self.preset = preset;
        self
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn is_sweeping(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    pub fn last_report(&self) -> Option<SweepReport> {
        self.last_report
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn next_fire(&self) -> Option<DateTime<Utc>> {
        *self.next_fire.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawn the timer loop.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return;
        }

        info!(
            root = %self.root.display(),
            schedule = %self.schedule.describe(),
            "Starting sweep scheduler"
        );

        let this = self.clone();
        let handle = tokio::spawn(async move { this.timer_loop().await });
        *self.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Stop firing. A sweep in flight stops submitting at its next file.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.shutdown.cancel();
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Scheduler loop ended abnormally");
            }
        }
        info!("Sweep scheduler stopped");
    }

    async fn timer_loop(self: Arc<Self>) {
        loop {
            let now = Utc::now();
            let next = match self.schedule.next_after(now) {
                Ok(next) => next,
                Err(e) => {
                    error!(error = %e, "Cannot compute next sweep, scheduler stopping");
                    break;
                }
            };
            *self.next_fire.write().unwrap_or_else(|e| e.into_inner()) = Some(next);
            let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
            debug!(next = %next, "Next sweep scheduled");

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            // Fired in the background so a long sweep cannot delay the
            // next fire; that fire is then suppressed.
            let this = self.clone();
            tokio::spawn(async move {
                let _ = this.run_sweep(SweepTrigger::Scheduled).await;
            });
        }

        *self.next_fire.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Sweep now unless a sweep is already running.
    pub async fn trigger_now(&self) -> Result<SweepReport, SchedulerError> {
        self.run_sweep(SweepTrigger::Manual).await
    }

    /// Run one sweep. Returns [`SchedulerError::SweepInProgress`] without
    /// doing anything if another sweep has not finished.
    pub async fn run_sweep(&self, trigger: SweepTrigger) -> Result<SweepReport, SchedulerError> {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            metrics::SWEEPS.with_label_values(&["suppressed"]).inc();
            info!(trigger = ?trigger, "Previous sweep still running, fire skipped");
            return Err(SchedulerError::SweepInProgress);
        }
        let _guard = InProgress(&self.in_progress);

        match self.sweep(trigger).await {
            Ok(report) => {
                metrics::SWEEPS.with_label_values(&["completed"]).inc();
                info!(
                    trigger = ?trigger,
                    scanned = report.scanned,
                    submitted = report.submitted,
                    already_active = report.already_active,
                    recently_succeeded = report.recently_succeeded,
                    errors = report.errors,
                    "Sweep completed"
                );
                *self.last_report.write().unwrap_or_else(|e| e.into_inner()) = Some(report.clone());
                Ok(report)
            }
            Err(e) => {
                metrics::SWEEPS.with_label_values(&["failed"]).inc();
                warn!(trigger = ?trigger, error = %e, "Sweep failed");
                Err(e)
            }
        }
    }

    async fn sweep(&self, trigger: SweepTrigger) -> Result<SweepReport, SchedulerError> {
        if !self.root.is_dir() {
            return Err(SchedulerError::RootUnavailable(self.root.clone()));
        }

        let mut report = SweepReport {
            trigger: Some(trigger),
            root: self.root.clone(),
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        let root = self.root.clone();
        let filter = self.filter.clone();
        let files = tokio::task::spawn_blocking(move || filter.collect(&root))
            .await
            .map_err(|e| SchedulerError::Scan(e.to_string()))?;
        report.scanned = files.len();

        for path in files {
            if self.shutdown.is_cancelled() {
                debug!("Shutdown requested, sweep stopping early");
                break;
            }

            let identity = self.queue.identity_for(std::slice::from_ref(&path));
            if self.queue.active_for_identity(&identity).is_some() {
                report.already_active += 1;
                continue;
            }
            match self.queue.recent_success(&identity) {
                Ok(Some(_)) => {
                    report.recently_succeeded += 1;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Recency check failed");
                    report.errors += 1;
                    continue;
                }
            }

            let item = WorkItem::single(path.clone(), TriggerOrigin::Schedule)
                .with_optional_preset(self.preset.clone());
            match self.queue.submit(item) {
                Ok(SubmitOutcome::Queued { .. }) => report.submitted += 1,
                Ok(SubmitOutcome::DuplicateActive { .. }) => report.already_active += 1,
                Ok(SubmitOutcome::Skipped { .. }) => report.recently_succeeded += 1,
                Err(QueueError::Closed) => {
                    debug!("Queue closed, sweep stopping early");
                    break;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Sweep submission failed");
                    report.errors += 1;
                }
            }
        }

        report.finished_at = Some(Utc::now());
        Ok(report)
    }
}
