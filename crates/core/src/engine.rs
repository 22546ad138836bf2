//! Engine wiring: builds the queue, executor, triggers and history service
//! from configuration and owns their lifecycle.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::history::{
    AssetCleaner, FsAssetCleaner, HistoryError, HistoryService, HistoryStore, SqliteHistoryStore,
};
use crate::queue::{
    AlertBoard, ExecutorStatus, NoopProbe, QueueError, QueueJournal, ResourceProbe,
    SqliteQueueJournal, SubmitOutcome, TaskExecutor, TaskQueue, WritableDirProbe,
};
use crate::rules::{JsonRuleStore, RuleError, RuleResolver, RuleStore};
use crate::scheduler::{Schedule, SchedulerError, SweepReport, SweepScheduler};
use crate::scrape::{CommandScrapeCore, ScrapeCore};
use crate::task::{IdentityHint, TriggerOrigin, WorkItem};
use crate::watcher::{DirectoryWatcher, ScanFilter, WatcherError, WatcherSnapshot};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Rules(#[from] RuleError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Watcher(#[from] WatcherError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl From<HistoryError> for EngineError {
    fn from(e: HistoryError) -> Self {
        EngineError::Storage(e.to_string())
    }
}

/// Collaborators the engine is assembled from.
pub struct EngineParts {
    pub rules: Arc<dyn RuleStore>,
    pub history: Arc<dyn HistoryStore>,
    pub journal: Arc<dyn QueueJournal>,
    pub scrape: Arc<dyn ScrapeCore>,
    pub cleaner: Arc<dyn AssetCleaner>,
    pub probe: Arc<dyn ResourceProbe>,
}

impl EngineParts {
    /// File-backed parts as configured: SQLite history and journal, JSON
    /// rule store and the subprocess scrape core.
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let db_path = &config.database.path;
        ensure_parent_dir(db_path)?;

        let history = SqliteHistoryStore::new(db_path)?;
        let journal = SqliteQueueJournal::new(db_path)?;
        let rules = JsonRuleStore::new(&config.rules.global_path, &config.rules.presets_path);

        let (cleaner, probe): (Arc<dyn AssetCleaner>, Arc<dyn ResourceProbe>) =
            match &config.executor.output_root {
                Some(root) => (
                    Arc::new(FsAssetCleaner::confined_to(root)),
                    Arc::new(WritableDirProbe::new(root)),
                ),
                None => (Arc::new(FsAssetCleaner::new()), Arc::new(NoopProbe)),
            };

        Ok(Self {
            rules: Arc::new(rules),
            history: Arc::new(history),
            journal: Arc::new(journal),
            scrape: Arc::new(CommandScrapeCore::new(config.scrape.clone())),
            cleaner,
            probe,
        })
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), EngineError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|e| EngineError::Storage(format!("{}: {}", parent.display(), e))),
        _ => Ok(()),
    }
}

/// Scheduler part of [`EngineStatus`].
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub schedule: String,
    pub sweeping: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_fire: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sweep: Option<SweepReport>,
}

/// Engine-wide status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub executor: ExecutorStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watcher: Option<WatcherSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerStatus>,
    pub active_alerts: usize,
}

/// A manual submission before expansion.
#[derive(Debug, Clone, Default)]
pub struct ManualSubmission {
    pub paths: Vec<PathBuf>,
    pub preset: Option<String>,
    pub force: bool,
}

/// A work item the queue refused during a manual submission.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedItem {
    pub paths: Vec<PathBuf>,
    pub error: String,
}

/// Per-item results of a manual submission.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ManualReport {
    pub outcomes: Vec<SubmitOutcome>,
    pub rejected: Vec<RejectedItem>,
}

impl ManualReport {
    pub fn queued(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_queued()).count()
    }
}

/// The assembled orchestration engine.
pub struct Engine {
    pub resolver: RuleResolver,
    pub queue: Arc<TaskQueue>,
    pub executor: Arc<TaskExecutor>,
    pub history: Arc<HistoryService>,
    pub alerts: Arc<AlertBoard>,
    pub filter: Arc<ScanFilter>,
    pub watcher: Option<Arc<DirectoryWatcher>>,
    pub scheduler: Option<Arc<SweepScheduler>>,
}

impl Engine {
    pub fn new(config: &Config, parts: EngineParts) -> Result<Self, EngineError> {
        let resolver = RuleResolver::new(parts.rules);
        let filter = Arc::new(ScanFilter::from_config(&config.scan)?);
        let alerts = Arc::new(AlertBoard::new());

        let scrape = parts.scrape;
        let hint_core = scrape.clone();
        let hint: IdentityHint = Arc::new(move |paths: &[PathBuf]| hint_core.identify(paths));

        let queue = Arc::new(
            TaskQueue::new(
                resolver.clone(),
                parts.history.clone(),
                parts.journal,
                &config.executor,
            )
            .with_identity_hint(hint),
        );

        let executor = Arc::new(
            TaskExecutor::new(
                queue.clone(),
                scrape,
                alerts.clone(),
                config.executor.clone(),
            )
            .with_probe(parts.probe),
        );

        let history = Arc::new(HistoryService::new(
            parts.history,
            queue.clone(),
            parts.cleaner,
        ));

        let watcher = if config.watcher.enabled {
            Some(Arc::new(DirectoryWatcher::new(
                config.watcher.clone(),
                filter.clone(),
                queue.clone(),
            )?))
        } else {
            None
        };

        let scheduler = if config.scheduler.enabled {
            let root = config
                .scheduler
                .root
                .clone()
                .or_else(|| config.watcher.root.clone())
                .ok_or_else(|| {
                    EngineError::Scheduler(SchedulerError::InvalidSchedule(
                        "no sweep root configured".to_string(),
                    ))
                })?;
            let schedule = Schedule::from_spec(&config.scheduler.schedule)?;
            Some(Arc::new(
                SweepScheduler::new(root, schedule, filter.clone(), queue.clone())
                    .with_preset(config.scheduler.preset.clone()),
            ))
        } else {
            None
        };

        Ok(Self {
            resolver,
            queue,
            executor,
            history,
            alerts,
            filter,
            watcher,
            scheduler,
        })
    }

    /// Restore journaled work, then start workers and trigger sources.
    /// Returns how many journaled items were requeued.
    pub fn start(&self) -> Result<usize, EngineError> {
        let restored = self.queue.restore()?;
        if restored > 0 {
            info!(restored, "Requeued work from previous run");
        }

        self.executor.start();
        if let Some(watcher) = &self.watcher {
            watcher.start();
        }
        if let Some(scheduler) = &self.scheduler {
            scheduler.start();
        }
        Ok(restored)
    }

    /// Stop trigger sources first, then drain the executor.
    pub async fn stop(&self) {
        if let Some(watcher) = &self.watcher {
            watcher.stop().await;
        }
        if let Some(scheduler) = &self.scheduler {
            scheduler.stop().await;
        }
        self.executor.stop().await;
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            executor: self.executor.status(),
            watcher: self.watcher.as_ref().map(|w| w.status().snapshot()),
            scheduler: self.scheduler.as_ref().map(|s| SchedulerStatus {
                schedule: s.schedule().describe(),
                sweeping: s.is_sweeping(),
                next_fire: s.next_fire(),
                last_sweep: s.last_report(),
            }),
            active_alerts: self.alerts.active().len(),
        }
    }

    /// Submit a manual selection.
    ///
    /// A single directory expands into one work item per accepted file, in
    /// sorted order. Otherwise all paths form one title. Paths must be
    /// absolute and exist.
    /// Expand and submit a manual selection.
    ///
    /// Path and preset problems reject the whole submission. Once items are
    /// expanded each one is submitted on its own; an error is returned only
    /// if every item was refused.
    pub async fn submit_manual(
        &self,
        submission: ManualSubmission,
    ) -> Result<ManualReport, EngineError> {
        if submission.paths.is_empty() {
            return Err(EngineError::InvalidPath("no paths given".to_string()));
        }
        for path in &submission.paths {
            if !path.is_absolute() {
                return Err(EngineError::InvalidPath(format!(
                    "{} is not absolute",
                    path.display()
                )));
            }
            if !path.exists() {
                return Err(EngineError::InvalidPath(format!(
                    "{} does not exist",
                    path.display()
                )));
            }
        }

        self.resolver.check(submission.preset.as_deref())?;

        let items: Vec<WorkItem> = match submission.paths.as_slice() {
            [dir] if dir.is_dir() => {
                let filter = self.filter.clone();
                let root = dir.clone();
                tokio::task::spawn_blocking(move || filter.collect(&root))
                    .await
                    .map_err(|e| EngineError::Storage(format!("directory walk failed: {}", e)))?
                    .into_iter()
                    .map(|file| WorkItem::single(file, TriggerOrigin::Manual))
                    .collect()
            }
            paths => {
                if let Some(dir) = paths.iter().find(|p| p.is_dir()) {
                    return Err(EngineError::InvalidPath(format!(
                        "{} is a directory and cannot be combined with other paths",
                        dir.display()
                    )));
                }
                vec![WorkItem::new(paths.to_vec(), TriggerOrigin::Manual)]
            }
        };

        let mut report = ManualReport::default();
        let mut first_error = None;
        for item in items {
            let mut item = item.with_optional_preset(submission.preset.clone());
            item.force = submission.force;
            let paths = item.paths.clone();
            match self.queue.submit(item) {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    warn!(paths = ?paths, error = %e, "Manual item refused");
                    report.rejected.push(RejectedItem {
                        paths,
                        error: e.to_string(),
                    });
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if report.outcomes.is_empty() {
            if let Some(e) = first_error {
                return Err(e.into());
            }
        }

        info!(
            paths = submission.paths.len(),
            items = report.outcomes.len() + report.rejected.len(),
            queued = report.queued(),
            rejected = report.rejected.len(),
            "Manual submission accepted"
        );
        Ok(report)
    }
}
