//! Directory watcher.
//!
//! Filesystem notifications are normalized into [`ChangeEvent`]s on a
//! bounded channel and consumed by a single loop that owns the stability
//! tracker. Backend failures, including the root disappearing, are retried
//! with backoff while the loop keeps running in degraded mode.

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{BackoffPolicy, ScanFilter, StabilityTracker, WatcherConfig, WatcherError};
use crate::metrics;
use crate::queue::{QueueError, SubmitOutcome, TaskQueue};
use crate::task::{TriggerOrigin, WorkItem};

/// Normalized filesystem change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// Created, written or moved in.
    Touched(PathBuf),
    /// Deleted or moved out.
    Removed(PathBuf),
    /// The notification backend reported an error.
    BackendFailed(String),
}

/// Live watcher state shared with the status endpoint.
#[derive(Debug, Default)]
pub struct WatcherStatus {
    degraded: AtomicBool,
    tracked: AtomicUsize,
    submitted: AtomicU64,
    last_error: RwLock<Option<String>>,
}

/// Serializable view of [`WatcherStatus`].
#[derive(Debug, Clone, Serialize)]
pub struct WatcherSnapshot {
    pub degraded: bool,
    pub tracked_paths: usize,
    pub submitted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl WatcherStatus {
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> WatcherSnapshot {
        WatcherSnapshot {
            degraded: self.is_degraded(),
            tracked_paths: self.tracked.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            last_error: self
                .last_error
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }

    fn set_degraded(&self, error: Option<String>) {
        self.degraded.store(error.is_some(), Ordering::Relaxed);
        if error.is_some() {
            *self.last_error.write().unwrap_or_else(|e| e.into_inner()) = error;
        }
    }
}

/// Observes a root directory and submits files once they stop changing.
pub struct DirectoryWatcher {
    root: PathBuf,
    config: WatcherConfig,
    filter: Arc<ScanFilter>,
    queue: Arc<TaskQueue>,
    status: Arc<WatcherStatus>,
    running: AtomicBool,
    shutdown: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DirectoryWatcher {
    pub fn new(
        config: WatcherConfig,
        filter: Arc<ScanFilter>,
        queue: Arc<TaskQueue>,
    ) -> Result<Self, WatcherError> {
        let root = config.root.clone().ok_or(WatcherError::MissingRoot)?;
        Ok(Self {
            root,
            config,
            filter,
            queue,
            status: Arc::new(WatcherStatus::default()),
            running: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            handle: Mutex::new(None),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn status(&self) -> Arc<WatcherStatus> {
        self.status.clone()
    }

    /// Spawn the event loop.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Watcher already running");
            return;
        }

        info!(
            root = %self.root.display(),
            stability_ms = self.config.stability_interval_ms,
            "Starting directory watcher"
        );

        let event_loop = EventLoop {
            root: self.root.clone(),
            preset: self.config.preset.clone(),
            interval: Duration::from_millis(self.config.stability_interval_ms.max(1)),
            buffer: self.config.event_buffer.max(1),
            backoff: BackoffPolicy::from(&self.config.backoff),
            filter: self.filter.clone(),
            queue: self.queue.clone(),
            status: self.status.clone(),
            shutdown: self.shutdown.clone(),
        };
        let handle = tokio::spawn(event_loop.run());
        *self.handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Stop observing. Paths still settling are dropped; the next sweep
    /// picks them up.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.shutdown.cancel();
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Watcher loop ended abnormally");
            }
        }
        info!("Directory watcher stopped");
    }
}

struct EventLoop {
    root: PathBuf,
    preset: Option<String>,
    interval: Duration,
    buffer: usize,
    backoff: BackoffPolicy,
    filter: Arc<ScanFilter>,
    queue: Arc<TaskQueue>,
    status: Arc<WatcherStatus>,
    shutdown: CancellationToken,
}

impl EventLoop {
    async fn run(mut self) {
        let (tx, mut rx) = mpsc::channel(self.buffer);
        let mut tracker = StabilityTracker::new(self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut backend: Option<RecommendedWatcher> = None;
        let mut retry_at = tokio::time::Instant::now();

        loop {
            if backend.is_none() && tokio::time::Instant::now() >= retry_at {
                match open_backend(&self.root, tx.clone()) {
                    Ok(watcher) => {
                        if self.backoff.attempts() > 0 {
                            info!(root = %self.root.display(), "Watcher backend recovered");
                        }
                        backend = Some(watcher);
                        self.backoff.reset();
                        self.status.set_degraded(None);
                    }
                    Err(e) => retry_at = self.backend_failed(e.to_string()),
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,

                Some(event) = rx.recv() => match event {
                    ChangeEvent::Touched(path) => self.track(&mut tracker, path),
                    ChangeEvent::Removed(path) => {
                        tracker.remove(&path);
                    }
                    ChangeEvent::BackendFailed(reason) => {
                        backend = None;
                        retry_at = self.backend_failed(reason);
                    }
                },

                _ = ticker.tick() => {
                    if backend.is_some() && !self.root.is_dir() {
                        backend = None;
                        retry_at = self.backend_failed(format!(
                            "root {} is no longer available",
                            self.root.display()
                        ));
                    }

                    let ready = tracker.poll(Instant::now(), file_size);
                    for (path, size) in ready {
                        if self.filter.accepts_size(size) {
                            self.submit(path);
                        } else {
                            debug!(path = %path.display(), size, "Below minimum size, ignored");
                        }
                    }
                }

                _ = tokio::time::sleep_until(retry_at), if backend.is_none() => {}
            }

            self.status.tracked.store(tracker.len(), Ordering::Relaxed);
        }

        drop(backend);
        debug!("Watcher loop exited");
    }

    fn track(&self, tracker: &mut StabilityTracker, path: PathBuf) {
        if path.is_dir() {
            // A folder moved in produces one event for the folder itself.
            for file in self.filter.collect(&path) {
                if !self.filter.in_ignored_folder(&self.root, &file) {
                    if let Some(size) = file_size(&file) {
                        tracker.touch(file, size, Instant::now());
                    }
                }
            }
            return;
        }

        if !self.filter.wants(&self.root, &path) {
            return;
        }
        if let Some(size) = file_size(&path) {
            tracker.touch(path, size, Instant::now());
        }
    }

    fn submit(&self, path: PathBuf) {
        let identity = self.queue.identity_for(std::slice::from_ref(&path));
        if let Some(task_id) = self.queue.active_for_identity(&identity) {
            debug!(path = %path.display(), task_id = %task_id, "Already active, not resubmitted");
            return;
        }

        let item = WorkItem::single(path.clone(), TriggerOrigin::Watch)
            .with_optional_preset(self.preset.clone());
        match self.queue.submit(item) {
            Ok(SubmitOutcome::Queued { task_id }) => {
                self.status.submitted.fetch_add(1, Ordering::Relaxed);
                info!(path = %path.display(), task_id = %task_id, "Stable file submitted");
            }
            Ok(outcome) => debug!(path = %path.display(), outcome = ?outcome, "Stable file not queued"),
            Err(QueueError::Closed) => debug!(path = %path.display(), "Queue closed, dropping stable file"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to submit stable file"),
        }
    }

    /// Record a backend failure and return when to retry.
    fn backend_failed(&mut self, reason: String) -> tokio::time::Instant {
        let delay = self.backoff.next_delay();
        metrics::WATCHER_ERRORS.inc();
        warn!(
            root = %self.root.display(),
            error = %reason,
            attempt = self.backoff.attempts(),
            retry_in_ms = delay.as_millis() as u64,
            "Watcher backend error, running degraded"
        );
        self.status.set_degraded(Some(reason));
        tokio::time::Instant::now() + delay
    }
}

fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path)
        .ok()
        .filter(|m| m.is_file())
        .map(|m| m.len())
}

fn open_backend(
    root: &Path,
    tx: mpsc::Sender<ChangeEvent>,
) -> Result<RecommendedWatcher, WatcherError> {
    if !root.is_dir() {
        return Err(WatcherError::Backend(format!(
            "root {} is not available",
            root.display()
        )));
    }

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let changes = match res {
            Ok(event) => translate(event),
            Err(e) => vec![ChangeEvent::BackendFailed(e.to_string())],
        };
        for change in changes {
            // Runs on the backend's own thread.
            if tx.blocking_send(change).is_err() {
                return;
            }
        }
    })
    .map_err(|e| WatcherError::Backend(e.to_string()))?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| WatcherError::Backend(e.to_string()))?;

    Ok(watcher)
}

/// Map a backend event onto change events.
pub fn translate(event: Event) -> Vec<ChangeEvent> {
    let make: fn(PathBuf) -> ChangeEvent = match event.kind {
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            ChangeEvent::Removed
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            return match (paths.next(), paths.next()) {
                (Some(from), Some(to)) => {
                    vec![ChangeEvent::Removed(from), ChangeEvent::Touched(to)]
                }
                (Some(only), None) => vec![ChangeEvent::Touched(only)],
                _ => Vec::new(),
            };
        }
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any => ChangeEvent::Touched,
        EventKind::Access(_) | EventKind::Other => return Vec::new(),
    };
    event.paths.into_iter().map(make).collect()
}
