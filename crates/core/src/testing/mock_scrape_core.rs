//! Mock scrape core for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::rules::EffectiveConfig;
use crate::scrape::{ScrapeCore, ScrapeError, ScrapeRequest, ScrapeSummary};
use crate::task::{TaskId, TaskLog};

/// A recorded scrape run for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedRun {
    pub task_id: TaskId,
    pub paths: Vec<PathBuf>,
    /// The effective configuration the run was handed.
    pub config: EffectiveConfig,
}

/// Mock implementation of the ScrapeCore trait.
///
/// Provides controllable behavior for testing:
/// - Simulated run duration, or runs that never finish
/// - Scripted failures consumed one per run
/// - Optional interrupt support
/// - Recorded runs with their configuration snapshots
///
/// # Example
///
/// ```rust,ignore
/// use curator_core::testing::MockScrapeCore;
///
/// let core = MockScrapeCore::new();
/// core.push_failure(ScrapeError::NoMatch("ABC-123".into())).await;
///
/// // ... run tasks through the executor ...
///
/// let runs = core.recorded_runs().await;
/// assert_eq!(runs.len(), 1);
/// ```
#[derive(Debug)]
pub struct MockScrapeCore {
    /// Recorded runs, in start order.
    runs: Arc<RwLock<Vec<RecordedRun>>>,
    /// Failures returned by the next runs, one per run.
    failures: Arc<RwLock<VecDeque<ScrapeError>>>,
    /// Summary returned by successful runs.
    summary: Arc<RwLock<Option<ScrapeSummary>>>,
    /// Lines written to the task log during each run.
    output_lines: Arc<RwLock<Vec<String>>>,
    /// Simulated run duration in milliseconds.
    run_duration_ms: Arc<RwLock<u64>>,
    /// Runs never finish on their own.
    hang: Arc<AtomicBool>,
    /// The next this-many runs never finish on their own.
    hang_next: Arc<AtomicUsize>,
    interruptible: Arc<AtomicBool>,
    identify_stems: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl Default for MockScrapeCore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockScrapeCore {
    /// Create a new mock scrape core.
    pub fn new() -> Self {
        Self {
            runs: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(RwLock::new(VecDeque::new())),
            summary: Arc::new(RwLock::new(None)),
            output_lines: Arc::new(RwLock::new(vec!["scraping".to_string()])),
            run_duration_ms: Arc::new(RwLock::new(10)),
            hang: Arc::new(AtomicBool::new(false)),
            hang_next: Arc::new(AtomicUsize::new(0)),
            interruptible: Arc::new(AtomicBool::new(false)),
            identify_stems: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get all recorded runs.
    pub async fn recorded_runs(&self) -> Vec<RecordedRun> {
        self.runs.read().await.clone()
    }

    /// Get the number of runs started.
    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Queue a failure for the next run.
    pub async fn push_failure(&self, error: ScrapeError) {
        self.failures.write().await.push_back(error);
    }

    /// Set the summary returned by successful runs.
    pub async fn set_summary(&self, summary: ScrapeSummary) {
        *self.summary.write().await = Some(summary);
    }

    /// Set the lines each run writes to its log.
    pub async fn set_output_lines(&self, lines: Vec<String>) {
        *self.output_lines.write().await = lines;
    }

    /// Set the simulated run duration.
    pub async fn set_run_duration(&self, duration: Duration) {
        *self.run_duration_ms.write().await = duration.as_millis() as u64;
    }

    /// Make runs block until dropped or interrupted.
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    /// Make only the next `runs` runs block.
    pub fn hang_next(&self, runs: usize) {
        self.hang_next.store(runs, Ordering::SeqCst);
    }

    pub fn set_interruptible(&self, interruptible: bool) {
        self.interruptible.store(interruptible, Ordering::SeqCst);
    }

    /// Derive identifiers from file stems (text before the first dot).
    pub fn set_identify_stems(&self, enabled: bool) {
        self.identify_stems.store(enabled, Ordering::SeqCst);
    }

    /// Number of runs in progress right now.
    pub fn active_runs(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous runs observed.
    pub fn max_concurrent_runs(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

/// Decrements the active-run counter when a run ends or is dropped.
struct ActiveRun(Arc<AtomicUsize>);

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ScrapeCore for MockScrapeCore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(
        &self,
        request: ScrapeRequest,
        log: Arc<TaskLog>,
    ) -> Result<ScrapeSummary, ScrapeError> {
        let hang = self.hang.load(Ordering::SeqCst)
            || self
                .hang_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        let _active = ActiveRun(self.active.clone());

        self.runs.write().await.push(RecordedRun {
            task_id: request.task_id.clone(),
            paths: request.paths.clone(),
            config: request.config.clone(),
        });

        for line in self.output_lines.read().await.iter() {
            log.push(line.clone());
        }

        if hang {
            std::future::pending::<()>().await;
        }

        let duration = *self.run_duration_ms.read().await;
        if duration > 0 {
            tokio::time::sleep(Duration::from_millis(duration)).await;
        }

        if let Some(error) = self.failures.write().await.pop_front() {
            return Err(error);
        }

        let summary = self.summary.read().await.clone();
        Ok(summary.unwrap_or_else(|| ScrapeSummary {
            identifier: request
                .paths
                .first()
                .and_then(|p| p.file_stem())
                .map(|s| s.to_string_lossy().into_owned()),
            ..Default::default()
        }))
    }

    fn supports_interrupt(&self) -> bool {
        self.interruptible.load(Ordering::SeqCst)
    }

    fn identify(&self, paths: &[PathBuf]) -> Option<String> {
        if !self.identify_stems.load(Ordering::SeqCst) {
            return None;
        }
        let stem = paths.iter().min()?.file_name()?.to_string_lossy().into_owned();
        stem.split('.').next().map(str::to_string)
    }
}
