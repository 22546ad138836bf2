//! Bounded worker pool draining the task queue.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{AlertBoard, AlertKind, ClaimedTask, ExecutorConfig, NoopProbe, ResourceProbe, TaskQueue};
use crate::metrics;
use crate::rules::RuleError;
use crate::scrape::{ScrapeCore, ScrapeError, ScrapeRequest, ScrapeSummary};
use crate::task::{FailureKind, TaskFailure, TaskState};

/// Executor status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutorStatus {
    pub running: bool,
    pub workers: usize,
    pub busy_workers: usize,
    pub halted: bool,
    pub queued: usize,
    pub running_tasks: usize,
}

/// How a scrape invocation ended, before classification.
enum RunOutcome {
    Completed(Result<ScrapeSummary, ScrapeError>),
    TimedOut,
    Interrupted,
}

/// Runs queued tasks on a fixed number of worker slots.
pub struct TaskExecutor {
    queue: Arc<TaskQueue>,
    scrape: Arc<dyn ScrapeCore>,
    alerts: Arc<AlertBoard>,
    probe: Arc<dyn ResourceProbe>,
    config: ExecutorConfig,

    // Runtime state
    running: Arc<AtomicBool>,
    busy: Arc<AtomicUsize>,
    halted: Arc<watch::Sender<bool>>,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

/// Shared state handed to each spawned worker.
#[derive(Clone)]
struct Worker {
    slot: usize,
    queue: Arc<TaskQueue>,
    scrape: Arc<dyn ScrapeCore>,
    alerts: Arc<AlertBoard>,
    busy: Arc<AtomicUsize>,
    halted: Arc<watch::Sender<bool>>,
    shutdown: CancellationToken,
    task_timeout: Duration,
}

impl TaskExecutor {
    pub fn new(
        queue: Arc<TaskQueue>,
        scrape: Arc<dyn ScrapeCore>,
        alerts: Arc<AlertBoard>,
        config: ExecutorConfig,
    ) -> Self {
        let (halted, _) = watch::channel(false);

        Self {
            queue,
            scrape,
            alerts,
            probe: Arc::new(NoopProbe),
            config,
            running: Arc::new(AtomicBool::new(false)),
            busy: Arc::new(AtomicUsize::new(0)),
            halted: Arc::new(halted),
            shutdown: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Probe consulted by the recovery loop while halted.
    pub fn with_probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn alerts(&self) -> &Arc<AlertBoard> {
        &self.alerts
    }

    /// Spawn the worker slots and the recovery loop.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Executor already running");
            return;
        }

        let workers = self.config.workers.max(1);
        info!(
            workers,
            scrape_core = self.scrape.name(),
            timeout_secs = self.config.task_timeout_secs,
            "Starting task executor"
        );

        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        for slot in 0..workers {
            let worker = Worker {
                slot,
                queue: self.queue.clone(),
                scrape: self.scrape.clone(),
                alerts: self.alerts.clone(),
                busy: self.busy.clone(),
                halted: self.halted.clone(),
                shutdown: self.shutdown.clone(),
                task_timeout: Duration::from_secs(self.config.task_timeout_secs),
            };
            handles.push(tokio::spawn(worker.run()));
        }
        handles.push(self.spawn_recovery_loop());
    }

    /// Stop accepting work, let running tasks finish within the grace
    /// period, then abort whatever is left. Unfinished tasks stay in the
    /// journal and are restored on the next start.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Executor not running");
            return;
        }

        info!("Stopping task executor");
        self.queue.close();
        self.shutdown.cancel();

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        let grace = Duration::from_secs(self.config.shutdown_grace_secs);
        if tokio::time::timeout(grace, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!(
                grace_secs = self.config.shutdown_grace_secs,
                "Running tasks did not finish within the grace period, aborting"
            );
            for abort in aborts {
                abort.abort();
            }
        }

        info!("Task executor stopped");
    }

    /// Clear a resource-exhaustion halt. Returns false if the pool was not
    /// halted.
    pub fn resume(&self) -> bool {
        let was_halted = self.halted.send_replace(false);
        let cleared = self.alerts.clear_kind(AlertKind::ResourceExhausted);
        if was_halted {
            info!(alerts_cleared = cleared, "Executor resumed");
        }
        was_halted
    }

    pub fn is_halted(&self) -> bool {
        *self.halted.borrow()
    }

    pub fn status(&self) -> ExecutorStatus {
        let counts = self.queue.counts();
        ExecutorStatus {
            running: self.running.load(Ordering::Relaxed),
            workers: self.config.workers.max(1),
            busy_workers: self.busy.load(Ordering::Relaxed),
            halted: self.is_halted(),
            queued: counts.queued,
            running_tasks: counts.running,
        }
    }

    fn spawn_recovery_loop(&self) -> JoinHandle<()> {
        let halted = self.halted.clone();
        let alerts = self.alerts.clone();
        let probe = self.probe.clone();
        let shutdown = self.shutdown.clone();
        let period = Duration::from_secs(self.config.recovery_check_interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if !*halted.borrow() {
                    continue;
                }

                match probe.check() {
                    Ok(()) => {
                        halted.send_replace(false);
                        alerts.clear_kind(AlertKind::ResourceExhausted);
                        info!("Resources available again, executor resumed");
                    }
                    Err(reason) => debug!(reason = %reason, "Executor still halted"),
                }
            }
        })
    }
}

impl Worker {
    async fn run(self) {
        debug!(slot = self.slot, "Worker started");
        let mut halted_rx = self.halted.subscribe();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                res = halted_rx.wait_for(|halted| !*halted) => {
                    if res.is_err() {
                        break;
                    }
                }
            }

            let claimed = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                claimed = self.queue.claim_next() => claimed,
            };

            // A halt raised while this slot waited for work.
            if *self.halted.borrow() {
                self.queue.requeue_front(&claimed.task.id);
                continue;
            }

            self.busy.fetch_add(1, Ordering::SeqCst);
            self.process(claimed).await;
            self.busy.fetch_sub(1, Ordering::SeqCst);
        }

        debug!(slot = self.slot, "Worker stopped");
    }

    async fn process(&self, claimed: ClaimedTask) {
        let task_id = claimed.task.id.clone();
        let log = claimed.log.clone();

        let config = match self
            .queue
            .resolver()
            .resolve_for_task(claimed.task.preset.as_deref(), &claimed.task.paths)
        {
            Ok(config) => config,
            Err(e) => {
                if let RuleError::Unavailable(ref reason) = e {
                    self.alerts
                        .raise(AlertKind::ConfigurationUnavailable, reason.clone());
                }
                warn!(task_id = %task_id, error = %e, "Configuration resolution failed");
                self.finish(
                    &task_id,
                    TaskState::Failed {
                        failure: TaskFailure::new(FailureKind::Configuration, e.to_string()),
                        summary: None,
                    },
                );
                return;
            }
        };

        let digest = config.digest();
        if !self.queue.mark_running(&task_id, config.clone()) {
            debug!(task_id = %task_id, "Task cancelled before start");
            return;
        }
        self.alerts.clear_kind(AlertKind::ConfigurationUnavailable);

        log.engine(format!(
            "started on worker {} with config {}",
            self.slot,
            &digest[..12.min(digest.len())]
        ));
        info!(
            task_id = %task_id,
            identity = %claimed.task.identity,
            slot = self.slot,
            "Task started"
        );

        let request = ScrapeRequest {
            task_id: task_id.clone(),
            paths: claimed.task.paths.clone(),
            config,
        };
        let outcome = self.run_scrape(request, &claimed).await;
        let state = self.classify(&task_id, outcome);
        self.finish(&task_id, state);
    }

    async fn run_scrape(&self, request: ScrapeRequest, claimed: &ClaimedTask) -> RunOutcome {
        let run = tokio::time::timeout(
            self.task_timeout,
            self.scrape.run(request, claimed.log.clone()),
        );

        let result = if self.scrape.supports_interrupt() {
            tokio::select! {
                result = run => result,
                _ = claimed.cancel.cancelled() => return RunOutcome::Interrupted,
            }
        } else {
            run.await
        };

        match result {
            Ok(result) => RunOutcome::Completed(result),
            Err(_) => RunOutcome::TimedOut,
        }
    }

    fn classify(&self, task_id: &str, outcome: RunOutcome) -> TaskState {
        if self.queue.is_cancel_requested(task_id) {
            if let RunOutcome::Completed(Ok(_)) = outcome {
                debug!(task_id = %task_id, "Discarding result of cancelled task");
            }
            return TaskState::Cancelled {
                reason: Some("cancelled while running".to_string()),
            };
        }

        match outcome {
            RunOutcome::Interrupted | RunOutcome::Completed(Err(ScrapeError::Interrupted)) => {
                TaskState::Cancelled {
                    reason: Some("interrupted".to_string()),
                }
            }
            RunOutcome::TimedOut => failed(
                FailureKind::Timeout,
                format!("timed out after {}s", self.task_timeout.as_secs()),
            ),
            RunOutcome::Completed(Ok(summary)) => match summary.asset_failure_reason() {
                Some(reason) => TaskState::Failed {
                    failure: TaskFailure::new(FailureKind::Domain, reason),
                    summary: Some(summary),
                },
                None => TaskState::Succeeded { summary },
            },
            RunOutcome::Completed(Err(ScrapeError::ResourceExhausted(reason))) => {
                self.halt(task_id, &reason);
                failed(FailureKind::ResourceExhausted, reason)
            }
            RunOutcome::Completed(Err(e)) if e.is_recoverable() => {
                failed(FailureKind::Domain, e.to_string())
            }
            RunOutcome::Completed(Err(e)) => {
                error!(task_id = %task_id, error = %e, "Unrecoverable scrape error");
                self.alerts
                    .raise(AlertKind::ScrapeFatal, format!("task {}: {}", task_id, e));
                failed(FailureKind::Fatal, e.to_string())
            }
        }
    }

    fn halt(&self, task_id: &str, reason: &str) {
        if !self.halted.send_replace(true) {
            metrics::EXECUTOR_HALTS.inc();
        }
        self.alerts.raise(
            AlertKind::ResourceExhausted,
            format!("task {}: {}", task_id, reason),
        );
        error!(task_id = %task_id, reason = %reason, "Resources exhausted, executor halted");
    }

    fn finish(&self, task_id: &str, state: TaskState) {
        match self.queue.finish(task_id, state) {
            Ok(_) => {
                if self.alerts.has_active(AlertKind::HistoryStore) {
                    self.alerts.clear_kind(AlertKind::HistoryStore);
                }
            }
            Err(e) => {
                self.alerts.raise(AlertKind::HistoryStore, e.to_string());
            }
        }
    }
}

fn failed(kind: FailureKind, reason: impl Into<String>) -> TaskState {
    TaskState::Failed {
        failure: TaskFailure::new(kind, reason),
        summary: None,
    }
}
