//! The serialization point shared by all trigger sources.

use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ExecutorConfig, QueueError, QueueJournal, SubmitOutcome};
use crate::history::{HistoryRecord, HistoryStore};
use crate::metrics;
use crate::rules::{EffectiveConfig, RuleError, RuleResolver};
use crate::task::{
    canonical_identity, FailureKind, IdentityHint, Task, TaskFailure, TaskId, TaskLog,
    TaskState, WorkItem, ENGINE_PREFIX,
};

/// A queued or running task with its live log.
struct ActiveTask {
    task: Task,
    log: Arc<TaskLog>,
    cancel: CancellationToken,
    journal_id: Option<i64>,
    cancel_requested: bool,
}

struct QueueState {
    pending: VecDeque<TaskId>,
    tasks: HashMap<TaskId, ActiveTask>,
    by_identity: HashMap<String, TaskId>,
    accepting: bool,
}

/// A task handed to a worker.
pub struct ClaimedTask {
    pub task: Task,
    pub log: Arc<TaskLog>,
    pub cancel: CancellationToken,
}

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The task was queued and is now cancelled.
    Cancelled,
    /// The task is running; it ends as cancelled once the worker observes
    /// the request.
    Requested,
}

/// Queued and running task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub queued: usize,
    pub running: usize,
}

/// FIFO of accepted work plus the identity index, behind one lock.
pub struct TaskQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    resolver: RuleResolver,
    history: Arc<dyn HistoryStore>,
    journal: Arc<dyn QueueJournal>,
    identity_hint: Option<IdentityHint>,
    recency_window: Option<chrono::Duration>,
    log_line_limit: usize,
}

impl TaskQueue {
    pub fn new(
        resolver: RuleResolver,
        history: Arc<dyn HistoryStore>,
        journal: Arc<dyn QueueJournal>,
        config: &ExecutorConfig,
    ) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                tasks: HashMap::new(),
                by_identity: HashMap::new(),
                accepting: true,
            }),
            notify: Notify::new(),
            resolver,
            history,
            journal,
            identity_hint: None,
            recency_window: config
                .recency_window_secs
                .map(|secs| chrono::Duration::seconds(secs as i64)),
            log_line_limit: config.log_line_limit,
        }
    }

    /// Use an identifier extractor for canonical identities.
    pub fn with_identity_hint(mut self, hint: IdentityHint) -> Self {
        self.identity_hint = Some(hint);
        self
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn resolver(&self) -> &RuleResolver {
        &self.resolver
    }

    /// Canonical identity for a set of source paths.
    pub fn identity_for(&self, paths: &[PathBuf]) -> String {
        canonical_identity(paths, self.identity_hint.as_ref())
    }

    /// Propose a work item.
    ///
    /// Configuration errors are returned before anything is created. A
    /// duplicate of an active identity returns the existing task id. An
    /// identity that succeeded within the recency window is recorded as a
    /// skipped task unless the item is forced.
    pub fn submit(&self, item: WorkItem) -> Result<SubmitOutcome, QueueError> {
        if item.paths.is_empty() {
            return Err(QueueError::EmptyWorkItem);
        }
        if !self.is_accepting() {
            return Err(QueueError::Closed);
        }

        self.resolver.check(item.preset.as_deref())?;
        let identity = self.identity_for(&item.paths);

        if let Some(existing) = self.active_for_identity(&identity) {
            return Ok(self.duplicate(&item, &identity, existing));
        }

        if !item.force {
            if let Some(reason) = self.recent_success(&identity)? {
                return self.record_skip(&item, identity, reason);
            }
        }

        let journal_id = self.journal.append(&item)?;

        let mut state = self.lock();
        if !state.accepting {
            drop(state);
            self.forget_journal(journal_id);
            return Err(QueueError::Closed);
        }
        if let Some(existing) = state.by_identity.get(&identity).cloned() {
            drop(state);
            self.forget_journal(journal_id);
            return Ok(self.duplicate(&item, &identity, existing));
        }

        let task = Task::from_work_item(&item, identity.clone());
        let task_id = task.id.clone();
        let log = Arc::new(TaskLog::new(self.log_line_limit));
        log.engine(format!(
            "queued by {} trigger: {}",
            item.origin,
            task.display_name()
        ));

        state.by_identity.insert(identity.clone(), task_id.clone());
        state.pending.push_back(task_id.clone());
        state.tasks.insert(
            task_id.clone(),
            ActiveTask {
                task,
                log,
                cancel: CancellationToken::new(),
                journal_id: Some(journal_id),
                cancel_requested: false,
            },
        );
        let queued = state.pending.len();
        drop(state);

        self.notify.notify_one();
        metrics::TASKS_SUBMITTED
            .with_label_values(&[item.origin.as_str()])
            .inc();
        info!(
            task_id = %task_id,
            identity = %identity,
            origin = %item.origin,
            queued,
            "Task queued"
        );

        Ok(SubmitOutcome::Queued { task_id })
    }

    fn duplicate(&self, item: &WorkItem, identity: &str, existing: TaskId) -> SubmitOutcome {
        metrics::DUPLICATE_SUBMISSIONS
            .with_label_values(&[item.origin.as_str()])
            .inc();
        info!(
            task_id = %existing,
            identity = %identity,
            origin = %item.origin,
            "Duplicate submission for active task"
        );
        SubmitOutcome::DuplicateActive { task_id: existing }
    }

    /// Why `identity` counts as recently succeeded, if it does.
    pub fn recent_success(&self, identity: &str) -> Result<Option<String>, QueueError> {
        let Some(window) = self.recency_window else {
            return Ok(None);
        };
        let last = self
            .history
            .last_success(identity)
            .map_err(|e| QueueError::History(e.to_string()))?;

        Ok(last
            .filter(|at| Utc::now() - *at < window)
            .map(|at| format!("succeeded recently at {}", at.to_rfc3339())))
    }

    fn record_skip(
        &self,
        item: &WorkItem,
        identity: String,
        reason: String,
    ) -> Result<SubmitOutcome, QueueError> {
        let mut task = Task::from_work_item(item, identity);
        task.finish(TaskState::Skipped {
            reason: reason.clone(),
        });
        let line = format!("{} skipped: {}", ENGINE_PREFIX, reason);

        self.history
            .append(&task, &[line])
            .map_err(|e| QueueError::History(e.to_string()))?;

        metrics::TASKS_FINISHED.with_label_values(&["skipped"]).inc();
        info!(task_id = %task.id, identity = %task.identity, reason = %reason, "Task skipped");

        Ok(SubmitOutcome::Skipped {
            task_id: task.id,
            reason,
        })
    }

    /// Record an accepted item that can no longer run as a failed task.
    fn record_rejected(
        &self,
        item: &WorkItem,
        kind: FailureKind,
        reason: String,
    ) -> Result<TaskId, QueueError> {
        let mut task = Task::from_work_item(item, self.identity_for(&item.paths));
        task.finish(TaskState::Failed {
            failure: TaskFailure::new(kind, reason.clone()),
            summary: None,
        });
        let line = format!("{} failed: {}", ENGINE_PREFIX, reason);

        self.history
            .append(&task, &[line])
            .map_err(|e| QueueError::History(e.to_string()))?;

        metrics::TASKS_FINISHED.with_label_values(&["failed"]).inc();
        Ok(task.id)
    }

    fn forget_journal(&self, journal_id: i64) {
        if let Err(e) = self.journal.remove(journal_id) {
            warn!(journal_id, error = %e, "Failed to remove journal entry");
        }
    }

    /// Resubmit work journaled by a previous run. Returns how many items
    /// were requeued.
    pub fn restore(&self) -> Result<usize, QueueError> {
        let entries = self.journal.load()?;
        if entries.is_empty() {
            return Ok(0);
        }

        let live: HashSet<i64> = self
            .lock()
            .tasks
            .values()
            .filter_map(|e| e.journal_id)
            .collect();

        info!(count = entries.len(), "Restoring journaled work items");
        let mut restored = 0;
        for (journal_id, item) in entries {
            if live.contains(&journal_id) {
                continue;
            }
            let path = item.paths.first().cloned().unwrap_or_default();
            match self.submit(item.clone()) {
                Ok(outcome) => {
                    // A queued outcome journaled the item again under a new id.
                    self.forget_journal(journal_id);
                    if outcome.is_queued() {
                        restored += 1;
                    } else {
                        debug!(path = %path.display(), outcome = ?outcome, "Journaled item not requeued");
                    }
                }
                Err(QueueError::Configuration(RuleError::Unavailable(e))) => {
                    warn!(path = %path.display(), error = %e, "Rule store unavailable, journaled item kept");
                }
                Err(QueueError::Configuration(e)) => {
                    match self.record_rejected(&item, FailureKind::Configuration, e.to_string()) {
                        Ok(task_id) => {
                            self.forget_journal(journal_id);
                            warn!(task_id = %task_id, path = %path.display(), error = %e, "Journaled item failed on restore");
                        }
                        Err(err) => {
                            warn!(path = %path.display(), error = %err, "Failed to record rejected journaled item, kept");
                        }
                    }
                }
                Err(QueueError::EmptyWorkItem) => {
                    self.forget_journal(journal_id);
                    warn!(journal_id, "Dropped journaled item without source paths");
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to restore journaled item, kept");
                }
            }
        }
        Ok(restored)
    }

    /// Wait for the next queued task.
    pub async fn claim_next(&self) -> ClaimedTask {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                while let Some(id) = state.pending.pop_front() {
                    if let Some(entry) = state.tasks.get(&id) {
                        if entry.task.state == TaskState::Queued {
                            return ClaimedTask {
                                task: entry.task.clone(),
                                log: entry.log.clone(),
                                cancel: entry.cancel.clone(),
                            };
                        }
                    }
                }
            }

            notified.await;
        }
    }

    /// Put a claimed task back at the head of the queue.
    pub fn requeue_front(&self, task_id: &str) {
        let mut state = self.lock();
        let queued = state
            .tasks
            .get(task_id)
            .is_some_and(|e| e.task.state == TaskState::Queued);
        if queued && !state.pending.iter().any(|id| id == task_id) {
            state.pending.push_front(task_id.to_string());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Freeze the effective configuration and mark a claimed task running.
    /// Returns false if the task was cancelled in the meantime.
    pub fn mark_running(&self, task_id: &str, config: EffectiveConfig) -> bool {
        let mut state = self.lock();
        match state.tasks.get_mut(task_id) {
            Some(entry) if entry.task.state == TaskState::Queued => {
                entry.task.start(config);
                true
            }
            _ => false,
        }
    }

    /// Move an active task to a terminal state, append it to history and
    /// release its identity.
    pub fn finish(
        &self,
        task_id: &str,
        terminal: TaskState,
    ) -> Result<Option<HistoryRecord>, QueueError> {
        let (task, log, journal_id) = {
            let mut state = self.lock();
            let Some(entry) = state.tasks.get_mut(task_id) else {
                return Ok(None);
            };
            if entry.task.state.is_terminal() {
                return Ok(None);
            }
            entry.task.finish(terminal);
            (entry.task.clone(), entry.log.clone(), entry.journal_id)
        };

        log.engine(format!("finished: {}", describe(&task.state)));
        let lines = log.lines();
        log.close();

        // The identity stays claimed until the record is durable, so a
        // concurrent sweep sees either the active task or its record.
        let appended = self.history.append(&task, &lines);

        {
            let mut state = self.lock();
            state.tasks.remove(task_id);
            state.pending.retain(|id| id != task_id);
            if state.by_identity.get(&task.identity).map(String::as_str) == Some(task_id) {
                state.by_identity.remove(&task.identity);
            }
        }

        if let Some(journal_id) = journal_id {
            self.forget_journal(journal_id);
        }

        let state_type = task.state.state_type();
        metrics::TASKS_FINISHED.with_label_values(&[state_type]).inc();
        if let (Some(started), Some(finished)) = (task.started_at, task.finished_at) {
            let secs = (finished - started).num_milliseconds() as f64 / 1000.0;
            metrics::TASK_DURATION
                .with_label_values(&[state_type])
                .observe(secs);
        }

        match appended {
            Ok(record) => {
                info!(task_id = %task_id, state = state_type, "Task finished");
                Ok(Some(record))
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "Failed to record finished task");
                Err(QueueError::History(e.to_string()))
            }
        }
    }

    /// Cancel a queued or running task.
    pub fn cancel(&self, task_id: &str) -> Result<CancelOutcome, QueueError> {
        let mut state = self.lock();
        let entry = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| QueueError::NotFound(task_id.to_string()))?;

        match entry.task.state {
            TaskState::Queued => {
                drop(state);
                self.finish(
                    task_id,
                    TaskState::Cancelled {
                        reason: Some("cancelled before start".to_string()),
                    },
                )?;
                info!(task_id = %task_id, "Queued task cancelled");
                Ok(CancelOutcome::Cancelled)
            }
            TaskState::Running => {
                if !entry.cancel_requested {
                    entry.cancel_requested = true;
                    entry.cancel.cancel();
                    entry.log.engine("cancellation requested");
                    info!(task_id = %task_id, "Cancellation requested for running task");
                }
                Ok(CancelOutcome::Requested)
            }
            _ => Err(QueueError::NotCancellable(task_id.to_string())),
        }
    }

    /// Whether a cancel was requested while the task was running.
    pub fn is_cancel_requested(&self, task_id: &str) -> bool {
        self.lock()
            .tasks
            .get(task_id)
            .map(|e| e.cancel_requested)
            .unwrap_or(false)
    }

    /// Stop accepting submissions. Queued items stay journaled.
    pub fn close(&self) {
        self.lock().accepting = false;
        info!("Task queue closed to new submissions");
    }

    pub fn is_accepting(&self) -> bool {
        self.lock().accepting
    }

    /// Whether the task is queued or running.
    pub fn is_active(&self, task_id: &str) -> bool {
        self.lock().tasks.contains_key(task_id)
    }

    /// Active task id for an identity, if any.
    pub fn active_for_identity(&self, identity: &str) -> Option<TaskId> {
        self.lock().by_identity.get(identity).cloned()
    }

    /// Snapshot of one active task.
    pub fn active_task(&self, task_id: &str) -> Option<Task> {
        self.lock().tasks.get(task_id).map(|e| e.task.clone())
    }

    /// All active tasks: running first, then queued in FIFO order.
    pub fn active_tasks(&self) -> Vec<Task> {
        let state = self.lock();
        let mut running: Vec<Task> = state
            .tasks
            .values()
            .filter(|e| e.task.state == TaskState::Running)
            .map(|e| e.task.clone())
            .collect();
        running.sort_by_key(|t| t.started_at);

        let queued = state
            .pending
            .iter()
            .filter_map(|id| state.tasks.get(id))
            .filter(|e| e.task.state == TaskState::Queued)
            .map(|e| e.task.clone());

        running.extend(queued);
        running
    }

    /// Live log of an active task.
    pub fn task_log(&self, task_id: &str) -> Option<Arc<TaskLog>> {
        self.lock().tasks.get(task_id).map(|e| e.log.clone())
    }

    pub fn counts(&self) -> QueueCounts {
        let state = self.lock();
        state
            .tasks
            .values()
            .fold(QueueCounts::default(), |mut counts, e| {
                match e.task.state {
                    TaskState::Queued => counts.queued += 1,
                    TaskState::Running => counts.running += 1,
                    _ => {}
                }
                counts
            })
    }
}

fn describe(state: &TaskState) -> String {
    match state {
        TaskState::Failed { failure, .. } => {
            format!("failed ({}): {}", failure.kind.as_str(), failure.reason)
        }
        TaskState::Skipped { reason } => format!("skipped: {}", reason),
        TaskState::Cancelled {
            reason: Some(reason),
        } => format!("cancelled: {}", reason),
        other => other.state_type().to_string(),
    }
}
