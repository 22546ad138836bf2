//! History storage trait and types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::queue::QueueError;
use crate::task::{Task, TaskId};

/// Error type for history operations.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history record not found: {0}")]
    NotFound(TaskId),

    #[error("task is still active: {0}")]
    TaskActive(TaskId),

    #[error("task {0} is not in a terminal state")]
    NotTerminal(TaskId),

    #[error("history record already exists: {0}")]
    Duplicate(TaskId),

    #[error("asset cleanup failed: {0}")]
    Cleanup(String),

    #[error("database error: {0}")]
    Database(String),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// A terminal task as persisted. Never mutated after append.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRecord {
    /// Insertion sequence number. Gaps are left by deletions.
    pub seq: i64,
    #[serde(flatten)]
    pub task: Task,
}

impl HistoryRecord {
    pub fn task_id(&self) -> &str {
        &self.task.id
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.task
            .state
            .summary()
            .and_then(|s| s.output_dir.as_deref())
    }
}

/// Filter for querying history.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Filter by state type.
    pub state: Option<String>,
    /// Finished at or after.
    pub from: Option<DateTime<Utc>>,
    /// Finished at or before.
    pub to: Option<DateTime<Utc>>,
    /// Filter by canonical identity.
    pub identity: Option<String>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl HistoryFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            limit: 100,
            ..Default::default()
        }
    }

    /// Filter by state type.
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Filter by completion time range.
    pub fn with_time_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    /// Filter by canonical identity.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Set limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Set offset.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for history storage backends.
///
/// Appends are atomic: a record and its log become visible together.
pub trait HistoryStore: Send + Sync {
    /// Append a terminal task with its log.
    fn append(&self, task: &Task, log: &[String]) -> Result<HistoryRecord, HistoryError>;

    /// Get a record by task ID.
    fn get(&self, task_id: &str) -> Result<Option<HistoryRecord>, HistoryError>;

    /// List records matching the filter, most recently completed first.
    fn list(&self, filter: &HistoryFilter) -> Result<Vec<HistoryRecord>, HistoryError>;

    /// Count records matching the filter (ignores limit/offset).
    fn count(&self, filter: &HistoryFilter) -> Result<i64, HistoryError>;

    /// Full log of a record.
    fn log(&self, task_id: &str) -> Result<Option<Vec<String>>, HistoryError>;

    /// Delete one record and its log. Returns the deleted record.
    fn delete(&self, task_id: &str) -> Result<HistoryRecord, HistoryError>;

    /// Completion time of the latest successful task for an identity.
    fn last_success(&self, identity: &str) -> Result<Option<DateTime<Utc>>, HistoryError>;

    /// Number of records whose result points at `output_dir`.
    fn count_output_refs(&self, output_dir: &Path) -> Result<i64, HistoryError>;
}
