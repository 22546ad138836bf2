//! Task queue and executor.
//!
//! All trigger sources propose [`WorkItem`](crate::task::WorkItem)s to the
//! [`TaskQueue`]. The queue owns the FIFO and the identity index under a
//! single lock, so the duplicate check and the insert are one step. The
//! [`TaskExecutor`] runs a bounded pool of workers that pull from the queue,
//! freeze the effective configuration, invoke the scrape core and record
//! the outcome in history.

mod alerts;
mod config;
mod executor;
mod journal;
mod probe;
#[allow(clippy::module_inception)]
mod queue;

pub use alerts::{Alert, AlertBoard, AlertKind};
pub use config::ExecutorConfig;
pub use executor::{ExecutorStatus, TaskExecutor};
pub use journal::{QueueJournal, SqliteQueueJournal};
pub use probe::{NoopProbe, ResourceProbe, WritableDirProbe};
pub use queue::{CancelOutcome, ClaimedTask, QueueCounts, TaskQueue};

use serde::Serialize;
use thiserror::Error;

use crate::rules::RuleError;
use crate::task::TaskId;

/// Errors raised by the task queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("work item has no source paths")]
    EmptyWorkItem,

    #[error("queue is not accepting work")]
    Closed,

    #[error(transparent)]
    Configuration(#[from] RuleError),

    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("task {0} cannot be cancelled")]
    NotCancellable(TaskId),

    #[error("journal error: {0}")]
    Journal(String),

    #[error("history error: {0}")]
    History(String),
}

/// Result of a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// A new task was queued.
    Queued { task_id: TaskId },
    /// A task for the same identity is already queued or running; this is
    /// its id. Nothing new was created.
    DuplicateActive { task_id: TaskId },
    /// The identity succeeded recently; a skipped task was recorded.
    Skipped { task_id: TaskId, reason: String },
}

impl SubmitOutcome {
    pub fn task_id(&self) -> &str {
        match self {
            SubmitOutcome::Queued { task_id }
            | SubmitOutcome::DuplicateActive { task_id }
            | SubmitOutcome::Skipped { task_id, .. } => task_id,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, SubmitOutcome::Queued { .. })
    }
}
