//! Core task data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::rules::EffectiveConfig;
use crate::scrape::ScrapeSummary;

/// Task identifier (UUID v4 string).
pub type TaskId = String;

/// Which trigger source proposed a piece of work.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOrigin {
    Manual,
    Watch,
    Schedule,
}

impl TriggerOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerOrigin::Manual => "manual",
            TriggerOrigin::Watch => "watch",
            TriggerOrigin::Schedule => "schedule",
        }
    }
}

impl std::fmt::Display for TriggerOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested unit of work, proposed by a trigger source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkItem {
    /// Source file(s). More than one path means a combined title.
    pub paths: Vec<PathBuf>,
    /// Rule preset name; `None` means the global rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    pub origin: TriggerOrigin,
    pub submitted_at: DateTime<Utc>,
    /// Bypass recency suppression (redo).
    #[serde(default)]
    pub force: bool,
}

impl WorkItem {
    pub fn new(paths: Vec<PathBuf>, origin: TriggerOrigin) -> Self {
        Self {
            paths,
            preset: None,
            origin,
            submitted_at: Utc::now(),
            force: false,
        }
    }

    pub fn single(path: impl Into<PathBuf>, origin: TriggerOrigin) -> Self {
        Self::new(vec![path.into()], origin)
    }

    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = Some(preset.into());
        self
    }

    pub fn with_optional_preset(mut self, preset: Option<String>) -> Self {
        self.preset = preset;
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Why a task failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No match, partial asset failure and other recognized scrape outcomes.
    Domain,
    /// Unrecoverable scrape error (also raised as an alert).
    Fatal,
    /// Disk, memory or handle limits (halts the worker pool).
    ResourceExhausted,
    /// The task exceeded its wall-clock budget.
    Timeout,
    /// The preset or rule store could not be resolved at dequeue.
    Configuration,
    /// The engine itself failed around the task.
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Domain => "domain",
            FailureKind::Fatal => "fatal",
            FailureKind::ResourceExhausted => "resource_exhausted",
            FailureKind::Timeout => "timeout",
            FailureKind::Configuration => "configuration",
            FailureKind::Internal => "internal",
        }
    }
}

/// Failure details recorded on a failed task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

/// Task state machine.
///
/// ```text
/// Queued ──▶ Running ──▶ Succeeded | Failed | Cancelled
///    │
///    └────▶ Cancelled | Failed (configuration)
/// (created) ──▶ Skipped
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running,
    Succeeded {
        summary: ScrapeSummary,
    },
    Failed {
        failure: TaskFailure,
        /// Whatever the scrape core reported before failing.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<ScrapeSummary>,
    },
    Skipped {
        reason: String,
    },
    Cancelled {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl TaskState {
    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Queued | TaskState::Running)
    }

    /// Returns true if the task can be cancelled from this state.
    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns the state type as a string (for filtering).
    pub fn state_type(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Succeeded { .. } => "succeeded",
            TaskState::Failed { .. } => "failed",
            TaskState::Skipped { .. } => "skipped",
            TaskState::Cancelled { .. } => "cancelled",
        }
    }

    pub fn summary(&self) -> Option<&ScrapeSummary> {
        match self {
            TaskState::Succeeded { summary } => Some(summary),
            TaskState::Failed { summary, .. } => summary.as_ref(),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&TaskFailure> {
        match self {
            TaskState::Failed { failure, .. } => Some(failure),
            _ => None,
        }
    }
}

/// A unit of execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub paths: Vec<PathBuf>,
    /// Canonical identity used for deduplication.
    pub identity: String,
    pub origin: TriggerOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(default)]
    pub force: bool,
    pub state: TaskState,
    /// Effective configuration, frozen when the task is dequeued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<EffectiveConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_digest: Option<String>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a queued task from an accepted work item.
    pub fn from_work_item(item: &WorkItem, identity: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            paths: item.paths.clone(),
            identity,
            origin: item.origin,
            preset: item.preset.clone(),
            force: item.force,
            state: TaskState::Queued,
            config: None,
            config_digest: None,
            submitted_at: item.submitted_at,
            started_at: None,
            finished_at: None,
        }
    }

    /// Freeze the effective configuration and mark the task running.
    pub fn start(&mut self, config: EffectiveConfig) {
        self.config_digest = Some(config.digest());
        self.config = Some(config);
        self.state = TaskState::Running;
        self.started_at = Some(Utc::now());
    }

    /// Move to a terminal state.
    pub fn finish(&mut self, state: TaskState) {
        debug_assert!(state.is_terminal());
        self.state = state;
        self.finished_at = Some(Utc::now());
    }

    /// File name of the first source path, for display.
    pub fn display_name(&self) -> String {
        self.paths
            .first()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id.clone())
    }
}
