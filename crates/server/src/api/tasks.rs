//! Active task API handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use curator_core::{
    queue::CancelOutcome, task::LogEvent, EffectiveConfig, ManualReport, ManualSubmission,
    RejectedItem, SubmitOutcome, Task, TaskState, TriggerOrigin,
};

use super::error::{api_error, engine_error, history_error, not_found, queue_error, ApiError};
use crate::metrics::{LOG_STREAMS_TOTAL, LOG_STREAM_LAGGED_LINES};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting work
#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    /// One file or directory
    pub path: Option<String>,
    /// Several files forming one title
    pub paths: Option<Vec<String>>,
    /// Rule preset name
    pub preset: Option<String>,
    /// Bypass recency suppression
    #[serde(default)]
    pub force: bool,
}

/// Response for a submission
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub outcomes: Vec<SubmitOutcome>,
    /// How many outcomes created a new task
    pub queued: usize,
    /// Items the queue refused
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<RejectedItem>,
}

impl From<Vec<SubmitOutcome>> for SubmitResponse {
    fn from(outcomes: Vec<SubmitOutcome>) -> Self {
        let queued = outcomes.iter().filter(|o| o.is_queued()).count();
        Self {
            outcomes,
            queued,
            rejected: Vec::new(),
        }
    }
}

impl From<ManualReport> for SubmitResponse {
    fn from(report: ManualReport) -> Self {
        let queued = report.queued();
        Self {
            outcomes: report.outcomes,
            queued,
            rejected: report.rejected,
        }
    }
}

/// Response for task operations
#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: String,
    pub paths: Vec<PathBuf>,
    pub identity: String,
    pub origin: TriggerOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    pub force: bool,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<EffectiveConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_digest: Option<String>,
    pub submitted_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            paths: task.paths,
            identity: task.identity,
            origin: task.origin,
            preset: task.preset,
            force: task.force,
            state: task.state,
            config: task.config,
            config_digest: task.config_digest,
            submitted_at: task.submitted_at.to_rfc3339(),
            started_at: task.started_at.map(|t| t.to_rfc3339()),
            finished_at: task.finished_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Response for listing active tasks
#[derive(Debug, Serialize)]
pub struct ListTasksResponse {
    /// Running tasks by start time, then queued tasks in FIFO order
    pub tasks: Vec<TaskResponse>,
    pub queued: usize,
    pub running: usize,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub task_id: String,
    pub outcome: CancelOutcome,
}

/// Response for log fetches
#[derive(Debug, Serialize)]
pub struct LogResponse {
    pub task_id: String,
    pub lines: Vec<String>,
    /// True once the task is terminal and no more lines follow
    pub complete: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit files or a directory
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let mut paths: Vec<PathBuf> = body.path.into_iter().map(PathBuf::from).collect();
    paths.extend(body.paths.unwrap_or_default().into_iter().map(PathBuf::from));
    if paths.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Either 'path' or 'paths' is required",
        ));
    }

    let submission = ManualSubmission {
        paths,
        preset: body.preset,
        force: body.force,
    };

    state
        .engine()
        .submit_manual(submission)
        .await
        .map(|report| (StatusCode::ACCEPTED, Json(SubmitResponse::from(report))))
        .map_err(|e| engine_error(&e))
}

/// List queued and running tasks
pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<ListTasksResponse> {
    let queue = &state.engine().queue;
    let counts = queue.counts();
    Json(ListTasksResponse {
        tasks: queue
            .active_tasks()
            .into_iter()
            .map(TaskResponse::from)
            .collect(),
        queued: counts.queued,
        running: counts.running,
    })
}

/// Get a task by ID. Terminal tasks are served from history.
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskResponse>, ApiError> {
    if let Some(task) = state.engine().queue.active_task(&id) {
        return Ok(Json(TaskResponse::from(task)));
    }

    match state.engine().history.get(&id) {
        Ok(record) => Ok(Json(TaskResponse::from(record.task))),
        Err(curator_core::HistoryError::NotFound(_)) => Err(not_found("Task", &id)),
        Err(e) => Err(history_error(&e)),
    }
}

/// Cancel a queued or running task
pub async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    state
        .engine()
        .queue
        .cancel(&id)
        .map(|outcome| {
            Json(CancelResponse {
                task_id: id.clone(),
                outcome,
            })
        })
        .map_err(|e| queue_error(&e))
}

/// Full log of a task, live or from history
pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<LogResponse>, ApiError> {
    if let Some(log) = state.engine().queue.task_log(&id) {
        return Ok(Json(LogResponse {
            task_id: id,
            lines: log.lines(),
            complete: false,
        }));
    }

    match state.engine().history.log(&id) {
        Ok(lines) => Ok(Json(LogResponse {
            task_id: id,
            lines,
            complete: true,
        })),
        Err(curator_core::HistoryError::NotFound(_)) => Err(not_found("Task", &id)),
        Err(e) => Err(history_error(&e)),
    }
}

enum StreamPhase {
    Live(broadcast::Receiver<LogEvent>),
    Ending,
    Done,
}

/// Stream a task's log as server-sent events.
///
/// Retained lines are sent first, then new lines as they arrive. An `end`
/// event follows once the task is terminal. Finished tasks replay their
/// stored log and end immediately.
pub async fn stream_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let (backlog, phase) = match state.engine().queue.task_log(&id) {
        Some(log) => {
            let (lines, rx, closed) = log.subscribe();
            let phase = if closed {
                StreamPhase::Ending
            } else {
                StreamPhase::Live(rx)
            };
            (lines, phase)
        }
        None => match state.engine().history.log(&id) {
            Ok(lines) => (lines, StreamPhase::Ending),
            Err(curator_core::HistoryError::NotFound(_)) => return Err(not_found("Task", &id)),
            Err(e) => return Err(history_error(&e)),
        },
    };

    LOG_STREAMS_TOTAL.inc();
    debug!(task_id = %id, backlog = backlog.len(), "Log stream opened");

    let replay = stream::iter(backlog.into_iter().map(|line| Ok(line_event(&line))));
    let live = stream::unfold(phase, |phase| async move {
        match phase {
            StreamPhase::Done => None,
            StreamPhase::Ending => Some((Ok(end_event()), StreamPhase::Done)),
            StreamPhase::Live(mut rx) => match rx.recv().await {
                Ok(LogEvent::Line(line)) => Some((Ok(line_event(&line)), StreamPhase::Live(rx))),
                Ok(LogEvent::Closed) | Err(RecvError::Closed) => {
                    Some((Ok(end_event()), StreamPhase::Done))
                }
                Err(RecvError::Lagged(skipped)) => {
                    LOG_STREAM_LAGGED_LINES.inc_by(skipped);
                    let event = Event::default()
                        .event("lagged")
                        .data(skipped.to_string());
                    Some((Ok(event), StreamPhase::Live(rx)))
                }
            },
        }
    });

    Ok(Sse::new(replay.chain(live)).keep_alive(KeepAlive::default()))
}

fn line_event(line: &str) -> Event {
    // SSE fields cannot carry carriage returns.
    Event::default().event("line").data(line.replace('\r', ""))
}

fn end_event() -> Event {
    Event::default().event("end").data("complete")
}
