//! History API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use curator_core::{history::DeleteReport, DeleteMode, HistoryFilter, HistoryRecord};

use super::error::{api_error, history_error, ApiError};
use super::tasks::{LogResponse, SubmitResponse, TaskResponse};
use crate::state::AppState;

/// Maximum allowed limit for history queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for history queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing history
#[derive(Debug, Deserialize)]
pub struct ListHistoryParams {
    /// Filter by terminal state
    pub state: Option<String>,
    /// Finished at or after (RFC 3339)
    pub from: Option<DateTime<Utc>>,
    /// Finished at or before (RFC 3339)
    pub to: Option<DateTime<Utc>>,
    /// Filter by canonical identity
    pub identity: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// One history record
#[derive(Debug, Serialize)]
pub struct HistoryRecordResponse {
    pub seq: i64,
    #[serde(flatten)]
    pub task: TaskResponse,
}

impl From<HistoryRecord> for HistoryRecordResponse {
    fn from(record: HistoryRecord) -> Self {
        Self {
            seq: record.seq,
            task: TaskResponse::from(record.task),
        }
    }
}

/// Response for listing history
#[derive(Debug, Serialize)]
pub struct ListHistoryResponse {
    pub records: Vec<HistoryRecordResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Query parameters for deleting one record
#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub mode: DeleteMode,
}

/// Request body for bulk deletion
#[derive(Debug, Deserialize)]
pub struct BulkDeleteBody {
    pub task_ids: Vec<String>,
    #[serde(default)]
    pub mode: DeleteMode,
}

#[derive(Debug, Serialize)]
pub struct BulkDeleteFailure {
    pub task_id: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BulkDeleteResponse {
    pub deleted: Vec<DeleteReport>,
    pub failed: Vec<BulkDeleteFailure>,
}

// ============================================================================
// Handlers
// ============================================================================

/// List records in reverse completion order
pub async fn list_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListHistoryParams>,
) -> Result<Json<ListHistoryResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    if let (Some(from), Some(to)) = (params.from, params.to) {
        if from > to {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "'from' must not be after 'to'",
            ));
        }
    }

    let mut filter = HistoryFilter::new()
        .with_limit(limit)
        .with_offset(offset)
        .with_time_range(params.from, params.to);

    if let Some(ref state_filter) = params.state {
        filter = filter.with_state(state_filter);
    }

    if let Some(ref identity) = params.identity {
        filter = filter.with_identity(identity);
    }

    let (records, total) = state
        .engine()
        .history
        .list(&filter)
        .map_err(|e| history_error(&e))?;

    Ok(Json(ListHistoryResponse {
        records: records
            .into_iter()
            .map(HistoryRecordResponse::from)
            .collect(),
        total,
        limit,
        offset,
    }))
}

/// Get one record
pub async fn get_record(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<HistoryRecordResponse>, ApiError> {
    state
        .engine()
        .history
        .get(&task_id)
        .map(|record| Json(HistoryRecordResponse::from(record)))
        .map_err(|e| history_error(&e))
}

/// Stored log of one record
pub async fn get_record_logs(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<LogResponse>, ApiError> {
    state
        .engine()
        .history
        .log(&task_id)
        .map(|lines| {
            Json(LogResponse {
                task_id: task_id.clone(),
                lines,
                complete: true,
            })
        })
        .map_err(|e| history_error(&e))
}

/// Delete one record and/or its output
pub async fn delete_record(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<DeleteReport>, ApiError> {
    state
        .engine()
        .history
        .delete(&task_id, params.mode)
        .map(Json)
        .map_err(|e| history_error(&e))
}

/// Delete several records; each id succeeds or fails on its own
pub async fn delete_many(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BulkDeleteBody>,
) -> Result<Json<BulkDeleteResponse>, ApiError> {
    if body.task_ids.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "'task_ids' is empty"));
    }

    let mut response = BulkDeleteResponse {
        deleted: Vec::new(),
        failed: Vec::new(),
    };
    for (task_id, result) in state.engine().history.delete_many(&body.task_ids, body.mode) {
        match result {
            Ok(report) => response.deleted.push(report),
            Err(e) => response.failed.push(BulkDeleteFailure {
                task_id,
                error: e.to_string(),
            }),
        }
    }
    Ok(Json(response))
}

/// Resubmit a record's sources, bypassing recency suppression
pub async fn redo(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    state
        .engine()
        .history
        .redo(&task_id)
        .map(|outcome| (StatusCode::ACCEPTED, Json(SubmitResponse::from(vec![outcome]))))
        .map_err(|e| history_error(&e))
}
