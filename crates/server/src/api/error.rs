//! Mapping of engine errors to HTTP responses.

use axum::{http::StatusCode, Json};
use serde::Serialize;

use curator_core::{
    scheduler::SchedulerError, EngineError, HistoryError, QueueError, RuleError,
};

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

pub fn not_found(what: &str, id: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, format!("{} not found: {}", what, id))
}

pub fn rule_error(e: &RuleError) -> ApiError {
    let status = match e {
        RuleError::UnknownPreset(_) | RuleError::MalformedOverlay(_) => StatusCode::BAD_REQUEST,
        RuleError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    api_error(status, e.to_string())
}

pub fn queue_error(e: &QueueError) -> ApiError {
    let status = match e {
        QueueError::Configuration(rule) => return rule_error(rule),
        QueueError::EmptyWorkItem => StatusCode::BAD_REQUEST,
        QueueError::Closed => StatusCode::SERVICE_UNAVAILABLE,
        QueueError::NotFound(_) => StatusCode::NOT_FOUND,
        QueueError::NotCancellable(_) => StatusCode::CONFLICT,
        QueueError::Journal(_) | QueueError::History(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.to_string())
}

pub fn history_error(e: &HistoryError) -> ApiError {
    let status = match e {
        HistoryError::Queue(queue) => return queue_error(queue),
        HistoryError::NotFound(_) => StatusCode::NOT_FOUND,
        HistoryError::TaskActive(_) | HistoryError::NotTerminal(_) | HistoryError::Duplicate(_) => {
            StatusCode::CONFLICT
        }
        HistoryError::Cleanup(_) | HistoryError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, e.to_string())
}

pub fn scheduler_error(e: &SchedulerError) -> ApiError {
    let status = match e {
        SchedulerError::SweepInProgress => StatusCode::CONFLICT,
        SchedulerError::RootUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        SchedulerError::InvalidSchedule(_) | SchedulerError::Scan(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    api_error(status, e.to_string())
}

pub fn engine_error(e: &EngineError) -> ApiError {
    match e {
        EngineError::InvalidPath(_) => api_error(StatusCode::BAD_REQUEST, e.to_string()),
        EngineError::Rules(rule) => rule_error(rule),
        EngineError::Queue(queue) => queue_error(queue),
        EngineError::Scheduler(scheduler) => scheduler_error(scheduler),
        EngineError::Storage(_) | EngineError::Watcher(_) => {
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
