use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use curator_core::{queue::Alert, scheduler::SweepReport, EngineStatus, SanitizedConfig};

use super::error::{api_error, scheduler_error, ApiError};
use crate::metrics::{collect_dynamic_metrics, encode_metrics};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<SanitizedConfig> {
    Json(state.sanitized_config())
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<EngineStatus> {
    Json(state.engine().status())
}

/// Query parameters for listing alerts
#[derive(Debug, Deserialize)]
pub struct ListAlertsParams {
    /// Include cleared alerts
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<Alert>,
}

pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListAlertsParams>,
) -> Json<AlertsResponse> {
    let alerts = if params.all {
        state.engine().alerts.all()
    } else {
        state.engine().alerts.active()
    };
    Json(AlertsResponse { alerts })
}

#[derive(Debug, Serialize)]
pub struct ResumeResponse {
    /// Whether the pool was halted before this call
    pub resumed: bool,
    pub halted: bool,
}

/// Clear a resource-exhaustion halt
pub async fn resume_executor(State(state): State<Arc<AppState>>) -> Json<ResumeResponse> {
    let executor = &state.engine().executor;
    let resumed = executor.resume();
    Json(ResumeResponse {
        resumed,
        halted: executor.is_halted(),
    })
}

/// Run a sweep now
pub async fn trigger_sweep(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SweepReport>, ApiError> {
    let scheduler = state.engine().scheduler.clone().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Scheduler not enabled. Set [scheduler] enabled = true.",
        )
    })?;

    scheduler
        .trigger_now()
        .await
        .map(Json)
        .map_err(|e| scheduler_error(&e))
}

/// Prometheus text exposition
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    collect_dynamic_metrics(&state);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
