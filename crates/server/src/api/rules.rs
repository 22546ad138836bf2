//! Rule preset API handlers. Writes go straight to the rule store; running
//! tasks keep the configuration they were started with.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

use curator_core::rules::RulePreset;

use super::error::{not_found, rule_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ListPresetsResponse {
    pub presets: Vec<RulePreset>,
}

/// The global rule document
pub async fn get_global(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Map<String, Value>>, ApiError> {
    state.rules().global().map(Json).map_err(|e| rule_error(&e))
}

/// Deep-merge the body onto the global document. Running tasks keep their
/// snapshot; the merge applies to tasks started afterwards.
pub async fn put_global(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<Value>,
) -> Result<Json<Map<String, Value>>, ApiError> {
    let merged = state
        .rules()
        .update_global(patch)
        .map_err(|e| rule_error(&e))?;
    info!(keys = merged.len(), "Global rules saved");
    Ok(Json(merged))
}

/// All presets, sorted by name
pub async fn list_presets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListPresetsResponse>, ApiError> {
    let presets = state.rules().presets().map_err(|e| rule_error(&e))?;
    Ok(Json(ListPresetsResponse {
        presets: presets
            .into_iter()
            .map(|(name, overlay)| RulePreset { name, overlay })
            .collect(),
    }))
}

pub async fn get_preset(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<RulePreset>, ApiError> {
    match state.rules().preset(&name) {
        Ok(Some(preset)) => Ok(Json(preset)),
        Ok(None) => Err(not_found("Preset", &name)),
        Err(e) => Err(rule_error(&e)),
    }
}

/// Create or replace a preset. The body is the overlay object.
pub async fn put_preset(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(overlay): Json<Value>,
) -> Result<Json<RulePreset>, ApiError> {
    let preset = state
        .rules()
        .upsert_preset(&name, overlay)
        .map_err(|e| rule_error(&e))?;
    info!(preset = %preset.name, "Preset saved");
    Ok(Json(preset))
}

pub async fn delete_preset(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    match state.rules().delete_preset(&name) {
        Ok(true) => {
            info!(preset = %name, "Preset deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(false) => Err(not_found("Preset", &name)),
        Err(e) => Err(rule_error(&e)),
    }
}
