use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::middleware::metrics_middleware;
use super::{fs, handlers, history, rules, tasks};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health, config and engine state
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/status", get(handlers::get_status))
        .route("/alerts", get(handlers::list_alerts))
        .route("/executor/resume", post(handlers::resume_executor))
        .route("/scheduler/sweep", post(handlers::trigger_sweep))
        // Active tasks
        .route("/tasks", post(tasks::submit).get(tasks::list_tasks))
        .route("/tasks/{id}", get(tasks::get_task))
        .route("/tasks/{id}/cancel", post(tasks::cancel_task))
        .route("/tasks/{id}/logs", get(tasks::get_logs))
        .route("/tasks/{id}/logstream", get(tasks::stream_logs))
        // History
        .route("/history", get(history::list_history))
        .route("/history/delete", post(history::delete_many))
        .route(
            "/history/{task_id}",
            get(history::get_record).delete(history::delete_record),
        )
        .route("/history/{task_id}/logs", get(history::get_record_logs))
        .route("/history/{task_id}/redo", post(history::redo))
        // Rules
        .route("/rules/global", get(rules::get_global).put(rules::put_global))
        .route("/rules/presets", get(rules::list_presets))
        .route(
            "/rules/presets/{name}",
            get(rules::get_preset)
                .put(rules::put_preset)
                .delete(rules::delete_preset),
        )
        // Media browser
        .route("/fs/browse", get(fs::browse));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
