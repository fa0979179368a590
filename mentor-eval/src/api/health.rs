//! Liveness probe for the evaluation service

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the session database does not answer
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub database_reachable: bool,
    /// Sessions currently held by a process or restart run
    pub active_runs: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = Utc::now()
        .signed_duration_since(state.startup_time)
        .num_seconds()
        .max(0) as u64;

    let database_reachable = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();
    if !database_reachable {
        tracing::warn!("Health check could not reach the session database");
    }

    Json(HealthResponse {
        status: if database_reachable { "ok" } else { "degraded" },
        module: "mentor-eval",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds,
        database_reachable,
        active_runs: state.orchestrator.active_runs(),
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
