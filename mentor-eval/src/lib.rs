//! mentor-eval library interface
//!
//! Multimodal evaluation of recorded teaching sessions: a resumable stage
//! orchestrator drives each recording through transcription, audio, visual
//! and text analysis, then fuses the modality scores into a graded mentor
//! score with a confidence envelope and a narrative report.

pub mod api;
pub mod collaborators;
pub mod db;
pub mod error;
pub mod features;
pub mod models;
pub mod scoring;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use mentor_common::events::EventBus;
use services::{ResultCache, StageOrchestrator};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub orchestrator: StageOrchestrator,
    pub cache: ResultCache,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, cache: ResultCache, orchestrator: StageOrchestrator) -> Self {
        Self {
            db,
            event_bus,
            orchestrator,
            cache,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::session_routes())
        .merge(api::rubric_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
