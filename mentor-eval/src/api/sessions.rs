//! Session API handlers
//!
//! **[ME-API-020]** POST /sessions, POST /sessions/{id}/process,
//! POST /sessions/{id}/restart, GET /sessions/{id}/status,
//! GET /sessions/{id}/result

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::{Session, SessionStatus, Stage};
use crate::scoring::aggregator::interpret;
use crate::scoring::Subject;
use crate::services::result_cache::{results_key, status_key};
use crate::AppState;

/// POST /sessions request
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Recording file name inside the uploads directory
    pub filename: String,
    #[serde(default)]
    pub subject: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
}

/// Response of the process and restart triggers
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub session_id: Uuid,
    pub status: String,
}

/// GET /sessions/{id}/status response
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub stages_completed: Vec<Stage>,
    pub last_successful_stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True while a pipeline run holds the session
    pub running: bool,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl SessionStatusResponse {
    fn from_session(session: &Session, running: bool) -> Self {
        Self {
            session_id: session.id,
            status: session.status,
            stages_completed: session.stages_completed.clone(),
            last_successful_stage: session.last_successful_stage,
            error: session.error_message().map(str::to_string),
            running,
            updated_at: session.updated_at,
        }
    }
}

async fn require_session(state: &AppState, session_id: Uuid) -> ApiResult<Session> {
    db::sessions::load_session(&state.db, session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Session not found: {}", session_id)))
}

/// POST /sessions
///
/// Registers a recording already present in the uploads directory.
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<CreateSessionResponse>)> {
    let filename = request.filename.trim();
    let is_bare_name = std::path::Path::new(filename)
        .file_name()
        .map(|name| name == filename)
        .unwrap_or(false);
    if filename.is_empty() || !is_bare_name {
        return Err(ApiError::BadRequest(format!("Invalid filename: {:?}", request.filename)));
    }

    if let Some(subject) = &request.subject {
        subject.parse::<Subject>()?;
    }

    let session = db::sessions::create_session(&state.db, filename, request.subject).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.id,
            status: session.status,
        }),
    ))
}

/// POST /sessions/{id}/process
///
/// Returns 202 and runs the pipeline in the background.
pub async fn process_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
    let session = require_session(&state, session_id).await?;

    match session.status {
        SessionStatus::Complete => {
            return Ok((
                StatusCode::OK,
                Json(TriggerResponse {
                    session_id,
                    status: "already_complete".to_string(),
                }),
            ));
        }
        SessionStatus::Failed => {
            return Err(ApiError::Conflict(format!(
                "Session {} failed; restart required",
                session_id
            )));
        }
        _ => {}
    }

    let guard = state
        .orchestrator
        .try_lock(session_id)
        .ok_or_else(|| ApiError::Conflict(format!("Session {} is already being processed", session_id)))?;

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        tracing::info!(session_id = %session_id, "Background pipeline task started");
        match orchestrator.process_locked(&guard).await {
            Ok(outcome) => tracing::info!(
                session_id = %session_id,
                status = %outcome.status,
                "Background pipeline task finished"
            ),
            Err(e) => tracing::error!(session_id = %session_id, error = %e, "Background pipeline task failed"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            session_id,
            status: "processing".to_string(),
        }),
    ))
}

/// POST /sessions/{id}/restart
///
/// Wipes all artifacts, then reruns the pipeline in the background.
pub async fn restart_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
    require_session(&state, session_id).await?;

    let guard = state
        .orchestrator
        .try_lock(session_id)
        .ok_or_else(|| ApiError::Conflict(format!("Session {} is already being processed", session_id)))?;

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        tracing::info!(session_id = %session_id, "Background restart task started");
        match orchestrator.restart_locked(&guard).await {
            Ok(outcome) => tracing::info!(
                session_id = %session_id,
                status = %outcome.status,
                "Background restart task finished"
            ),
            Err(e) => tracing::error!(session_id = %session_id, error = %e, "Background restart task failed"),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            session_id,
            status: "restarting".to_string(),
        }),
    ))
}

/// GET /sessions/{id}/status
///
/// Only terminal statuses are cached; in-flight progress is always read fresh.
pub async fn get_status(State(state): State<AppState>, Path(session_id): Path<Uuid>) -> ApiResult<Json<Value>> {
    let key = status_key(session_id);
    if let Some(cached) = state.cache.get(&key).await {
        return Ok(Json(cached));
    }

    let session = require_session(&state, session_id).await?;
    let running = state.orchestrator.is_running(session_id);
    let response = serde_json::to_value(SessionStatusResponse::from_session(&session, running))
        .map_err(|e| ApiError::Internal(format!("Failed to serialize status: {}", e)))?;

    if session.status.is_terminal() && !running {
        cache_terminal_status(&state, &session, response.clone()).await?;
    }

    Ok(Json(response))
}

/// Cache a terminal status read from `session`, unless a run has since taken it
///
/// The entry is written first and verified after: a run that invalidated the
/// cache before the write still holds the lock or has already moved
/// `updated_at`, so the stale entry is dropped here.
pub async fn cache_terminal_status(state: &AppState, session: &Session, response: Value) -> ApiResult<()> {
    state.cache.put(status_key(session.id), response).await;

    let unchanged = !state.orchestrator.is_running(session.id)
        && db::sessions::load_session(&state.db, session.id)
            .await?
            .is_some_and(|current| current.updated_at == session.updated_at && current.status == session.status);

    if !unchanged {
        tracing::debug!(session_id = %session.id, "Session moved while caching its status, entry dropped");
        state.cache.invalidate_session(session.id).await;
    }
    Ok(())
}

/// GET /sessions/{id}/result
///
/// 409 until the session is complete.
pub async fn get_result(State(state): State<AppState>, Path(session_id): Path<Uuid>) -> ApiResult<Json<Value>> {
    let key = results_key(session_id);
    if let Some(cached) = state.cache.get(&key).await {
        return Ok(Json(cached));
    }

    let session = require_session(&state, session_id).await?;
    if session.status != SessionStatus::Complete {
        return Err(ApiError::Conflict(format!(
            "Session {} is {}, result not available",
            session_id, session.status
        )));
    }

    let record = db::artifacts::load_final_score(&state.db, session_id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("Final score missing for session {}", session_id)))?;
    let report = db::artifacts::load_report(&state.db, session_id).await?;

    let response = json!({
        "session_id": session_id,
        "mentor_score": record.final_score.mentor_score,
        "grade": record.final_score.grade,
        "interpretation": interpret(record.final_score.mentor_score),
        "breakdown": record.final_score.breakdown,
        "contributions": record.final_score.contributions,
        "weights_applied": record.final_score.weights_applied,
        "overall_fused": record.overall_fused,
        "confidence": record.confidence,
        "confidence_label": record.confidence.label(),
        "fusion_metadata": record.fusion_metadata,
        "explanations": report.as_ref().map(|r| &r.explanations),
        "report": report.as_ref().map(|r| &r.report),
        "completion_metadata": session.completion_metadata,
    });

    state.cache.put(key, response.clone()).await;
    Ok(Json(response))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/:id/process", post(process_session))
        .route("/sessions/:id/restart", post(restart_session))
        .route("/sessions/:id/status", get(get_status))
        .route("/sessions/:id/result", get(get_result))
        .route("/sessions/:id/events", get(super::session_event_stream))
}
