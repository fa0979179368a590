//! Server-Sent Events for pipeline progress
//!
//! **[ME-API-060]** All sessions on `/events`, one session on
//! `/sessions/{id}/events`

use crate::AppState;
use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use mentor_common::sse::pipeline_event_stream;
use std::convert::Infallible;
use uuid::Uuid;

/// GET /events
pub async fn event_stream(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    pipeline_event_stream(&state.event_bus, None)
}

/// GET /sessions/{id}/events
pub async fn session_event_stream(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    pipeline_event_stream(&state.event_bus, Some(session_id))
}
