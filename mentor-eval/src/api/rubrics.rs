//! Rubric inspection

use axum::{
    extract::Path,
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::error::ApiResult;
use crate::scoring::rubric::{rubric_summary, RubricSummary};
use crate::scoring::{get_rubric, Rubric, Subject};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct RubricResponse {
    pub rubric: Rubric,
    pub summary: RubricSummary,
}

/// GET /rubrics/{subject}
///
/// Unknown subjects are a 400.
pub async fn get_subject_rubric(Path(subject): Path<String>) -> ApiResult<Json<RubricResponse>> {
    let subject: Subject = subject.parse()?;
    let rubric = get_rubric(Some(subject), None)?;
    let summary = rubric_summary(&rubric);

    Ok(Json(RubricResponse { rubric, summary }))
}

pub fn rubric_routes() -> Router<AppState> {
    Router::new().route("/rubrics/:subject", get(get_subject_rubric))
}
