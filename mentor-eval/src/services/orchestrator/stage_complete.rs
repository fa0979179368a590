//! Stage 8: COMPLETE
//!
//! Builds the completion metadata; the orchestrator writes it together with
//! the `complete` status once the stage is recorded.

use super::{PipelineContext, PipelineError, StageOrchestrator, StageResult};
use chrono::Utc;
use serde_json::json;

impl StageOrchestrator {
    pub(super) async fn stage_complete(&self, ctx: &mut PipelineContext) -> Result<StageResult, PipelineError> {
        let session_id = ctx.session_id();
        tracing::info!(session_id = %session_id, "Phase 8: COMPLETE");

        let record = self.final_record(ctx).await?;

        let metadata = json!({
            "mentor_score": record.final_score.mentor_score,
            "grade": record.final_score.grade,
            "finished_at": Utc::now().to_rfc3339(),
            "pipeline_stages": ctx.timings.to_json(),
            "model_versions": {
                "whisper": self.collaborators.stt.model_name(),
                "llm": self.collaborators.llm.model_name(),
            },
            "runtime_diagnostics": {
                "total_duration_sec": (ctx.started.elapsed().as_secs_f64() * 1000.0).round() / 1000.0,
                "video_filename": ctx.session.filename,
                "completed_successfully": true,
            },
        });

        ctx.completion_metadata = Some(metadata);
        Ok(StageResult::Computed)
    }
}
