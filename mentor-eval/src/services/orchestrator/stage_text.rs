//! Stage 5: TEXT
//!
//! Normally a no-op: the STT stage already stored the text set. Runs the
//! evaluation when a resumed session has a transcript but no text set.

use super::{PipelineContext, PipelineError, StageOrchestrator, StageResult};
use crate::db;
use crate::models::ModalityScoreSet;
use crate::scoring::Modality;
use uuid::Uuid;

impl StageOrchestrator {
    pub(super) async fn stage_text(&self, ctx: &mut PipelineContext) -> Result<StageResult, PipelineError> {
        let session_id = ctx.session_id();

        if db::artifacts::load_modality_scores(&self.db, session_id, Modality::Text)
            .await?
            .is_some()
        {
            return Ok(StageResult::Skipped);
        }

        tracing::info!(session_id = %session_id, "Phase 5: TEXT");

        let transcript = self.transcript(ctx).await?;
        self.evaluate_text(session_id, &transcript.text).await?;
        Ok(StageResult::Computed)
    }

    /// Evaluate the transcript and store the text set; never fails on model errors
    pub(super) async fn evaluate_text(&self, session_id: Uuid, transcript: &str) -> Result<bool, PipelineError> {
        let evaluation = self.text_evaluator.evaluate(transcript).await;

        if evaluation.fallback {
            tracing::warn!(session_id = %session_id, "Text evaluation degraded to fallback scores");
        }

        let set = ModalityScoreSet::new(
            session_id,
            Modality::Text,
            evaluation.score_set(),
            evaluation.raw_payload(),
        );
        Ok(db::artifacts::save_modality_scores(&self.db, &set).await?)
    }
}
