//! Stage 2: STT
//!
//! Transcribes the extracted audio. Transcription failure is fatal. The text
//! evaluation rides on the fresh transcript here; the TEXT stage only catches
//! up when that set is missing.

use super::{PipelineContext, PipelineError, StageOrchestrator, StageResult};
use crate::db;
use crate::models::{Stage, TranscriptRecord};
use chrono::Utc;

impl StageOrchestrator {
    pub(super) async fn stage_stt(&self, ctx: &mut PipelineContext) -> Result<StageResult, PipelineError> {
        let session_id = ctx.session_id();

        if let Some(record) = db::artifacts::load_transcript(&self.db, session_id).await? {
            ctx.transcript = Some(record.transcript);
            return Ok(StageResult::Skipped);
        }

        tracing::info!(session_id = %session_id, "Phase 2: STT");

        let audio = self.audio_path(ctx, Stage::Stt).await?;
        let transcript = self
            .collaborators
            .stt
            .transcribe(&audio)
            .await
            .map_err(PipelineError::collaborator(Stage::Stt))?;

        tracing::info!(
            session_id = %session_id,
            words = transcript.word_count(),
            segments = transcript.segments.len(),
            "Transcription complete"
        );

        db::artifacts::save_transcript(
            &self.db,
            &TranscriptRecord {
                session_id,
                transcript: transcript.clone(),
                created_at: Utc::now(),
            },
        )
        .await?;

        self.evaluate_text(session_id, &transcript.text).await?;

        ctx.transcript = Some(transcript);
        Ok(StageResult::Computed)
    }
}
