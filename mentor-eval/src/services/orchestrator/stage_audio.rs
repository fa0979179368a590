//! Stage 3: AUDIO
//!
//! Speaking rate from transcript timing, silence ratio and clarity from the
//! audio analyzer, combined 40/20/40 into `audio_overall`.

use super::{PipelineContext, PipelineError, StageOrchestrator, StageResult};
use crate::collaborators::ClarityAnalysis;
use crate::db;
use crate::features::{calculate_wpm, compute_audio_scores};
use crate::models::{ModalityScoreSet, Stage};
use crate::scoring::Modality;

impl StageOrchestrator {
    pub(super) async fn stage_audio(&self, ctx: &mut PipelineContext) -> Result<StageResult, PipelineError> {
        let session_id = ctx.session_id();

        if db::artifacts::load_modality_scores(&self.db, session_id, Modality::Audio)
            .await?
            .is_some()
        {
            return Ok(StageResult::Skipped);
        }

        tracing::info!(session_id = %session_id, "Phase 3: AUDIO");

        let transcript = self.transcript(ctx).await?;
        let words_per_minute = calculate_wpm(&transcript.segments);

        let audio = self.audio_path(ctx, Stage::Audio).await?;
        let analyzer = &self.collaborators.audio_analyzer;

        let silence = analyzer
            .detect_silence(&audio)
            .await
            .map_err(PipelineError::collaborator(Stage::Audio))?;

        let clarity = match analyzer.analyze_clarity(&audio).await {
            Ok(clarity) => clarity,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Clarity analysis failed, scoring clarity as 0");
                ClarityAnalysis::default()
            }
        };

        let scores = compute_audio_scores(words_per_minute, &silence, &clarity);

        tracing::info!(
            session_id = %session_id,
            wpm = ?words_per_minute,
            silence_ratio = silence.silence_ratio,
            clarity = clarity.clarity_score,
            audio_overall = scores.audio_overall,
            "Audio analysis complete"
        );

        let set = ModalityScoreSet::new(
            session_id,
            Modality::Audio,
            scores.score_set(),
            scores.raw_payload(&silence, &clarity),
        );
        db::artifacts::save_modality_scores(&self.db, &set).await?;

        Ok(StageResult::Computed)
    }
}
