//! Stage 6: FUSION
//!
//! Rubric-weighted fusion of the three modality sets, aggregation into the
//! graded mentor score and the confidence envelope around it.

use super::{PipelineContext, PipelineError, StageOrchestrator, StageResult};
use crate::db;
use crate::models::{FinalScoreRecord, ModalityScoreSet};
use crate::scoring::confidence::{AudioQuality, MediaMetadata, VisualQuality};
use crate::scoring::fusion::validate_fusion_inputs;
use crate::scoring::{aggregator, fuse, get_rubric, Modality, RawScores};
use chrono::Utc;
use std::collections::BTreeMap;

impl StageOrchestrator {
    pub(super) async fn stage_fusion(&self, ctx: &mut PipelineContext) -> Result<StageResult, PipelineError> {
        let session_id = ctx.session_id();

        if let Some(record) = db::artifacts::load_final_score(&self.db, session_id).await? {
            ctx.final_record = Some(record);
            return Ok(StageResult::Skipped);
        }

        tracing::info!(session_id = %session_id, "Phase 6: FUSION");

        let audio = db::artifacts::load_modality_scores(&self.db, session_id, Modality::Audio).await?;
        let text = db::artifacts::load_modality_scores(&self.db, session_id, Modality::Text).await?;
        let visual = db::artifacts::load_modality_scores(&self.db, session_id, Modality::Visual).await?;

        let scores_of = |set: &Option<ModalityScoreSet>| -> RawScores {
            set.as_ref().map(|s| s.scores.clone()).unwrap_or_default()
        };
        let (audio_scores, text_scores, visual_scores) = (scores_of(&audio), scores_of(&text), scores_of(&visual));

        let inputs = validate_fusion_inputs(&audio_scores, &text_scores, &visual_scores);
        if !inputs.is_complete() {
            tracing::warn!(session_id = %session_id, missing = ?inputs.missing, "Fusing with missing modalities");
        }

        let subject = self.subject(&ctx.session)?;
        let rubric = get_rubric(Some(subject), None)?;
        let fusion = fuse(&audio_scores, &text_scores, &visual_scores, &rubric);
        let final_score = aggregator::score(&fusion, None);

        let audio_quality = AudioQuality {
            clarity_score: audio.as_ref().and_then(|s| s.score("clarity_score")),
            words_per_minute: audio.as_ref().and_then(|s| s.raw_number("wpm")),
        };
        let visual_quality = VisualQuality {
            face_visibility_ratio: visual
                .as_ref()
                .and_then(|s| s.raw.pointer("/metrics/face_visibility_ratio"))
                .and_then(|v| v.as_f64()),
            lighting_quality: visual.as_ref().and_then(|s| s.raw_number("lighting_quality")),
        };
        let metadata = MediaMetadata {
            video_height: visual
                .as_ref()
                .and_then(|s| s.raw.get("video_height"))
                .and_then(|v| v.as_u64())
                .map(|h| h as u32),
            ..MediaMetadata::default()
        };

        let mut interval_inputs: BTreeMap<String, f64> = fusion
            .category_scores
            .iter()
            .map(|(category, score)| (category.to_string(), *score))
            .collect();
        interval_inputs.insert("mentor_score".to_string(), final_score.mentor_score);

        let confidence = self
            .confidence
            .confidence(&audio_quality, &visual_quality, &metadata, &interval_inputs);

        tracing::info!(
            session_id = %session_id,
            subject = %subject,
            mentor_score = final_score.mentor_score,
            grade = %final_score.grade,
            confidence = confidence.assessment.confidence_score,
            "Fusion complete"
        );

        let record = FinalScoreRecord {
            session_id,
            final_score,
            category_scores: fusion.category_scores,
            overall_fused: fusion.overall_score,
            fusion_metadata: fusion.metadata,
            confidence,
            created_at: Utc::now(),
        };
        db::artifacts::save_final_score(&self.db, &record).await?;

        ctx.final_record = Some(record);
        Ok(StageResult::Computed)
    }
}
