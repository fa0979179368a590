//! Stage 7: REPORT
//!
//! Narrative report from the language model plus rule-based per-category
//! explanations. The report degrades to fixed defaults and never fails the
//! stage.

use super::{PipelineContext, PipelineError, StageOrchestrator, StageResult};
use crate::db;
use crate::models::{FinalScoreRecord, ReportRecord};
use crate::scoring::explanation::{explain_scores, ExplanationInputs};
use crate::scoring::Modality;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

impl StageOrchestrator {
    pub(super) async fn stage_report(&self, ctx: &mut PipelineContext) -> Result<StageResult, PipelineError> {
        let session_id = ctx.session_id();

        if db::artifacts::load_report(&self.db, session_id).await?.is_some() {
            return Ok(StageResult::Skipped);
        }

        tracing::info!(session_id = %session_id, "Phase 7: REPORT");

        let record = self.final_record(ctx).await?;
        let breakdown = &record.final_score.breakdown;

        let report = self
            .report_generator
            .generate(breakdown, record.final_score.mentor_score)
            .await;
        if report.fallback {
            tracing::warn!(session_id = %session_id, "Report generation degraded to default report");
        }

        let inputs = self.explanation_inputs(session_id).await?;
        let explanations = explain_scores(breakdown, &inputs);

        db::artifacts::save_report(
            &self.db,
            &ReportRecord {
                session_id,
                report,
                explanations,
                created_at: Utc::now(),
            },
        )
        .await?;

        Ok(StageResult::Computed)
    }

    /// Final score from this run or from storage
    pub(super) async fn final_record(&self, ctx: &mut PipelineContext) -> Result<FinalScoreRecord, PipelineError> {
        if let Some(record) = &ctx.final_record {
            return Ok(record.clone());
        }

        let record = db::artifacts::load_final_score(&self.db, ctx.session_id())
            .await?
            .ok_or_else(|| PipelineError::InvalidState("final score missing".to_string()))?;
        ctx.final_record = Some(record.clone());
        Ok(record)
    }

    /// Evidence signals pulled from the stored modality sets
    async fn explanation_inputs(&self, session_id: Uuid) -> Result<ExplanationInputs, PipelineError> {
        let audio = db::artifacts::load_modality_scores(&self.db, session_id, Modality::Audio).await?;
        let text = db::artifacts::load_modality_scores(&self.db, session_id, Modality::Text).await?;
        let visual = db::artifacts::load_modality_scores(&self.db, session_id, Modality::Visual).await?;

        let visual_metric = |key: &str| {
            visual
                .as_ref()
                .and_then(|s| s.raw.get("metrics"))
                .and_then(|m| m.get(key))
                .and_then(Value::as_f64)
        };

        Ok(ExplanationInputs {
            eye_contact_ratio: visual_metric("gaze_forward_ratio"),
            face_visible_ratio: visual_metric("face_visibility_ratio"),
            hand_gesture_ratio: visual_metric("gesture_activity_ratio"),
            words_per_minute: audio.as_ref().and_then(|s| s.raw_number("wpm")),
            clarity_score: audio.as_ref().and_then(|s| s.score("clarity_score")),
            silence_ratio: audio.as_ref().and_then(|s| s.raw_number("silence_ratio")),
            duration_seconds: audio
                .as_ref()
                .and_then(|s| s.raw.pointer("/silence/duration_seconds"))
                .and_then(Value::as_f64),
            content_relevance: text.as_ref().and_then(|s| s.score("technical_correctness_score")),
            structure_score: text.as_ref().and_then(|s| s.score("structure_score")),
        })
    }
}
