//! Stage 4: VISUAL
//!
//! Samples frames, runs per-frame detection and aggregates engagement ratios
//! into face/gaze/gesture/movement scores (35/25/20/20).
//!
//! A frame whose detection fails is dropped; a run with no usable frame fails
//! the stage.

use super::{PipelineContext, PipelineError, StageOrchestrator, StageResult};
use crate::collaborators::{CollaboratorError, FrameObservation};
use crate::db;
use crate::features::{aggregate_engagement, compute_visual_scores};
use crate::models::{ModalityScoreSet, Stage};
use crate::scoring::Modality;
use serde_json::json;

impl StageOrchestrator {
    pub(super) async fn stage_visual(&self, ctx: &mut PipelineContext) -> Result<StageResult, PipelineError> {
        let session_id = ctx.session_id();

        if db::artifacts::load_modality_scores(&self.db, session_id, Modality::Visual)
            .await?
            .is_some()
        {
            return Ok(StageResult::Skipped);
        }

        tracing::info!(session_id = %session_id, "Phase 4: VISUAL");

        let video = self.video_path(ctx, Stage::Visual).await?;
        let batch = self
            .collaborators
            .frame_sampler
            .sample_frames(&video, self.settings.frame_fps, self.settings.max_frames)
            .await
            .map_err(PipelineError::collaborator(Stage::Visual))?;

        let mut observations: Vec<FrameObservation> = Vec::with_capacity(batch.frames.len());
        let mut failed_frames = 0usize;
        for frame in &batch.frames {
            match self.collaborators.visual_detector.detect_visual_features(frame).await {
                Ok(observation) => observations.push(observation),
                Err(e) => {
                    failed_frames += 1;
                    tracing::debug!(session_id = %session_id, frame = frame.index, error = %e, "Frame detection failed");
                }
            }
        }

        if let Some(work_dir) = &batch.work_dir {
            if let Err(e) = tokio::fs::remove_dir_all(work_dir).await {
                tracing::debug!(path = %work_dir.display(), error = %e, "Failed to remove frame directory");
            }
        }

        if observations.is_empty() {
            return Err(PipelineError::collaborator(Stage::Visual)(CollaboratorError::InvalidResponse(
                format!(
                    "no frame could be analyzed ({} sampled, {} failed)",
                    batch.frames.len(),
                    failed_frames
                ),
            )));
        }

        if failed_frames > 0 {
            tracing::warn!(
                session_id = %session_id,
                failed_frames,
                analyzed = observations.len(),
                "Some frames could not be analyzed"
            );
        }

        let metrics = aggregate_engagement(&observations);
        let scores = compute_visual_scores(&metrics);

        tracing::info!(
            session_id = %session_id,
            frames = metrics.frames_analyzed,
            face_visibility = metrics.face_visibility_ratio,
            visual_overall = scores.visual_overall,
            "Visual analysis complete"
        );

        let raw = json!({
            "metrics": metrics,
            "video_height": batch.video_height,
            "lighting_quality": batch.lighting_quality,
            "frames_sampled": batch.frames.len(),
            "frames_failed": failed_frames,
        });
        let set = ModalityScoreSet::new(session_id, Modality::Visual, scores.score_set(), raw);
        db::artifacts::save_modality_scores(&self.db, &set).await?;

        Ok(StageResult::Computed)
    }
}
