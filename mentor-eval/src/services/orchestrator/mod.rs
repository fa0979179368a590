//! Stage orchestrator
//!
//! **[ME-OR-020]** Drives one session through the evaluation pipeline
//!
//! # Stage Progression
//! PREPARE → STT → AUDIO → VISUAL → TEXT → FUSION → REPORT → COMPLETE
//!
//! Each stage lives in its own `stage_*` module and first checks whether its
//! artifact is already stored; if so it is skipped, which makes a second run
//! on a partially processed session resume where the last one stopped.
//! Stage completion is recorded with an atomic append after every stage.
//!
//! Any stage error marks the session `failed` with the error message and the
//! timings gathered so far. A failed session is only recovered by
//! [`StageOrchestrator::restart`], which deletes every artifact first.

use crate::collaborators::{CollaboratorError, Collaborators, Transcript};
use crate::db;
use crate::features::{ReportGenerator, TextEvaluator};
use crate::models::{FinalScoreRecord, Session, SessionStatus, Stage, StageTimings};
use crate::scoring::{ConfidenceEstimator, ScoringError, Subject};
use crate::services::result_cache::ResultCache;
use crate::services::session_locks::{SessionGuard, SessionLocks};
use chrono::Utc;
use mentor_common::config::PipelineConfig;
use mentor_common::events::{EventBus, MentorEvent};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

mod stage_audio;
mod stage_complete;
mod stage_fusion;
mod stage_prepare;
mod stage_report;
mod stage_stt;
mod stage_text;
mod stage_visual;

/// Pipeline failures
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    /// Session cannot be processed in its current status
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("{stage} stage failed: {source}")]
    Collaborator {
        stage: Stage,
        #[source]
        source: CollaboratorError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] mentor_common::Error),

    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),
}

impl PipelineError {
    pub(crate) fn collaborator(stage: Stage) -> impl FnOnce(CollaboratorError) -> PipelineError {
        move |source| PipelineError::Collaborator { stage, source }
    }
}

/// Result of one `process` or `restart` call
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub session_id: Uuid,
    /// `complete` or `failed`
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<FinalScoreRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineOutcome {
    fn complete(session_id: Uuid, score: FinalScoreRecord) -> Self {
        Self {
            session_id,
            status: SessionStatus::Complete,
            score: Some(score),
            error: None,
        }
    }

    fn failed(session_id: Uuid, error: String) -> Self {
        Self {
            session_id,
            status: SessionStatus::Failed,
            score: None,
            error: Some(error),
        }
    }
}

/// Tunables of a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub frame_fps: f64,
    pub max_frames: usize,
    /// Rubric subject when the session does not name one
    pub subject: Option<Subject>,
    pub report_retries: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            frame_fps: 1.0,
            max_frames: 60,
            subject: None,
            report_retries: 1,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ScoringError> {
        let subject = config.subject.as_deref().map(str::parse).transpose()?;
        Ok(Self {
            frame_fps: config.frame_fps,
            max_frames: config.max_frames,
            subject,
            report_retries: config.report_retries,
        })
    }
}

/// Whether a stage did work or found its artifact already stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum StageResult {
    Computed,
    Skipped,
}

/// Mutable state of one run
pub(super) struct PipelineContext {
    session: Session,
    timings: StageTimings,
    started: Instant,
    current_stage: Option<Stage>,
    video: Option<PathBuf>,
    audio: Option<PathBuf>,
    transcript: Option<Transcript>,
    final_record: Option<FinalScoreRecord>,
    completion_metadata: Option<Value>,
}

impl PipelineContext {
    fn new(session: Session) -> Self {
        Self {
            session,
            timings: StageTimings::new(),
            started: Instant::now(),
            current_stage: None,
            video: None,
            audio: None,
            transcript: None,
            final_record: None,
            completion_metadata: None,
        }
    }

    fn session_id(&self) -> Uuid {
        self.session.id
    }
}

/// Stages executed in order; `Complete` writes the terminal record
const STAGE_ORDER: [Stage; 8] = Stage::ALL;

/// Stage orchestrator service
#[derive(Clone)]
pub struct StageOrchestrator {
    db: SqlitePool,
    event_bus: EventBus,
    cache: ResultCache,
    locks: SessionLocks,
    collaborators: Collaborators,
    text_evaluator: TextEvaluator,
    report_generator: ReportGenerator,
    confidence: ConfidenceEstimator,
    settings: PipelineSettings,
}

impl StageOrchestrator {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        cache: ResultCache,
        collaborators: Collaborators,
        settings: PipelineSettings,
    ) -> Self {
        let text_evaluator = TextEvaluator::new(collaborators.llm.clone());
        let report_generator = ReportGenerator::new(collaborators.llm.clone(), settings.report_retries);

        Self {
            db,
            event_bus,
            cache,
            locks: SessionLocks::new(),
            collaborators,
            text_evaluator,
            report_generator,
            confidence: ConfidenceEstimator::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Try to take the session's run lock without waiting
    pub fn try_lock(&self, session_id: Uuid) -> Option<SessionGuard> {
        self.locks.try_acquire(session_id)
    }

    pub fn is_running(&self, session_id: Uuid) -> bool {
        self.locks.is_running(session_id)
    }

    pub fn active_runs(&self) -> usize {
        self.locks.active_count()
    }

    /// Run (or resume) the pipeline, waiting for any run already in progress
    ///
    /// **[ME-OR-030]** A complete session returns its stored score without
    /// recomputation; a failed session is rejected until restarted.
    pub async fn process(&self, session_id: Uuid) -> Result<PipelineOutcome, PipelineError> {
        let guard = self.locks.acquire(session_id).await;
        self.process_locked(&guard).await
    }

    /// [`process`](Self::process) for a caller already holding the lock
    pub async fn process_locked(&self, guard: &SessionGuard) -> Result<PipelineOutcome, PipelineError> {
        self.run_pipeline(guard.session_id(), false).await
    }

    /// Delete every artifact, reset the session and run the pipeline once
    ///
    /// **[ME-OR-040]** Destructive: nothing from prior runs survives.
    pub async fn restart(&self, session_id: Uuid) -> Result<PipelineOutcome, PipelineError> {
        let guard = self.locks.acquire(session_id).await;
        self.restart_locked(&guard).await
    }

    pub async fn restart_locked(&self, guard: &SessionGuard) -> Result<PipelineOutcome, PipelineError> {
        let session_id = guard.session_id();
        self.reset(session_id).await?;
        self.run_pipeline(session_id, true).await
    }

    async fn reset(&self, session_id: Uuid) -> Result<(), PipelineError> {
        if db::sessions::load_session(&self.db, session_id).await?.is_none() {
            return Err(PipelineError::SessionNotFound(session_id));
        }

        tracing::info!(session_id = %session_id, "Restarting session: deleting all artifacts");

        db::artifacts::delete_artifacts(&self.db, session_id).await?;
        db::sessions::reset_session(&self.db, session_id).await?;
        self.cache.invalidate_session(session_id).await;

        self.event_bus.emit_lossy(MentorEvent::SessionReset {
            session_id,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn run_pipeline(&self, session_id: Uuid, restart: bool) -> Result<PipelineOutcome, PipelineError> {
        let session = db::sessions::load_session(&self.db, session_id)
            .await?
            .ok_or(PipelineError::SessionNotFound(session_id))?;

        match session.status {
            SessionStatus::Complete => {
                tracing::info!(session_id = %session_id, "Session already complete, returning stored score");
                return self.stored_outcome(session_id).await;
            }
            SessionStatus::Failed => {
                return Err(PipelineError::InvalidState(format!(
                    "session {} failed; restart required",
                    session_id
                )));
            }
            _ => {}
        }

        tracing::info!(
            session_id = %session_id,
            filename = %session.filename,
            resumed_stages = session.stages_completed.len(),
            restart,
            "Starting evaluation pipeline"
        );

        self.event_bus.emit_lossy(MentorEvent::PipelineStarted {
            session_id,
            restart,
            timestamp: Utc::now(),
        });

        let mut ctx = PipelineContext::new(session);
        let result = self.run_stages(&mut ctx).await;
        self.cleanup(&mut ctx).await;

        match result {
            Ok(record) => {
                self.cache.invalidate_session(session_id).await;

                tracing::info!(
                    session_id = %session_id,
                    mentor_score = record.final_score.mentor_score,
                    grade = %record.final_score.grade,
                    total_sec = ctx.timings.total(),
                    "Evaluation pipeline completed"
                );

                self.event_bus.emit_lossy(MentorEvent::PipelineCompleted {
                    session_id,
                    mentor_score: record.final_score.mentor_score,
                    grade: record.final_score.grade.to_string(),
                    timestamp: Utc::now(),
                });

                Ok(PipelineOutcome::complete(session_id, record))
            }
            Err(error) => self.handle_failure(&ctx, error).await,
        }
    }

    async fn run_stages(&self, ctx: &mut PipelineContext) -> Result<FinalScoreRecord, PipelineError> {
        for stage in STAGE_ORDER {
            ctx.current_stage = Some(stage);
            let stage_start = Instant::now();

            let result = match stage {
                Stage::Prepare => self.stage_prepare(ctx).await?,
                Stage::Stt => self.stage_stt(ctx).await?,
                Stage::Audio => self.stage_audio(ctx).await?,
                Stage::Visual => self.stage_visual(ctx).await?,
                Stage::Text => self.stage_text(ctx).await?,
                Stage::Fusion => self.stage_fusion(ctx).await?,
                Stage::Report => self.stage_report(ctx).await?,
                Stage::Complete => self.stage_complete(ctx).await?,
            };

            let elapsed = stage_start.elapsed();
            ctx.timings.record(stage, elapsed.as_secs_f64());
            self.record_stage(ctx.session_id(), stage, result, elapsed).await?;
        }

        let metadata = ctx
            .completion_metadata
            .take()
            .ok_or_else(|| PipelineError::InvalidState("completion metadata was not built".to_string()))?;
        db::sessions::mark_completed(&self.db, ctx.session_id(), &metadata).await?;

        ctx.final_record
            .take()
            .ok_or_else(|| PipelineError::InvalidState("pipeline finished without a final score".to_string()))
    }

    async fn record_stage(
        &self,
        session_id: Uuid,
        stage: Stage,
        result: StageResult,
        elapsed: Duration,
    ) -> Result<(), PipelineError> {
        let newly_recorded = db::sessions::add_completed_stage(&self.db, session_id, stage).await?;
        let elapsed_ms = elapsed.as_millis() as u64;

        match result {
            StageResult::Computed => {
                tracing::info!(
                    session_id = %session_id,
                    stage = %stage,
                    elapsed_ms,
                    newly_recorded,
                    "Stage completed"
                );
                self.event_bus.emit_lossy(MentorEvent::StageCompleted {
                    session_id,
                    stage: stage.to_string(),
                    elapsed_ms,
                    timestamp: Utc::now(),
                });
            }
            StageResult::Skipped => {
                tracing::info!(session_id = %session_id, stage = %stage, "Stage skipped, artifact exists");
                self.event_bus.emit_lossy(MentorEvent::StageSkipped {
                    session_id,
                    stage: stage.to_string(),
                    timestamp: Utc::now(),
                });
            }
        }
        Ok(())
    }

    /// Persist failure metadata and report a failed outcome
    async fn handle_failure(
        &self,
        ctx: &PipelineContext,
        error: PipelineError,
    ) -> Result<PipelineOutcome, PipelineError> {
        let session_id = ctx.session_id();
        let message = error.to_string();
        let failed_stage = ctx.current_stage.map(|s| s.as_str());

        tracing::error!(
            session_id = %session_id,
            stage = failed_stage.unwrap_or("unknown"),
            error = %message,
            "Evaluation pipeline failed"
        );

        let metadata = json!({
            "error": message,
            "failed_stage": failed_stage,
            "failed_at": Utc::now().to_rfc3339(),
            "pipeline_stages": ctx.timings.to_json(),
            "partial_completion": true,
        });
        db::sessions::mark_failed(&self.db, session_id, &metadata).await?;
        self.cache.invalidate_session(session_id).await;

        self.event_bus.emit_lossy(MentorEvent::PipelineFailed {
            session_id,
            stage: failed_stage.map(str::to_string),
            error_message: message.clone(),
            timestamp: Utc::now(),
        });

        Ok(PipelineOutcome::failed(session_id, message))
    }

    async fn stored_outcome(&self, session_id: Uuid) -> Result<PipelineOutcome, PipelineError> {
        let record = db::artifacts::load_final_score(&self.db, session_id)
            .await?
            .ok_or_else(|| {
                PipelineError::InvalidState(format!("session {} is complete but has no final score", session_id))
            })?;
        Ok(PipelineOutcome::complete(session_id, record))
    }

    /// Remove extracted audio; best effort
    async fn cleanup(&self, ctx: &mut PipelineContext) {
        if let Some(audio) = ctx.audio.take() {
            if let Err(e) = tokio::fs::remove_file(&audio).await {
                tracing::debug!(path = %audio.display(), error = %e, "Failed to remove extracted audio");
            }
        }
    }

    /// Recording path, resolved once per run
    async fn video_path(&self, ctx: &mut PipelineContext, stage: Stage) -> Result<PathBuf, PipelineError> {
        if let Some(path) = &ctx.video {
            return Ok(path.clone());
        }

        let path = self
            .collaborators
            .media
            .resolve_video(ctx.session.id, &ctx.session.filename)
            .await
            .map_err(PipelineError::collaborator(stage))?;
        ctx.video = Some(path.clone());
        Ok(path)
    }

    /// Extracted audio track, produced once per run
    async fn audio_path(&self, ctx: &mut PipelineContext, stage: Stage) -> Result<PathBuf, PipelineError> {
        if let Some(path) = &ctx.audio {
            return Ok(path.clone());
        }

        let video = self.video_path(ctx, stage).await?;
        let path = self
            .collaborators
            .audio_extractor
            .extract_audio(&video)
            .await
            .map_err(PipelineError::collaborator(stage))?;
        tracing::debug!(session_id = %ctx.session.id, path = %path.display(), "Audio extracted");
        ctx.audio = Some(path.clone());
        Ok(path)
    }

    /// Transcript from this run or from storage
    async fn transcript(&self, ctx: &mut PipelineContext) -> Result<Transcript, PipelineError> {
        if let Some(transcript) = &ctx.transcript {
            return Ok(transcript.clone());
        }

        let record = db::artifacts::load_transcript(&self.db, ctx.session.id)
            .await?
            .ok_or_else(|| PipelineError::InvalidState("transcript missing".to_string()))?;
        ctx.transcript = Some(record.transcript.clone());
        Ok(record.transcript)
    }

    /// Rubric subject: the session's own, else the configured default
    fn subject(&self, session: &Session) -> Result<Subject, PipelineError> {
        match &session.subject {
            Some(name) => Ok(name.parse()?),
            None => Ok(self.settings.subject.unwrap_or_default()),
        }
    }
}
