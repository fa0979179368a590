//! Stage 1: PREPARE
//!
//! Reloads the session record and moves it into `processing`.

use super::{PipelineContext, PipelineError, StageOrchestrator, StageResult};
use crate::db;
use crate::models::SessionStatus;

impl StageOrchestrator {
    pub(super) async fn stage_prepare(&self, ctx: &mut PipelineContext) -> Result<StageResult, PipelineError> {
        let session_id = ctx.session_id();
        let session = db::sessions::load_session(&self.db, session_id)
            .await?
            .ok_or(PipelineError::SessionNotFound(session_id))?;

        if !session.status.can_transition_to(SessionStatus::Processing) {
            return Err(PipelineError::InvalidState(format!(
                "cannot process session in status {}",
                session.status
            )));
        }

        // Rubric subject is validated before any collaborator runs
        self.subject(&session)?;

        db::sessions::set_status(&self.db, session_id, SessionStatus::Processing).await?;
        self.cache.invalidate_session(session_id).await;

        tracing::info!(
            session_id = %session_id,
            previous_status = %session.status,
            "Phase 1: PREPARE"
        );

        ctx.session = session;
        ctx.session.status = SessionStatus::Processing;
        Ok(StageResult::Computed)
    }
}
