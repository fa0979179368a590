//! Session record persistence
//!
//! **[ME-DB-020]** Stage completion is recorded by a single conditional UPDATE
//! that appends the stage only when absent, so concurrent writers cannot lose
//! each other's entries.

use super::parse_timestamp;
use crate::models::{Session, SessionStatus, Stage};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use chrono::Utc;
use mentor_common::{Error, Result};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

fn session_from_row(row: &SqliteRow) -> Result<Session> {
    let id: String = row.get("id");
    let id = Uuid::parse_str(&id).map_err(|e| Error::Internal(format!("Invalid session id: {}", e)))?;

    let status: String = row.get("status");
    let status: SessionStatus = status.parse().map_err(Error::Internal)?;

    let stages: String = row.get("stages_completed");
    let stages: Vec<String> = serde_json::from_str(&stages)
        .map_err(|e| Error::Internal(format!("Failed to deserialize stages_completed: {}", e)))?;
    let stages_completed = stages
        .iter()
        .map(|s| s.parse::<Stage>().map_err(Error::Internal))
        .collect::<Result<Vec<_>>>()?;

    let last_successful_stage = row
        .get::<Option<String>, _>("last_successful_stage")
        .map(|s| s.parse::<Stage>().map_err(Error::Internal))
        .transpose()?;

    let completion_metadata = row
        .get::<Option<String>, _>("completion_metadata")
        .map(|s| serde_json::from_str::<Value>(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to deserialize completion_metadata: {}", e)))?;

    Ok(Session {
        id,
        filename: row.get("filename"),
        subject: row.get("subject"),
        status,
        stages_completed,
        last_successful_stage,
        completion_metadata,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"), "created_at")?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"), "updated_at")?,
    })
}

/// Insert a new session record
pub async fn save_session(pool: &SqlitePool, session: &Session) -> Result<()> {
    let id = session.id.to_string();
    let stages = serde_json::to_string(
        &session
            .stages_completed
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>(),
    )?;
    let last = session.last_successful_stage.map(|s| s.as_str());
    let metadata = session
        .completion_metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let created_at = session.created_at.to_rfc3339();
    let updated_at = session.updated_at.to_rfc3339();

    retry_on_lock("save_session", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, filename, subject, status, stages_completed,
                last_successful_stage, completion_metadata, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&session.filename)
        .bind(&session.subject)
        .bind(session.status.as_str())
        .bind(&stages)
        .bind(last)
        .bind(&metadata)
        .bind(&created_at)
        .bind(&updated_at)
        .execute(pool)
        .await?;
        Ok(())
    })
    .await
}

/// Register an uploaded recording
pub async fn create_session(pool: &SqlitePool, filename: &str, subject: Option<String>) -> Result<Session> {
    let session = Session::new(filename, subject);
    save_session(pool, &session).await?;
    tracing::info!(session_id = %session.id, filename, "Session created");
    Ok(session)
}

pub async fn load_session(pool: &SqlitePool, session_id: Uuid) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, filename, subject, status, stages_completed, last_successful_stage,
               completion_metadata, created_at, updated_at
        FROM sessions
        WHERE id = ?
        "#,
    )
    .bind(session_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(session_from_row).transpose()
}

/// Update the status; returns false when the session does not exist
pub async fn set_status(pool: &SqlitePool, session_id: Uuid, status: SessionStatus) -> Result<bool> {
    let id = session_id.to_string();
    let now = Utc::now().to_rfc3339();

    retry_on_lock("set_status", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query("UPDATE sessions SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(&now)
            .bind(&id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    })
    .await
}

/// Append `stage` to the completed list unless already present
///
/// Returns true when the stage was newly recorded.
pub async fn add_completed_stage(pool: &SqlitePool, session_id: Uuid, stage: Stage) -> Result<bool> {
    let id = session_id.to_string();
    let now = Utc::now().to_rfc3339();
    let stage_name = stage.as_str();

    retry_on_lock("add_completed_stage", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET stages_completed = json_insert(stages_completed, '$[#]', ?),
                last_successful_stage = ?,
                updated_at = ?
            WHERE id = ?
              AND NOT EXISTS (
                  SELECT 1 FROM json_each(sessions.stages_completed) WHERE value = ?
              )
            "#,
        )
        .bind(stage_name)
        .bind(stage_name)
        .bind(&now)
        .bind(&id)
        .bind(stage_name)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    })
    .await
}

/// Terminal success: status `complete` plus completion metadata
pub async fn mark_completed(pool: &SqlitePool, session_id: Uuid, metadata: &Value) -> Result<()> {
    write_terminal(pool, session_id, SessionStatus::Complete, metadata, "mark_completed").await
}

/// Terminal failure: status `failed` plus error metadata
pub async fn mark_failed(pool: &SqlitePool, session_id: Uuid, metadata: &Value) -> Result<()> {
    write_terminal(pool, session_id, SessionStatus::Failed, metadata, "mark_failed").await
}

async fn write_terminal(
    pool: &SqlitePool,
    session_id: Uuid,
    status: SessionStatus,
    metadata: &Value,
    operation: &str,
) -> Result<()> {
    let id = session_id.to_string();
    let metadata = serde_json::to_string(metadata)?;
    let now = Utc::now().to_rfc3339();

    retry_on_lock(operation, DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            "UPDATE sessions SET status = ?, completion_metadata = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(&metadata)
        .bind(&now)
        .bind(&id)
        .execute(pool)
        .await?;
        Ok(())
    })
    .await
}

/// Clear progress back to a fresh `pending` session
pub async fn reset_session(pool: &SqlitePool, session_id: Uuid) -> Result<()> {
    let id = session_id.to_string();
    let now = Utc::now().to_rfc3339();

    retry_on_lock("reset_session", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            UPDATE sessions
            SET status = ?, stages_completed = '[]', last_successful_stage = NULL,
                completion_metadata = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(SessionStatus::Pending.as_str())
        .bind(&now)
        .bind(&id)
        .execute(pool)
        .await?;
        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_pool;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_and_load() {
        let pool = memory_pool().await;
        let session = create_session(&pool, "lesson.mp4", Some("math".to_string()))
            .await
            .unwrap();

        let loaded = load_session(&pool, session.id).await.unwrap().unwrap();
        assert_eq!(loaded.filename, "lesson.mp4");
        assert_eq!(loaded.subject.as_deref(), Some("math"));
        assert_eq!(loaded.status, SessionStatus::Uploaded);
        assert!(loaded.stages_completed.is_empty());
        assert!(loaded.last_successful_stage.is_none());

        assert!(load_session(&pool, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_completed_stage_is_idempotent() {
        let pool = memory_pool().await;
        let session = create_session(&pool, "lesson.mp4", None).await.unwrap();

        assert!(add_completed_stage(&pool, session.id, Stage::Prepare).await.unwrap());
        assert!(add_completed_stage(&pool, session.id, Stage::Stt).await.unwrap());
        assert!(!add_completed_stage(&pool, session.id, Stage::Prepare).await.unwrap());

        let loaded = load_session(&pool, session.id).await.unwrap().unwrap();
        assert_eq!(loaded.stages_completed, vec![Stage::Prepare, Stage::Stt]);
        assert_eq!(loaded.last_successful_stage, Some(Stage::Stt));
    }

    #[tokio::test]
    async fn test_concurrent_stage_appends_not_lost() {
        let pool = memory_pool().await;
        let session = create_session(&pool, "lesson.mp4", None).await.unwrap();

        let (a, b, c) = tokio::join!(
            add_completed_stage(&pool, session.id, Stage::Audio),
            add_completed_stage(&pool, session.id, Stage::Visual),
            add_completed_stage(&pool, session.id, Stage::Audio),
        );
        assert!(a.unwrap() ^ c.unwrap());
        assert!(b.unwrap());

        let loaded = load_session(&pool, session.id).await.unwrap().unwrap();
        assert_eq!(loaded.stages_completed.len(), 2);
        assert!(loaded.has_completed(Stage::Audio));
        assert!(loaded.has_completed(Stage::Visual));
    }

    #[tokio::test]
    async fn test_terminal_writes_and_reset() {
        let pool = memory_pool().await;
        let session = create_session(&pool, "lesson.mp4", None).await.unwrap();

        set_status(&pool, session.id, SessionStatus::Processing).await.unwrap();
        add_completed_stage(&pool, session.id, Stage::Prepare).await.unwrap();
        mark_failed(&pool, session.id, &json!({"error": "STT failed", "partial_completion": true}))
            .await
            .unwrap();

        let failed = load_session(&pool, session.id).await.unwrap().unwrap();
        assert_eq!(failed.status, SessionStatus::Failed);
        assert_eq!(failed.error_message(), Some("STT failed"));

        reset_session(&pool, session.id).await.unwrap();
        let reset = load_session(&pool, session.id).await.unwrap().unwrap();
        assert_eq!(reset.status, SessionStatus::Pending);
        assert!(reset.stages_completed.is_empty());
        assert!(reset.completion_metadata.is_none());
    }

    #[tokio::test]
    async fn test_set_status_unknown_session() {
        let pool = memory_pool().await;
        assert!(!set_status(&pool, Uuid::new_v4(), SessionStatus::Processing)
            .await
            .unwrap());
    }
}
