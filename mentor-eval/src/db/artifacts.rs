//! Pipeline artifact persistence
//!
//! **[ME-DB-030]** Modality score sets are insert-once: a second write for the
//! same (session, modality) is ignored and reported as `false`, which lets a
//! resumed stage detect that its output already exists.

use super::parse_timestamp;
use crate::collaborators::{Transcript, TranscriptSegment};
use crate::models::{FinalScoreRecord, ModalityScoreSet, ReportRecord, TranscriptRecord};
use crate::scoring::Modality;
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use mentor_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

pub async fn save_transcript(pool: &SqlitePool, record: &TranscriptRecord) -> Result<()> {
    let id = record.session_id.to_string();
    let segments = serde_json::to_string(&record.transcript.segments)?;
    let word_count = record.transcript.word_count() as i64;
    let created_at = record.created_at.to_rfc3339();

    retry_on_lock("save_transcript", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO transcripts (session_id, text, segments, word_count, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                text = excluded.text,
                segments = excluded.segments,
                word_count = excluded.word_count,
                created_at = excluded.created_at
            "#,
        )
        .bind(&id)
        .bind(&record.transcript.text)
        .bind(&segments)
        .bind(word_count)
        .bind(&created_at)
        .execute(pool)
        .await?;
        Ok(())
    })
    .await
}

pub async fn load_transcript(pool: &SqlitePool, session_id: Uuid) -> Result<Option<TranscriptRecord>> {
    let row = sqlx::query("SELECT text, segments, created_at FROM transcripts WHERE session_id = ?")
        .bind(session_id.to_string())
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let segments: String = row.get("segments");
    let segments: Vec<TranscriptSegment> = serde_json::from_str(&segments)
        .map_err(|e| Error::Internal(format!("Failed to deserialize segments: {}", e)))?;

    Ok(Some(TranscriptRecord {
        session_id,
        transcript: Transcript {
            text: row.get("text"),
            segments,
        },
        created_at: parse_timestamp(&row.get::<String, _>("created_at"), "created_at")?,
    }))
}

/// Insert a score set; returns false when one already exists for the modality
pub async fn save_modality_scores(pool: &SqlitePool, set: &ModalityScoreSet) -> Result<bool> {
    let id = set.session_id.to_string();
    let scores = serde_json::to_string(&set.scores)?;
    let raw = serde_json::to_string(&set.raw)?;
    let created_at = set.created_at.to_rfc3339();

    let inserted = retry_on_lock("save_modality_scores", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            r#"
            INSERT INTO modality_scores (session_id, modality, scores, raw, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(session_id, modality) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(set.modality.as_str())
        .bind(&scores)
        .bind(&raw)
        .bind(&created_at)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    })
    .await?;

    if !inserted {
        tracing::debug!(session_id = %set.session_id, modality = %set.modality, "Score set already stored");
    }
    Ok(inserted)
}

pub async fn load_modality_scores(
    pool: &SqlitePool,
    session_id: Uuid,
    modality: Modality,
) -> Result<Option<ModalityScoreSet>> {
    let row = sqlx::query(
        "SELECT scores, raw, created_at FROM modality_scores WHERE session_id = ? AND modality = ?",
    )
    .bind(session_id.to_string())
    .bind(modality.as_str())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let scores: String = row.get("scores");
    let raw: String = row.get("raw");

    Ok(Some(ModalityScoreSet {
        session_id,
        modality,
        scores: serde_json::from_str(&scores)
            .map_err(|e| Error::Internal(format!("Failed to deserialize {} scores: {}", modality, e)))?,
        raw: serde_json::from_str(&raw)
            .map_err(|e| Error::Internal(format!("Failed to deserialize {} raw payload: {}", modality, e)))?,
        created_at: parse_timestamp(&row.get::<String, _>("created_at"), "created_at")?,
    }))
}

pub async fn save_final_score(pool: &SqlitePool, record: &FinalScoreRecord) -> Result<()> {
    let id = record.session_id.to_string();
    let json = serde_json::to_string(record)?;
    let created_at = record.created_at.to_rfc3339();

    retry_on_lock("save_final_score", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO final_scores (session_id, mentor_score, grade, record, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                mentor_score = excluded.mentor_score,
                grade = excluded.grade,
                record = excluded.record,
                created_at = excluded.created_at
            "#,
        )
        .bind(&id)
        .bind(record.final_score.mentor_score)
        .bind(record.final_score.grade.as_str())
        .bind(&json)
        .bind(&created_at)
        .execute(pool)
        .await?;
        Ok(())
    })
    .await
}

pub async fn load_final_score(pool: &SqlitePool, session_id: Uuid) -> Result<Option<FinalScoreRecord>> {
    let record: Option<String> = sqlx::query_scalar("SELECT record FROM final_scores WHERE session_id = ?")
        .bind(session_id.to_string())
        .fetch_optional(pool)
        .await?;

    record
        .map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| Error::Internal(format!("Failed to deserialize final score: {}", e)))
        })
        .transpose()
}

pub async fn save_report(pool: &SqlitePool, record: &ReportRecord) -> Result<()> {
    let id = record.session_id.to_string();
    let json = serde_json::to_string(record)?;
    let created_at = record.created_at.to_rfc3339();

    retry_on_lock("save_report", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO reports (session_id, summary, record, fallback, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                summary = excluded.summary,
                record = excluded.record,
                fallback = excluded.fallback,
                created_at = excluded.created_at
            "#,
        )
        .bind(&id)
        .bind(&record.report.summary)
        .bind(&json)
        .bind(record.report.fallback)
        .bind(&created_at)
        .execute(pool)
        .await?;
        Ok(())
    })
    .await
}

pub async fn load_report(pool: &SqlitePool, session_id: Uuid) -> Result<Option<ReportRecord>> {
    let record: Option<String> = sqlx::query_scalar("SELECT record FROM reports WHERE session_id = ?")
        .bind(session_id.to_string())
        .fetch_optional(pool)
        .await?;

    record
        .map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| Error::Internal(format!("Failed to deserialize report: {}", e)))
        })
        .transpose()
}

/// Remove every artifact of a session in one transaction
pub async fn delete_artifacts(pool: &SqlitePool, session_id: Uuid) -> Result<()> {
    let id = session_id.to_string();

    retry_on_lock("delete_artifacts", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let mut tx = pool.begin().await?;
        for table in ["transcripts", "modality_scores", "final_scores", "reports"] {
            sqlx::query(&format!("DELETE FROM {} WHERE session_id = ?", table))
                .bind(&id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    })
    .await?;

    tracing::info!(session_id = %session_id, "Deleted session artifacts");
    Ok(())
}
