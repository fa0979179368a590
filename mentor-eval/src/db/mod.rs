//! Database access for mentor-eval
//!
//! **[ME-DB-010]** SQLite database `mentor.db` in the root folder. Tables are
//! created at startup; every artifact table is keyed by session id.

pub mod artifacts;
pub mod sessions;

use mentor_common::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Open (creating if needed) the database and its tables
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect(&db_url)
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create all tables if absent
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            subject TEXT,
            status TEXT NOT NULL,
            stages_completed TEXT NOT NULL DEFAULT '[]',
            last_successful_stage TEXT,
            completion_metadata TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transcripts (
            session_id TEXT PRIMARY KEY REFERENCES sessions(id),
            text TEXT NOT NULL,
            segments TEXT NOT NULL,
            word_count INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS modality_scores (
            session_id TEXT NOT NULL REFERENCES sessions(id),
            modality TEXT NOT NULL,
            scores TEXT NOT NULL,
            raw TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (session_id, modality)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS final_scores (
            session_id TEXT PRIMARY KEY REFERENCES sessions(id),
            mentor_score REAL NOT NULL,
            grade TEXT NOT NULL,
            record TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reports (
            session_id TEXT PRIMARY KEY REFERENCES sessions(id),
            summary TEXT NOT NULL,
            record TEXT NOT NULL,
            fallback INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (sessions, transcripts, modality_scores, final_scores, reports)");

    Ok(())
}

/// Parse an RFC 3339 timestamp column
pub(crate) fn parse_timestamp(value: &str, column: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| mentor_common::Error::Internal(format!("Failed to parse {}: {}", column, e)))
}
