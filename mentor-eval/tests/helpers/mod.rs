//! Test Helper Utilities
//!
//! Shared utilities for testing mentor-eval

#![allow(dead_code)]

pub mod mocks;

pub use mocks::{lecture_transcript, CallCounts, LlmMode, MockSetup};

use mentor_common::events::EventBus;
use mentor_eval::services::{PipelineSettings, ResultCache, StageOrchestrator};
use mentor_eval::AppState;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

/// Single-connection in-memory database with all tables
pub async fn create_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    mentor_eval::db::init_tables(&pool)
        .await
        .expect("Failed to initialize database schema");
    pool
}

/// Orchestrator over mock collaborators
pub struct TestHarness {
    pub pool: SqlitePool,
    pub event_bus: EventBus,
    pub cache: ResultCache,
    pub orchestrator: StageOrchestrator,
    pub counts: Arc<CallCounts>,
}

impl TestHarness {
    pub async fn new(setup: MockSetup) -> Self {
        let pool = create_test_db().await;
        let event_bus = EventBus::new(256);
        let cache = ResultCache::new(true, Duration::from_secs(60));
        let (collaborators, counts) = setup.build();
        let orchestrator = StageOrchestrator::new(
            pool.clone(),
            event_bus.clone(),
            cache.clone(),
            collaborators,
            PipelineSettings::default(),
        );

        Self {
            pool,
            event_bus,
            cache,
            orchestrator,
            counts,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.pool.clone(),
            self.event_bus.clone(),
            self.cache.clone(),
            self.orchestrator.clone(),
        )
    }

    pub fn router(&self) -> axum::Router {
        mentor_eval::build_router(self.app_state())
    }
}
