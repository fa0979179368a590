//! HTTP API handlers for mentor-eval
//!
//! **[ME-API-010]** Thin trigger and observation surface over the orchestrator

pub mod events;
pub mod health;
pub mod rubrics;
pub mod sessions;

pub use events::{event_stream, session_event_stream};
pub use health::health_routes;
pub use rubrics::rubric_routes;
pub use sessions::session_routes;
