//! Data models for the evaluation service
//!
//! - [ME-OR-010]: Session state machine and stage order
//! - Persisted pipeline artifacts

pub mod artifacts;
pub mod session;

pub use artifacts::{FinalScoreRecord, ModalityScoreSet, ReportRecord, TranscriptRecord};
pub use session::{Session, SessionStatus, Stage, StageTimings};
