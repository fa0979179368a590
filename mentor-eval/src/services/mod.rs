//! Services for mentor-eval

pub mod orchestrator;
pub mod result_cache;
pub mod session_locks;

pub use orchestrator::{PipelineError, PipelineOutcome, PipelineSettings, StageOrchestrator};
pub use result_cache::ResultCache;
pub use session_locks::{SessionGuard, SessionLocks};
