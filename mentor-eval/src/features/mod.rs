//! Per-modality feature scoring
//!
//! Turns collaborator outputs (transcripts, pause and clarity analysis, frame
//! observations, model completions) into the modality score sets consumed by
//! fusion, plus the final narrative report.

pub mod audio;
pub mod report;
pub mod text;
pub mod visual;

pub use audio::{calculate_wpm, compute_audio_scores, AudioScores};
pub use report::{Report, ReportGenerator};
pub use text::{TextEvaluation, TextEvaluator};
pub use visual::{aggregate_engagement, compute_visual_scores, EngagementMetrics, VisualScores};

/// Remove markdown code fences around a model's JSON answer
pub fn strip_code_fences(output: &str) -> String {
    output.replace("```json", "").replace("```", "").trim().to_string()
}
