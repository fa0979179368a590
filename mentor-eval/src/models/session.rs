//! Evaluation session state machine
//!
//! **[ME-OR-010]** `uploaded → processing → {complete | failed}`; a restart
//! resets any session to `pending`, which re-enters `processing`.
//!
//! Stages run in fixed order:
//! PREPARE → STT → AUDIO → VISUAL → TEXT → FUSION → REPORT → COMPLETE

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Recording registered, never processed
    Uploaded,
    /// Reset by restart, awaiting the pipeline
    Pending,
    Processing,
    Complete,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Uploaded => "uploaded",
            SessionStatus::Pending => "pending",
            SessionStatus::Processing => "processing",
            SessionStatus::Complete => "complete",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Complete | SessionStatus::Failed)
    }

    /// Transitions the orchestrator may perform without a restart
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Uploaded, Processing)
                | (Pending, Processing)
                | (Processing, Processing)
                | (Processing, Complete)
                | (Processing, Failed)
                | (Uploaded, Failed)
                | (Pending, Failed)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(SessionStatus::Uploaded),
            "pending" => Ok(SessionStatus::Pending),
            "processing" => Ok(SessionStatus::Processing),
            "complete" => Ok(SessionStatus::Complete),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(format!("Unknown session status: {}", other)),
        }
    }
}

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Prepare,
    Stt,
    Audio,
    Visual,
    Text,
    Fusion,
    Report,
    Complete,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Prepare,
        Stage::Stt,
        Stage::Audio,
        Stage::Visual,
        Stage::Text,
        Stage::Fusion,
        Stage::Report,
        Stage::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Prepare => "prepare",
            Stage::Stt => "stt",
            Stage::Audio => "audio",
            Stage::Visual => "visual",
            Stage::Text => "text",
            Stage::Fusion => "fusion",
            Stage::Report => "report",
            Stage::Complete => "complete",
        }
    }

    /// Key in the `pipeline_stages` metadata object
    pub fn timing_key(&self) -> String {
        format!("{}_time_sec", self.as_str())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("Unknown stage: {}", s))
    }
}

/// Wall-clock seconds per stage, in execution order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageTimings {
    entries: Vec<(Stage, f64)>,
}

impl StageTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: Stage, seconds: f64) {
        let seconds = (seconds * 1000.0).round() / 1000.0;
        match self.entries.iter_mut().find(|(s, _)| *s == stage) {
            Some(entry) => entry.1 = seconds,
            None => self.entries.push((stage, seconds)),
        }
    }

    pub fn get(&self, stage: Stage) -> Option<f64> {
        self.entries.iter().find(|(s, _)| *s == stage).map(|(_, t)| *t)
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, t)| t).sum()
    }

    /// `{"<stage>_time_sec": ..., "total_time_sec": ...}`
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (stage, seconds) in &self.entries {
            map.insert(stage.timing_key(), Value::from(*seconds));
        }
        map.insert(
            "total_time_sec".to_string(),
            Value::from((self.total() * 1000.0).round() / 1000.0),
        );
        Value::Object(map)
    }
}

/// Evaluation session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub filename: String,
    /// Rubric subject requested for this recording
    pub subject: Option<String>,
    pub status: SessionStatus,
    pub stages_completed: Vec<Stage>,
    pub last_successful_stage: Option<Stage>,
    /// Completion metadata, or error metadata when failed
    pub completion_metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(filename: impl Into<String>, subject: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            subject,
            status: SessionStatus::Uploaded,
            stages_completed: Vec::new(),
            last_successful_stage: None,
            completion_metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_completed(&self, stage: Stage) -> bool {
        self.stages_completed.contains(&stage)
    }

    /// Error message recorded by a failed run
    pub fn error_message(&self) -> Option<&str> {
        if self.status != SessionStatus::Failed {
            return None;
        }
        self.completion_metadata
            .as_ref()
            .and_then(|m| m.get("error"))
            .and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_transitions() {
        assert!(SessionStatus::Uploaded.can_transition_to(SessionStatus::Processing));
        assert!(SessionStatus::Pending.can_transition_to(SessionStatus::Processing));
        assert!(SessionStatus::Processing.can_transition_to(SessionStatus::Complete));
        assert!(SessionStatus::Processing.can_transition_to(SessionStatus::Failed));

        assert!(!SessionStatus::Complete.can_transition_to(SessionStatus::Processing));
        assert!(!SessionStatus::Failed.can_transition_to(SessionStatus::Processing));
        assert!(!SessionStatus::Uploaded.can_transition_to(SessionStatus::Complete));
    }

    #[test]
    fn test_status_strings() {
        for status in [
            SessionStatus::Uploaded,
            SessionStatus::Pending,
            SessionStatus::Processing,
            SessionStatus::Complete,
            SessionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
        assert!("done".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn test_stage_order_and_keys() {
        assert!(Stage::Prepare < Stage::Stt);
        assert!(Stage::Report < Stage::Complete);
        assert_eq!(Stage::Stt.timing_key(), "stt_time_sec");
        assert_eq!("visual".parse::<Stage>().unwrap(), Stage::Visual);
    }

    #[test]
    fn test_stage_timings_json() {
        let mut timings = StageTimings::new();
        timings.record(Stage::Prepare, 0.0104);
        timings.record(Stage::Stt, 2.5);
        timings.record(Stage::Prepare, 0.02);

        let json = timings.to_json();
        assert_eq!(json["prepare_time_sec"], json!(0.02));
        assert_eq!(json["stt_time_sec"], json!(2.5));
        assert_eq!(json["total_time_sec"], json!(2.52));
    }

    #[test]
    fn test_error_message_only_when_failed() {
        let mut session = Session::new("lesson.mp4", None);
        session.completion_metadata = Some(json!({"error": "STT failed"}));
        assert_eq!(session.error_message(), None);

        session.status = SessionStatus::Failed;
        assert_eq!(session.error_message(), Some("STT failed"));
    }
}
