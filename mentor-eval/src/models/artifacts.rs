//! Per-session pipeline artifacts
//!
//! Each artifact is written once by the stage that owns it and never updated;
//! a restart deletes them all.

use crate::collaborators::Transcript;
use crate::features::Report;
use crate::scoring::explanation::CategoryExplanation;
use crate::scoring::fusion::FusionMetadata;
use crate::scoring::{Category, ConfidenceEnvelope, FinalScore, Modality, RawScores};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub session_id: Uuid,
    pub transcript: Transcript,
    pub created_at: DateTime<Utc>,
}

/// Score set of one modality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalityScoreSet {
    pub session_id: Uuid,
    pub modality: Modality,
    /// Named metrics in [0, 10]
    pub scores: RawScores,
    /// Debug payload
    pub raw: Value,
    pub created_at: DateTime<Utc>,
}

impl ModalityScoreSet {
    pub fn new(session_id: Uuid, modality: Modality, scores: RawScores, raw: Value) -> Self {
        Self {
            session_id,
            modality,
            scores,
            raw,
            created_at: Utc::now(),
        }
    }

    /// Numeric value of `key`, if present
    pub fn score(&self, key: &str) -> Option<f64> {
        self.scores.get(key).and_then(Value::as_f64)
    }

    /// Numeric value at `key` in the debug payload
    pub fn raw_number(&self, key: &str) -> Option<f64> {
        self.raw.get(key).and_then(Value::as_f64)
    }
}

/// Fusion + aggregation output with its confidence annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalScoreRecord {
    pub session_id: Uuid,
    pub final_score: FinalScore,
    pub category_scores: BTreeMap<Category, f64>,
    pub overall_fused: f64,
    pub fusion_metadata: FusionMetadata,
    pub confidence: ConfidenceEnvelope,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub session_id: Uuid,
    pub report: Report,
    pub explanations: BTreeMap<Category, CategoryExplanation>,
    pub created_at: DateTime<Utc>,
}
