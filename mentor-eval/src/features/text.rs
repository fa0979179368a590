//! Transcript evaluation by a language model
//!
//! **[ME-TX-010]** The model returns JSON with four 0–10 scores and a summary.
//! Any failure (empty transcript, unavailable model, malformed or incomplete
//! JSON) yields the all-zero fallback evaluation; it never fails the pipeline.

use super::strip_code_fences;
use crate::collaborators::LanguageModel;
use crate::scoring::{clamp_score, round_to, RawScores};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Score keys the model must return
pub const TEXT_SCORE_KEYS: [&str; 4] = [
    "clarity_score",
    "structure_score",
    "technical_correctness_score",
    "explanation_quality_score",
];

pub const FALLBACK_SUMMARY: &str = "Evaluation failed due to model error.";

/// Transcripts longer than this are truncated before prompting
const MAX_TRANSCRIPT_CHARS: usize = 20_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextEvaluation {
    pub clarity_score: f64,
    pub structure_score: f64,
    pub technical_correctness_score: f64,
    pub explanation_quality_score: f64,
    pub summary: String,
    /// Parsed model payload, or error context for a fallback
    pub raw: Value,
    pub fallback: bool,
}

impl TextEvaluation {
    pub fn fallback(raw: Value) -> Self {
        Self {
            clarity_score: 0.0,
            structure_score: 0.0,
            technical_correctness_score: 0.0,
            explanation_quality_score: 0.0,
            summary: FALLBACK_SUMMARY.to_string(),
            raw,
            fallback: true,
        }
    }

    pub fn score_set(&self) -> RawScores {
        [
            ("clarity_score", self.clarity_score),
            ("structure_score", self.structure_score),
            ("technical_correctness_score", self.technical_correctness_score),
            ("explanation_quality_score", self.explanation_quality_score),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect()
    }

    /// Payload stored next to the score set
    pub fn raw_payload(&self) -> Value {
        json!({
            "summary": self.summary,
            "raw": self.raw,
            "fallback": self.fallback,
        })
    }
}

fn score_from(value: &Value, key: &str) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(score) => round_to(clamp_score(score), 2),
        None => {
            tracing::warn!(key, value = %value, "Non-numeric text score");
            0.0
        }
    }
}

/// Parse a model answer into an evaluation
pub fn parse_text_evaluation(output: &str) -> TextEvaluation {
    if output.trim().is_empty() {
        tracing::error!("Empty text evaluation output");
        return TextEvaluation::fallback(json!({}));
    }

    let cleaned = strip_code_fences(output);
    let parsed: Value = match serde_json::from_str(&cleaned) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(error = %e, "Malformed text evaluation JSON");
            return TextEvaluation::fallback(json!({"error": "Malformed JSON", "content": output}));
        }
    };

    let Some(object) = parsed.as_object() else {
        tracing::error!("Text evaluation is not a JSON object");
        return TextEvaluation::fallback(json!({"error": "Not an object", "content": output}));
    };

    let missing: Vec<&str> = TEXT_SCORE_KEYS
        .iter()
        .copied()
        .chain(std::iter::once("summary"))
        .filter(|key| !object.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        tracing::error!(?missing, "Text evaluation missing keys");
        return TextEvaluation::fallback(parsed);
    }

    let summary = match &object["summary"] {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };

    TextEvaluation {
        clarity_score: score_from(&object["clarity_score"], "clarity_score"),
        structure_score: score_from(&object["structure_score"], "structure_score"),
        technical_correctness_score: score_from(
            &object["technical_correctness_score"],
            "technical_correctness_score",
        ),
        explanation_quality_score: score_from(
            &object["explanation_quality_score"],
            "explanation_quality_score",
        ),
        summary,
        raw: parsed.clone(),
        fallback: false,
    }
}

pub fn build_text_prompt(transcript: &str) -> String {
    let transcript = if transcript.trim().is_empty() {
        "[No transcript available]".to_string()
    } else if transcript.chars().count() > MAX_TRANSCRIPT_CHARS {
        tracing::info!(chars = transcript.chars().count(), "Truncating transcript for evaluation");
        let truncated: String = transcript.chars().take(MAX_TRANSCRIPT_CHARS).collect();
        format!("{}... [TRUNCATED]", truncated)
    } else {
        transcript.to_string()
    };

    format!(
        "You are an expert teaching evaluator. Read the transcript of a recorded \
teaching session and rate it on a 0-10 scale.\n\
\n\
Criteria:\n\
- clarity_score: how clearly ideas are expressed\n\
- structure_score: logical organization and flow\n\
- technical_correctness_score: accuracy of the subject matter\n\
- explanation_quality_score: use of examples, analogies and checks for understanding\n\
\n\
Respond with JSON only, no markdown, exactly in this shape:\n\
{{\"clarity_score\": 0.0, \"structure_score\": 0.0, \"technical_correctness_score\": 0.0, \
\"explanation_quality_score\": 0.0, \"summary\": \"two or three sentences\"}}\n\
\n\
Transcript:\n\
\"\"\"\n{}\n\"\"\"\n",
        transcript
    )
}

/// Transcript evaluation over a [`LanguageModel`]
#[derive(Clone)]
pub struct TextEvaluator {
    llm: Arc<dyn LanguageModel>,
}

impl TextEvaluator {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    pub async fn evaluate(&self, transcript: &str) -> TextEvaluation {
        if transcript.trim().is_empty() {
            tracing::warn!("Empty transcript provided for text evaluation");
            return TextEvaluation::fallback(json!({"error": "Empty transcript"}));
        }

        let prompt = build_text_prompt(transcript);
        match self.llm.complete(&prompt).await {
            Ok(output) => {
                let evaluation = parse_text_evaluation(&output);
                if !evaluation.fallback {
                    tracing::info!(
                        clarity = evaluation.clarity_score,
                        structure = evaluation.structure_score,
                        technical = evaluation.technical_correctness_score,
                        explanation = evaluation.explanation_quality_score,
                        "Text evaluation parsed"
                    );
                }
                evaluation
            }
            Err(e) => {
                tracing::error!(error = %e, "Text evaluation model call failed");
                TextEvaluation::fallback(json!({"error": e.to_string()}))
            }
        }
    }
}
