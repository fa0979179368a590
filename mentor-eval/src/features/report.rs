//! Narrative report generation
//!
//! **[ME-RP-010]** The model is asked for `summary`, `strengths`,
//! `improvements` and `actionable_tips`. An invalid answer is retried; once
//! attempts are exhausted the fixed default report is returned with
//! `{error, fallback: true}` as its raw payload.

use super::strip_code_fences;
use crate::collaborators::LanguageModel;
use crate::scoring::aggregator::interpret;
use crate::scoring::Category;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

const DEFAULT_SUMMARY: &str =
    "Teaching evaluation completed. Detailed analysis unavailable at this time.";

const DEFAULT_STRENGTHS: [&str; 2] = [
    "Session successfully recorded and analyzed",
    "Teaching content delivered to students",
];

const DEFAULT_IMPROVEMENTS: [&str; 2] = [
    "Consider reviewing the evaluation scores for specific areas of growth",
    "Focus on continuous improvement across all teaching parameters",
];

const DEFAULT_TIPS: [&str; 4] = [
    "Review your engagement scores and consider incorporating more interactive elements",
    "Practice clear communication techniques to improve clarity",
    "Ensure technical accuracy in all content delivery",
    "Monitor pacing to maintain optimal learning flow",
];

const LIST_KEYS: [&str; 3] = ["strengths", "improvements", "actionable_tips"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub summary: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub actionable_tips: Vec<String>,
    /// Validated model payload, or `{error, fallback: true}`
    pub raw: Value,
    pub fallback: bool,
}

impl Report {
    pub fn fallback(error: &str) -> Self {
        tracing::warn!(error, "Using fallback report");
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            summary: DEFAULT_SUMMARY.to_string(),
            strengths: owned(&DEFAULT_STRENGTHS),
            improvements: owned(&DEFAULT_IMPROVEMENTS),
            actionable_tips: owned(&DEFAULT_TIPS),
            raw: json!({"error": error, "fallback": true}),
            fallback: true,
        }
    }

    /// Build from a payload that passed [`validate_report_response`]
    fn from_validated(payload: Value) -> Self {
        let list = |key: &str| -> Vec<String> {
            payload[key]
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .map(|item| match item {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        let summary = match &payload["summary"] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        Self {
            summary,
            strengths: list("strengths"),
            improvements: list("improvements"),
            actionable_tips: list("actionable_tips"),
            raw: payload.clone(),
            fallback: false,
        }
    }
}

/// `summary` present and the three list keys hold arrays
pub fn validate_report_response(payload: &Value) -> bool {
    let Some(object) = payload.as_object() else {
        return false;
    };

    object.contains_key("summary")
        && LIST_KEYS
            .iter()
            .all(|key| object.get(*key).is_some_and(Value::is_array))
}

/// Strip fences and parse; `None` for non-JSON output
pub fn parse_report_response(output: &str) -> Option<Value> {
    let cleaned = strip_code_fences(output);
    match serde_json::from_str(&cleaned) {
        Ok(value) => Some(value),
        Err(e) => {
            let preview: String = cleaned.chars().take(200).collect();
            tracing::error!(error = %e, preview = %preview, "Report JSON parsing failed");
            None
        }
    }
}

pub fn build_report_prompt(breakdown: &BTreeMap<Category, f64>, mentor_score: f64) -> String {
    let mut lines = String::new();
    for category in Category::ALL {
        let score = breakdown.get(&category).copied().unwrap_or(0.0);
        lines.push_str(&format!(
            "- {}: {:.2}/10 ({})\n",
            category,
            score,
            interpret(score).label
        ));
    }

    let overall = interpret(mentor_score);

    format!(
        "You are a supportive teaching coach. A recorded teaching session was scored \
automatically on five parameters.\n\
\n\
Scores:\n{lines}\
Overall mentor score: {mentor_score:.2}/10 ({label}: {description})\n\
\n\
Write constructive feedback grounded in these scores. Respond with JSON only, \
no markdown, exactly in this shape:\n\
{{\"summary\": \"3-4 sentence overview\", \"strengths\": [\"...\"], \
\"improvements\": [\"...\"], \"actionable_tips\": [\"...\"]}}\n\
Give 2-4 strengths, 2-4 improvements and 3-5 actionable tips.\n",
        lines = lines,
        mentor_score = mentor_score,
        label = overall.label,
        description = overall.description,
    )
}

/// Report generation over a [`LanguageModel`]
#[derive(Clone)]
pub struct ReportGenerator {
    llm: Arc<dyn LanguageModel>,
    retries: u32,
}

impl ReportGenerator {
    /// `retries` extra attempts after the first
    pub fn new(llm: Arc<dyn LanguageModel>, retries: u32) -> Self {
        Self { llm, retries }
    }

    pub async fn generate(&self, breakdown: &BTreeMap<Category, f64>, mentor_score: f64) -> Report {
        let prompt = build_report_prompt(breakdown, mentor_score);
        let attempts = self.retries + 1;
        let mut last_error = String::from("Invalid LLM response");

        for attempt in 1..=attempts {
            let output = match self.llm.complete(&prompt).await {
                Ok(output) => output,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Report model call failed");
                    last_error = e.to_string();
                    continue;
                }
            };

            match parse_report_response(&output) {
                Some(payload) if validate_report_response(&payload) => {
                    tracing::info!(attempt, "Report generated");
                    return Report::from_validated(payload);
                }
                Some(_) => {
                    tracing::warn!(attempt, "Report response failed validation");
                    last_error = "Invalid LLM response".to_string();
                }
                None => {
                    last_error = "Malformed LLM response".to_string();
                }
            }
        }

        tracing::error!(attempts, "All report attempts exhausted");
        Report::fallback(&last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_report() {
        let report = Report::fallback("boom");
        assert!(report.fallback);
        assert_eq!(report.strengths.len(), 2);
        assert_eq!(report.improvements.len(), 2);
        assert_eq!(report.actionable_tips.len(), 4);
        assert_eq!(report.raw, json!({"error": "boom", "fallback": true}));
    }

    #[test]
    fn test_validate_report_response() {
        assert!(validate_report_response(&json!({
            "summary": "s", "strengths": [], "improvements": ["i"], "actionable_tips": ["t"]
        })));
        assert!(!validate_report_response(&json!({
            "summary": "s", "strengths": "one", "improvements": [], "actionable_tips": []
        })));
        assert!(!validate_report_response(&json!({
            "strengths": [], "improvements": [], "actionable_tips": []
        })));
        assert!(!validate_report_response(&json!(["summary"])));
    }

    #[test]
    fn test_parse_fenced_report() {
        let output = "```json\n{\"summary\": \"Good\", \"strengths\": [\"pace\", 3], \
\"improvements\": [], \"actionable_tips\": []}\n```";
        let payload = parse_report_response(output).unwrap();
        assert!(validate_report_response(&payload));

        let report = Report::from_validated(payload);
        assert_eq!(report.summary, "Good");
        assert_eq!(report.strengths, vec!["pace".to_string(), "3".to_string()]);
        assert!(!report.fallback);
    }

    #[test]
    fn test_prompt_lists_every_category() {
        let breakdown: BTreeMap<Category, f64> = Category::ALL.into_iter().map(|c| (c, 7.0)).collect();
        let prompt = build_report_prompt(&breakdown, 8.22);
        for category in Category::ALL {
            assert!(prompt.contains(category.as_str()));
        }
        assert!(prompt.contains("8.22/10"));
    }
}
