//! Score explanations
//!
//! **[ME-EX-010]** One explanation per category: tiered one-line summary
//! (≥8 / ≥6 / below), evidence items drawn from modality signals, and tips.
//! A category with no negative evidence receives its default tip.

use super::{round_to, Category};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const EYE_CONTACT_GOOD: f64 = 0.7;
const EYE_CONTACT_POOR: f64 = 0.4;
const WPM_GOOD_MIN: f64 = 120.0;
const WPM_GOOD_MAX: f64 = 160.0;
const WPM_TOO_FAST: f64 = 180.0;
const WPM_TOO_SLOW: f64 = 100.0;
const SILENCE_TOO_MUCH: f64 = 0.3;
const GESTURES_GOOD: f64 = 0.3;
const GESTURES_POOR: f64 = 0.1;
const CLARITY_GOOD: f64 = 7.0;
const CLARITY_POOR: f64 = 5.0;
const FACE_VISIBLE_MIN: f64 = 0.7;
const SESSION_LONG_SECS: f64 = 600.0;
const SESSION_SHORT_SECS: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Positive,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(rename = "type")]
    pub kind: EvidenceKind,
    pub text: String,
}

impl Evidence {
    fn positive(text: impl Into<String>) -> Self {
        Self {
            kind: EvidenceKind::Positive,
            text: text.into(),
        }
    }

    fn negative(text: impl Into<String>) -> Self {
        Self {
            kind: EvidenceKind::Negative,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryExplanation {
    pub score: f64,
    pub explanation: String,
    pub evidence: Vec<Evidence>,
    pub tips: Vec<String>,
}

/// Modality signals consulted for evidence
///
/// Absent values fall back to neutral defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExplanationInputs {
    pub eye_contact_ratio: Option<f64>,
    pub face_visible_ratio: Option<f64>,
    pub hand_gesture_ratio: Option<f64>,
    pub words_per_minute: Option<f64>,
    pub clarity_score: Option<f64>,
    pub silence_ratio: Option<f64>,
    pub duration_seconds: Option<f64>,
    pub content_relevance: Option<f64>,
    pub structure_score: Option<f64>,
}

/// Build explanations for every category
///
/// A category missing from `scores` is explained as a neutral 5.0.
pub fn explain_scores(
    scores: &BTreeMap<Category, f64>,
    inputs: &ExplanationInputs,
) -> BTreeMap<Category, CategoryExplanation> {
    Category::ALL
        .into_iter()
        .map(|category| {
            let score = scores.get(&category).copied().unwrap_or(5.0);
            let explanation = match category {
                Category::Engagement => explain_engagement(score, inputs),
                Category::CommunicationClarity => explain_communication(score, inputs),
                Category::TechnicalCorrectness => explain_technical(score, inputs),
                Category::PacingStructure => explain_pacing(score, inputs),
                Category::InteractiveQuality => explain_interactive(score, inputs),
            };
            (category, explanation)
        })
        .collect()
}

fn percent(ratio: f64) -> i64 {
    (ratio * 100.0) as i64
}

fn tiered(score: f64, high: &str, mid: &str, low: &str) -> String {
    if score >= 8.0 {
        high
    } else if score >= 6.0 {
        mid
    } else {
        low
    }
    .to_string()
}

fn finish(
    score: f64,
    explanation: String,
    evidence: Vec<Evidence>,
    mut tips: Vec<String>,
    default_tip: &str,
) -> CategoryExplanation {
    if tips.is_empty() {
        tips.push(default_tip.to_string());
    }
    CategoryExplanation {
        score: round_to(score, 2),
        explanation,
        evidence,
        tips,
    }
}

fn explain_engagement(score: f64, inputs: &ExplanationInputs) -> CategoryExplanation {
    let mut evidence = Vec::new();
    let mut tips = Vec::new();

    let eye_contact = inputs.eye_contact_ratio.unwrap_or(0.5);
    let face_visible = inputs.face_visible_ratio.unwrap_or(0.8);

    if eye_contact >= EYE_CONTACT_GOOD {
        evidence.push(Evidence::positive(format!(
            "Excellent eye contact maintained ({}% of session)",
            percent(eye_contact)
        )));
    } else if eye_contact < EYE_CONTACT_POOR {
        evidence.push(Evidence::negative(format!(
            "Limited eye contact detected ({}% of session)",
            percent(eye_contact)
        )));
        tips.push("Look directly at the camera lens to simulate eye contact with viewers".to_string());
    } else {
        evidence.push(Evidence::positive(format!(
            "Good eye contact maintained ({}% of session)",
            percent(eye_contact)
        )));
    }

    if face_visible < FACE_VISIBLE_MIN {
        evidence.push(Evidence::negative("Face was not visible for significant portions"));
        tips.push("Ensure your face is well-lit and centered in frame".to_string());
    }

    let explanation = tiered(
        score,
        "Excellent engagement with strong eye contact and presence",
        "Good engagement with room for improvement in eye contact",
        "Engagement needs improvement - focus on maintaining eye contact",
    );

    finish(
        score,
        explanation,
        evidence,
        tips,
        "Keep up the great work maintaining audience connection!",
    )
}

fn explain_communication(score: f64, inputs: &ExplanationInputs) -> CategoryExplanation {
    let mut evidence = Vec::new();
    let mut tips = Vec::new();

    let wpm = inputs.words_per_minute.unwrap_or(130.0);
    let clarity = inputs.clarity_score.unwrap_or(5.0);
    let silence_ratio = inputs.silence_ratio.unwrap_or(0.15);

    if (WPM_GOOD_MIN..=WPM_GOOD_MAX).contains(&wpm) {
        evidence.push(Evidence::positive(format!(
            "Optimal speaking pace at {} words per minute",
            wpm as i64
        )));
    } else if wpm > WPM_TOO_FAST {
        evidence.push(Evidence::negative(format!(
            "Speaking too fast at {} WPM (target: 120-160)",
            wpm as i64
        )));
        tips.push("Slow down your speech to improve comprehension".to_string());
    } else if wpm < WPM_TOO_SLOW {
        evidence.push(Evidence::negative(format!(
            "Speaking pace slow at {} WPM (target: 120-160)",
            wpm as i64
        )));
        tips.push("Try to maintain a more dynamic speaking pace".to_string());
    } else {
        evidence.push(Evidence::positive(format!(
            "Good speaking pace at {} words per minute",
            wpm as i64
        )));
    }

    if clarity >= CLARITY_GOOD {
        evidence.push(Evidence::positive("Speech was clear and easy to understand"));
    } else if clarity < CLARITY_POOR {
        evidence.push(Evidence::negative("Audio clarity could be improved"));
        tips.push("Use a better microphone or reduce background noise".to_string());
    }

    if silence_ratio > SILENCE_TOO_MUCH {
        evidence.push(Evidence::negative(format!(
            "Too many long pauses ({}% silence)",
            percent(silence_ratio)
        )));
        tips.push("Reduce long pauses to maintain audience attention".to_string());
    }

    let explanation = tiered(
        score,
        "Excellent communication with clear, well-paced speech",
        "Good communication with minor areas for improvement",
        "Communication clarity needs work - focus on pace and enunciation",
    );

    finish(
        score,
        explanation,
        evidence,
        tips,
        "Your communication skills are strong!",
    )
}

fn explain_technical(score: f64, inputs: &ExplanationInputs) -> CategoryExplanation {
    let mut evidence = Vec::new();
    let mut tips = Vec::new();

    let content = inputs.content_relevance.unwrap_or(7.0);
    let structure = inputs.structure_score.unwrap_or(7.0);

    if content >= 8.0 {
        evidence.push(Evidence::positive("Content is accurate and well-researched"));
    } else if content < 5.0 {
        evidence.push(Evidence::negative("Content accuracy could be improved"));
        tips.push("Double-check facts and include more specific examples".to_string());
    } else {
        evidence.push(Evidence::positive("Content is generally accurate"));
    }

    if structure >= 8.0 {
        evidence.push(Evidence::positive("Well-structured presentation with clear flow"));
    } else if structure < 5.0 {
        evidence.push(Evidence::negative("Presentation structure could be clearer"));
        tips.push("Use a clear introduction, main points, and conclusion".to_string());
    }

    let explanation = tiered(
        score,
        "Excellent technical content with accurate information",
        "Good technical accuracy with room for deeper coverage",
        "Technical content needs improvement - verify facts and add examples",
    );

    finish(
        score,
        explanation,
        evidence,
        tips,
        "Consider adding real-world examples to reinforce concepts",
    )
}

fn explain_pacing(score: f64, inputs: &ExplanationInputs) -> CategoryExplanation {
    let mut evidence = Vec::new();
    let mut tips = Vec::new();

    let wpm = inputs.words_per_minute.unwrap_or(130.0);
    let duration = inputs.duration_seconds.unwrap_or(300.0);

    if (WPM_GOOD_MIN..=WPM_GOOD_MAX).contains(&wpm) {
        evidence.push(Evidence::positive(
            "Speaking pace allows audience to follow along easily",
        ));
    } else {
        evidence.push(Evidence::negative(
            "Speaking pace could be optimized for better comprehension",
        ));
        tips.push("Aim for 120-160 words per minute for optimal comprehension".to_string());
    }

    if duration > SESSION_LONG_SECS {
        evidence.push(Evidence::positive(
            "Session length allows for comprehensive coverage",
        ));
    } else if duration < SESSION_SHORT_SECS {
        evidence.push(Evidence::negative(
            "Session may be too short for thorough explanation",
        ));
        tips.push("Consider extending content for deeper coverage".to_string());
    }

    let explanation = tiered(
        score,
        "Excellent pacing that keeps audience engaged",
        "Good pacing with minor timing adjustments suggested",
        "Pacing needs adjustment - consider varying your tempo",
    );

    finish(
        score,
        explanation,
        evidence,
        tips,
        "Use strategic pauses to emphasize key points",
    )
}

fn explain_interactive(score: f64, inputs: &ExplanationInputs) -> CategoryExplanation {
    let mut evidence = Vec::new();
    let mut tips = Vec::new();

    let gestures = inputs.hand_gesture_ratio.unwrap_or(0.2);

    if gestures >= GESTURES_GOOD {
        evidence.push(Evidence::positive(format!(
            "Good use of hand gestures ({}% of session)",
            percent(gestures)
        )));
    } else if gestures < GESTURES_POOR {
        evidence.push(Evidence::negative("Limited hand gestures detected"));
        tips.push("Use natural hand gestures to emphasize points".to_string());
    } else {
        evidence.push(Evidence::positive("Moderate use of hand gestures"));
    }

    let explanation = tiered(
        score,
        "Highly interactive and engaging presentation style",
        "Good interactive elements with room to engage more",
        "More interactive elements would improve engagement",
    );

    finish(
        score,
        explanation,
        evidence,
        tips,
        "Consider asking rhetorical questions to engage viewers",
    )
}
