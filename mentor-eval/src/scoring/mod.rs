//! Multimodal scoring subsystem
//!
//! **[ME-SC-010]** Rubric-weighted fusion of audio, text and visual modality
//! scores into five category scores, aggregation into a graded mentor score,
//! quality-derived confidence envelopes and human-readable explanations.
//!
//! # Flow
//! ```text
//! ModalityScoreSet x3 ──► fusion::fuse ──► aggregator::score ──► FinalScore
//!                              ▲                                     │
//!                          rubric::Rubric             confidence::ConfidenceEstimator
//! ```

pub mod aggregator;
pub mod confidence;
pub mod explanation;
pub mod fusion;
pub mod rubric;

pub use aggregator::{CategoryWeights, FinalScore, Grade};
pub use confidence::{ConfidenceEnvelope, ConfidenceEstimator};
pub use fusion::{fuse, FusionResult, RawScores};
pub use rubric::{get_rubric, ModalityWeights, Rubric, Subject};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lowest possible score
pub const SCORE_MIN: f64 = 0.0;

/// Highest possible score
pub const SCORE_MAX: f64 = 10.0;

/// Scoring errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    /// Weight configuration violates its invariant
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Unknown modality: {0}")]
    UnknownModality(String),
}

/// Scoring categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Engagement,
    CommunicationClarity,
    TechnicalCorrectness,
    PacingStructure,
    InteractiveQuality,
}

impl Category {
    /// All categories in canonical order
    pub const ALL: [Category; 5] = [
        Category::Engagement,
        Category::CommunicationClarity,
        Category::TechnicalCorrectness,
        Category::PacingStructure,
        Category::InteractiveQuality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Engagement => "engagement",
            Category::CommunicationClarity => "communication_clarity",
            Category::TechnicalCorrectness => "technical_correctness",
            Category::PacingStructure => "pacing_structure",
            Category::InteractiveQuality => "interactive_quality",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ScoringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ScoringError::UnknownCategory(s.to_string()))
    }
}

/// Independent signal channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Audio,
    Text,
    Visual,
}

impl Modality {
    pub const ALL: [Modality; 3] = [Modality::Audio, Modality::Text, Modality::Visual];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Audio => "audio",
            Modality::Text => "text",
            Modality::Visual => "visual",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = ScoringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Modality::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ScoringError::UnknownModality(s.to_string()))
    }
}

/// Clamp into [0, 10]; NaN maps to the floor
pub fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        SCORE_MIN
    } else {
        value.clamp(SCORE_MIN, SCORE_MAX)
    }
}

/// Round half away from zero to `places` decimals
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip_names() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert!(matches!(
            "charisma".parse::<Category>(),
            Err(ScoringError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_modality_parse() {
        assert_eq!("visual".parse::<Modality>().unwrap(), Modality::Visual);
        assert!(matches!(
            "smell".parse::<Modality>(),
            Err(ScoringError::UnknownModality(_))
        ));
    }

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(-3.0), 0.0);
        assert_eq!(clamp_score(12.5), 10.0);
        assert_eq!(clamp_score(f64::NAN), 0.0);
        assert_eq!(clamp_score(7.25), 7.25);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(7.5125, 2), 7.51);
        assert_eq!(round_to(0.12345, 3), 0.123);
        assert_eq!(round_to(2.0, 2), 2.0);
    }

    #[test]
    fn test_category_serde_names() {
        let json = serde_json::to_string(&Category::PacingStructure).unwrap();
        assert_eq!(json, "\"pacing_structure\"");
    }
}
