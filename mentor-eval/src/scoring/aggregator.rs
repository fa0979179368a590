//! Score aggregator
//!
//! **[ME-AG-010]** Weighted sum of the five fused category scores plus a fixed
//! encouragement boost, clamped to [0, 10], mapped to a letter grade.

use super::fusion::FusionResult;
use super::{clamp_score, round_to, Category, ScoringError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Added to the weighted sum before clamping
pub const ENCOURAGEMENT_BOOST: f64 = 1.5;

/// Used for a category absent from the fusion result
pub const MISSING_CATEGORY_DEFAULT: f64 = 6.0;

/// Category weight vector (sums to 1.0 after construction)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryWeights {
    pub engagement: f64,
    pub communication_clarity: f64,
    pub technical_correctness: f64,
    pub pacing_structure: f64,
    pub interactive_quality: f64,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            engagement: 0.20,
            communication_clarity: 0.25,
            technical_correctness: 0.30,
            pacing_structure: 0.15,
            interactive_quality: 0.10,
        }
    }
}

impl CategoryWeights {
    /// Build a weight vector, renormalizing when the sum is outside 1.0 ± 0.01
    ///
    /// Negative weights or a non-positive sum are configuration errors.
    pub fn new(
        engagement: f64,
        communication_clarity: f64,
        technical_correctness: f64,
        pacing_structure: f64,
        interactive_quality: f64,
    ) -> Result<Self, ScoringError> {
        Self {
            engagement,
            communication_clarity,
            technical_correctness,
            pacing_structure,
            interactive_quality,
        }
        .normalized()
    }

    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::Engagement => self.engagement,
            Category::CommunicationClarity => self.communication_clarity,
            Category::TechnicalCorrectness => self.technical_correctness,
            Category::PacingStructure => self.pacing_structure,
            Category::InteractiveQuality => self.interactive_quality,
        }
    }

    pub fn sum(&self) -> f64 {
        Category::ALL.into_iter().map(|c| self.get(c)).sum()
    }

    pub fn as_map(&self) -> BTreeMap<Category, f64> {
        Category::ALL.into_iter().map(|c| (c, self.get(c))).collect()
    }

    /// Validate and renormalize
    pub fn normalized(self) -> Result<Self, ScoringError> {
        if let Some(category) = Category::ALL
            .into_iter()
            .find(|c| !self.get(*c).is_finite() || self.get(*c) < 0.0)
        {
            return Err(ScoringError::Configuration(format!(
                "category weight for {} must be a non-negative number, got {}",
                category,
                self.get(category)
            )));
        }

        let sum = self.sum();
        if sum <= 0.0 {
            return Err(ScoringError::Configuration(
                "category weights sum to zero".to_string(),
            ));
        }

        if (0.99..=1.01).contains(&sum) {
            return Ok(self);
        }

        tracing::warn!(sum, "Category weights do not sum to 1.0, renormalizing");
        Ok(Self {
            engagement: self.engagement / sum,
            communication_clarity: self.communication_clarity / sum,
            technical_correctness: self.technical_correctness / sum,
            pacing_structure: self.pacing_structure / sum,
            interactive_quality: self.interactive_quality / sum,
        })
    }
}

/// Letter grade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C-")]
    CMinus,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "F")]
    F,
}

/// Ordered threshold table, first match wins
const GRADE_THRESHOLDS: [(f64, Grade); 10] = [
    (9.0, Grade::APlus),
    (8.5, Grade::A),
    (8.0, Grade::AMinus),
    (7.5, Grade::BPlus),
    (7.0, Grade::B),
    (6.5, Grade::BMinus),
    (6.0, Grade::CPlus),
    (5.5, Grade::C),
    (5.0, Grade::CMinus),
    (4.0, Grade::D),
];

impl Grade {
    pub fn from_score(score: f64) -> Self {
        GRADE_THRESHOLDS
            .iter()
            .find(|(threshold, _)| score >= *threshold)
            .map(|(_, grade)| *grade)
            .unwrap_or(Grade::F)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::AMinus => "A-",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::BMinus => "B-",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::CMinus => "C-",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final graded score of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalScore {
    pub mentor_score: f64,
    pub grade: Grade,
    /// Category scores the aggregate was computed from
    pub breakdown: BTreeMap<Category, f64>,
    /// Category score × weight
    pub contributions: BTreeMap<Category, f64>,
    /// Weights actually applied (after any renormalization)
    pub weights_applied: BTreeMap<Category, f64>,
}

impl FinalScore {
    /// Neutral result used when no category data is available at all
    pub fn fallback() -> Self {
        let weights = CategoryWeights::default();
        Self {
            mentor_score: 5.0,
            grade: Grade::C,
            breakdown: Category::ALL.into_iter().map(|c| (c, 5.0)).collect(),
            contributions: Category::ALL
                .into_iter()
                .map(|c| (c, round_to(5.0 * weights.get(c), 4)))
                .collect(),
            weights_applied: weights.as_map(),
        }
    }
}

/// Aggregate a fusion result
pub fn score(fusion: &FusionResult, weights: Option<&CategoryWeights>) -> FinalScore {
    score_categories(&fusion.category_scores, weights)
}

/// Aggregate raw category scores
///
/// **[ME-AG-020]** Missing categories default to 6.0.
/// **[ME-AG-030]** The boost is applied before clamping, so all-10 input
/// reports 10.0.
pub fn score_categories(
    categories: &BTreeMap<Category, f64>,
    weights: Option<&CategoryWeights>,
) -> FinalScore {
    if categories.is_empty() {
        tracing::warn!("No category scores available, using fallback final score");
        return FinalScore::fallback();
    }

    let weights = weights.copied().unwrap_or_default();

    let mut breakdown = BTreeMap::new();
    let mut contributions = BTreeMap::new();
    let mut weighted_sum = 0.0;

    for category in Category::ALL {
        let value = match categories.get(&category) {
            Some(value) => clamp_score(*value),
            None => {
                tracing::warn!(category = %category, "Category score missing, using default");
                MISSING_CATEGORY_DEFAULT
            }
        };
        let contribution = value * weights.get(category);
        weighted_sum += contribution;

        breakdown.insert(category, value);
        contributions.insert(category, round_to(contribution, 4));
    }

    let mentor_score = round_to(clamp_score(weighted_sum + ENCOURAGEMENT_BOOST), 2);
    let grade = Grade::from_score(mentor_score);

    tracing::debug!(weighted_sum, mentor_score, grade = %grade, "Aggregated final score");

    FinalScore {
        mentor_score,
        grade,
        breakdown,
        contributions,
        weights_applied: weights.as_map(),
    }
}

/// Qualitative level of a mentor score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpretationLevel {
    Exceptional,
    Excellent,
    Good,
    Satisfactory,
    NeedsImprovement,
    Poor,
}

impl InterpretationLevel {
    pub fn label(&self) -> &'static str {
        match self {
            InterpretationLevel::Exceptional => "Exceptional",
            InterpretationLevel::Excellent => "Excellent",
            InterpretationLevel::Good => "Good",
            InterpretationLevel::Satisfactory => "Satisfactory",
            InterpretationLevel::NeedsImprovement => "Needs Improvement",
            InterpretationLevel::Poor => "Poor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreInterpretation {
    pub level: InterpretationLevel,
    pub label: String,
    pub description: String,
    pub recommendation: String,
}

pub fn interpret(score: f64) -> ScoreInterpretation {
    let (level, description, recommendation) = if score >= 9.0 {
        (
            InterpretationLevel::Exceptional,
            "Outstanding teaching performance across all dimensions",
            "Share your techniques with other educators",
        )
    } else if score >= 8.0 {
        (
            InterpretationLevel::Excellent,
            "Strong teaching with minor areas for refinement",
            "Focus on the lowest-scoring category for further polish",
        )
    } else if score >= 7.0 {
        (
            InterpretationLevel::Good,
            "Solid teaching with clear opportunities for growth",
            "Work on one or two targeted improvements per session",
        )
    } else if score >= 6.0 {
        (
            InterpretationLevel::Satisfactory,
            "Adequate teaching that meets basic expectations",
            "Review the category breakdown and practice weaker areas",
        )
    } else if score >= 5.0 {
        (
            InterpretationLevel::NeedsImprovement,
            "Teaching effectiveness is below expectations",
            "Prioritize engagement and clarity before advanced techniques",
        )
    } else {
        (
            InterpretationLevel::Poor,
            "Significant improvement needed across multiple dimensions",
            "Consider mentoring support and structured practice sessions",
        )
    };

    ScoreInterpretation {
        level,
        label: level.label().to_string(),
        description: description.to_string(),
        recommendation: recommendation.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(value: f64) -> BTreeMap<Category, f64> {
        Category::ALL.into_iter().map(|c| (c, value)).collect()
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let weights = CategoryWeights::default();
        assert!((weights.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_renormalization() {
        let weights = CategoryWeights::new(2.0, 2.0, 2.0, 2.0, 2.0).unwrap();
        assert!((weights.sum() - 1.0).abs() < 1e-9);
        assert!((weights.engagement - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_weights() {
        assert!(CategoryWeights::new(0.0, 0.0, 0.0, 0.0, 0.0).is_err());
        assert!(CategoryWeights::new(-0.5, 0.5, 0.5, 0.25, 0.25).is_err());
    }

    #[test]
    fn test_all_tens_clamp_to_ten() {
        let result = score_categories(&uniform(10.0), None);
        assert_eq!(result.mentor_score, 10.0);
        assert_eq!(result.grade, Grade::APlus);
    }

    #[test]
    fn test_all_zeros() {
        let result = score_categories(&uniform(0.0), None);
        assert_eq!(result.mentor_score, 1.5);
        assert_eq!(result.grade, Grade::F);
    }

    #[test]
    fn test_missing_category_defaults_to_six() {
        let mut categories = uniform(8.0);
        categories.remove(&Category::TechnicalCorrectness);

        let result = score_categories(&categories, None);
        assert_eq!(result.breakdown[&Category::TechnicalCorrectness], 6.0);
        // 0.7 * 8 + 0.3 * 6 + 1.5
        assert_eq!(result.mentor_score, 8.9);
    }

    #[test]
    fn test_empty_input_uses_fallback() {
        let result = score_categories(&BTreeMap::new(), None);
        assert_eq!(result, FinalScore::fallback());
        assert_eq!(result.grade, Grade::C);
    }

    #[test]
    fn test_contributions_and_weights_recorded() {
        let result = score_categories(&uniform(7.0), None);
        assert_eq!(result.contributions[&Category::TechnicalCorrectness], 2.1);
        assert_eq!(result.weights_applied[&Category::CommunicationClarity], 0.25);
    }

    #[test]
    fn test_grade_table() {
        let cases = [
            (10.0, "A+"),
            (9.0, "A+"),
            (8.99, "A"),
            (8.5, "A"),
            (8.2, "A-"),
            (7.5, "B+"),
            (7.0, "B"),
            (6.5, "B-"),
            (6.0, "C+"),
            (5.5, "C"),
            (5.0, "C-"),
            (4.0, "D"),
            (3.99, "F"),
            (0.0, "F"),
        ];
        for (score, expected) in cases {
            assert_eq!(Grade::from_score(score).as_str(), expected, "score {}", score);
        }
    }

    #[test]
    fn test_grade_serializes_as_letter() {
        assert_eq!(serde_json::to_string(&Grade::AMinus).unwrap(), "\"A-\"");
        let parsed: Grade = serde_json::from_str("\"B+\"").unwrap();
        assert_eq!(parsed, Grade::BPlus);
    }

    #[test]
    fn test_interpretation_levels() {
        assert_eq!(interpret(9.5).level, InterpretationLevel::Exceptional);
        assert_eq!(interpret(8.2).level, InterpretationLevel::Excellent);
        assert_eq!(interpret(7.0).level, InterpretationLevel::Good);
        assert_eq!(interpret(6.4).level, InterpretationLevel::Satisfactory);
        assert_eq!(interpret(5.0).label, "Needs Improvement");
        assert_eq!(interpret(2.0).level, InterpretationLevel::Poor);
    }
}
