//! Rubric store
//!
//! **[ME-RB-010]** Category → modality weight matrices, general and per subject.
//! **[ME-RB-020]** Every category's weights sum to 1.0 ± 0.01; checked at
//! construction and after every override merge. Violations are configuration
//! errors, never silently renormalized.

use super::{Category, Modality, ScoringError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Lower bound on a category's weight sum
pub const WEIGHT_SUM_MIN: f64 = 0.99;

/// Upper bound on a category's weight sum
pub const WEIGHT_SUM_MAX: f64 = 1.01;

/// Per-modality weights for one category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModalityWeights {
    pub audio: f64,
    pub text: f64,
    pub visual: f64,
}

impl ModalityWeights {
    pub const fn new(audio: f64, text: f64, visual: f64) -> Self {
        Self { audio, text, visual }
    }

    pub fn sum(&self) -> f64 {
        self.audio + self.text + self.visual
    }

    pub fn get(&self, modality: Modality) -> f64 {
        match modality {
            Modality::Audio => self.audio,
            Modality::Text => self.text,
            Modality::Visual => self.visual,
        }
    }

    /// Highest-weighted modality (first in audio/text/visual order on ties)
    pub fn dominant(&self) -> (Modality, f64) {
        Modality::ALL
            .into_iter()
            .map(|m| (m, self.get(m)))
            .fold((Modality::Audio, f64::MIN), |best, candidate| {
                if candidate.1 > best.1 {
                    candidate
                } else {
                    best
                }
            })
    }

    /// Check the sum-to-one invariant for `category`
    pub fn validate(&self, category: Category) -> Result<(), ScoringError> {
        for modality in Modality::ALL {
            let weight = self.get(modality);
            if !(0.0..=1.0).contains(&weight) {
                return Err(ScoringError::Configuration(format!(
                    "{} weight for {} must be within [0, 1], got {}",
                    modality, category, weight
                )));
            }
        }

        let sum = self.sum();
        if !(WEIGHT_SUM_MIN..=WEIGHT_SUM_MAX).contains(&sum) {
            return Err(ScoringError::Configuration(format!(
                "weights for {} sum to {:.4}, expected 1.0 ± 0.01",
                category, sum
            )));
        }

        Ok(())
    }
}

/// Partial weight triple used to override a base rubric
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightOverride {
    #[serde(default)]
    pub audio: Option<f64>,
    #[serde(default)]
    pub text: Option<f64>,
    #[serde(default)]
    pub visual: Option<f64>,
}

impl WeightOverride {
    fn apply(&self, base: ModalityWeights) -> ModalityWeights {
        ModalityWeights {
            audio: self.audio.unwrap_or(base.audio),
            text: self.text.unwrap_or(base.text),
            visual: self.visual.unwrap_or(base.visual),
        }
    }
}

/// Category-by-category overrides
pub type RubricOverrides = BTreeMap<Category, WeightOverride>;

/// Teaching subject selecting a rubric variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    #[default]
    General,
    Math,
    Programming,
    Language,
    Science,
    Business,
}

impl Subject {
    pub const ALL: [Subject; 6] = [
        Subject::General,
        Subject::Math,
        Subject::Programming,
        Subject::Language,
        Subject::Science,
        Subject::Business,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::General => "general",
            Subject::Math => "math",
            Subject::Programming => "programming",
            Subject::Language => "language",
            Subject::Science => "science",
            Subject::Business => "business",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Subject::General => "General Teaching",
            Subject::Math => "Mathematics",
            Subject::Programming => "Programming/CS",
            Subject::Language => "English/Language",
            Subject::Science => "Science",
            Subject::Business => "Business/Presentation",
        }
    }

    /// Built-in weight table, in `Category::ALL` order
    fn table(&self) -> [ModalityWeights; 5] {
        type W = ModalityWeights;
        match self {
            Subject::General => [
                W::new(0.15, 0.10, 0.75),
                W::new(0.30, 0.50, 0.20),
                W::new(0.05, 0.90, 0.05),
                W::new(0.70, 0.30, 0.00),
                W::new(0.20, 0.20, 0.60),
            ],
            Subject::Math => [
                W::new(0.10, 0.15, 0.75),
                W::new(0.20, 0.60, 0.20),
                W::new(0.05, 0.90, 0.05),
                W::new(0.50, 0.50, 0.00),
                W::new(0.15, 0.25, 0.60),
            ],
            Subject::Programming => [
                W::new(0.10, 0.20, 0.70),
                W::new(0.25, 0.55, 0.20),
                W::new(0.02, 0.95, 0.03),
                W::new(0.40, 0.60, 0.00),
                W::new(0.20, 0.30, 0.50),
            ],
            Subject::Language => [
                W::new(0.25, 0.15, 0.60),
                W::new(0.40, 0.40, 0.20),
                W::new(0.10, 0.80, 0.10),
                W::new(0.80, 0.20, 0.00),
                W::new(0.30, 0.20, 0.50),
            ],
            Subject::Science => [
                W::new(0.15, 0.15, 0.70),
                W::new(0.30, 0.50, 0.20),
                W::new(0.05, 0.85, 0.10),
                W::new(0.60, 0.40, 0.00),
                W::new(0.20, 0.20, 0.60),
            ],
            Subject::Business => [
                W::new(0.20, 0.15, 0.65),
                W::new(0.35, 0.45, 0.20),
                W::new(0.05, 0.85, 0.10),
                W::new(0.60, 0.40, 0.00),
                W::new(0.25, 0.25, 0.50),
            ],
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subject {
    type Err = ScoringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" | "default" => Ok(Subject::General),
            "math" | "mathematics" => Ok(Subject::Math),
            "programming" => Ok(Subject::Programming),
            "language" | "english" => Ok(Subject::Language),
            "science" => Ok(Subject::Science),
            "business" => Ok(Subject::Business),
            other => Err(ScoringError::Configuration(format!(
                "unknown rubric subject '{}'",
                other
            ))),
        }
    }
}

/// Serialized rubric format: optional subject plus category → weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricConfig {
    #[serde(default)]
    pub subject: Option<Subject>,
    pub weights: BTreeMap<Category, ModalityWeights>,
}

/// Validated category → modality weight matrix
///
/// Only constructible through [`Rubric::new`] (or the built-in tables), so a
/// `Rubric` value always satisfies the sum-to-one invariant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RubricConfig", into = "RubricConfig")]
pub struct Rubric {
    subject: Subject,
    weights: BTreeMap<Category, ModalityWeights>,
}

impl Rubric {
    /// Validate and build a rubric; every category must be present
    pub fn new(
        subject: Subject,
        weights: BTreeMap<Category, ModalityWeights>,
    ) -> Result<Self, ScoringError> {
        for category in Category::ALL {
            let entry = weights.get(&category).ok_or_else(|| {
                ScoringError::Configuration(format!("rubric is missing category {}", category))
            })?;
            entry.validate(category)?;
        }

        Ok(Self { subject, weights })
    }

    /// Built-in rubric for `subject`
    pub fn for_subject(subject: Subject) -> Result<Self, ScoringError> {
        let weights = Category::ALL.into_iter().zip(subject.table()).collect();
        Self::new(subject, weights)
    }

    pub fn subject(&self) -> Subject {
        self.subject
    }

    /// Weights for a category
    pub fn weights(&self, category: Category) -> ModalityWeights {
        // Construction guarantees all five categories are present
        self.weights
            .get(&category)
            .copied()
            .unwrap_or(ModalityWeights::new(0.0, 0.0, 0.0))
    }

    pub fn categories(&self) -> impl Iterator<Item = (Category, ModalityWeights)> + '_ {
        self.weights.iter().map(|(c, w)| (*c, *w))
    }

    /// Look up one weight by name
    pub fn get_category_weight(&self, category: &str, modality: &str) -> Result<f64, ScoringError> {
        let category: Category = category.parse()?;
        let modality: Modality = modality.parse()?;
        Ok(self.weights(category).get(modality))
    }

    /// Merge overrides category by category, then re-validate
    pub fn with_overrides(&self, overrides: &RubricOverrides) -> Result<Self, ScoringError> {
        let mut merged = self.weights.clone();
        for (category, weight_override) in overrides {
            let base = self.weights(*category);
            merged.insert(*category, weight_override.apply(base));
        }
        Self::new(self.subject, merged)
    }
}

impl Default for Rubric {
    fn default() -> Self {
        Self {
            subject: Subject::General,
            weights: Category::ALL
                .into_iter()
                .zip(Subject::General.table())
                .collect(),
        }
    }
}

impl TryFrom<RubricConfig> for Rubric {
    type Error = ScoringError;

    fn try_from(config: RubricConfig) -> Result<Self, Self::Error> {
        Rubric::new(config.subject.unwrap_or_default(), config.weights)
    }
}

impl From<Rubric> for RubricConfig {
    fn from(rubric: Rubric) -> Self {
        RubricConfig {
            subject: Some(rubric.subject),
            weights: rubric.weights,
        }
    }
}

/// Resolve a rubric: subject variant (general when absent) plus optional overrides
///
/// **[ME-RB-030]** An override that breaks the invariant is rejected.
pub fn get_rubric(
    subject: Option<Subject>,
    overrides: Option<&RubricOverrides>,
) -> Result<Rubric, ScoringError> {
    let base = Rubric::for_subject(subject.unwrap_or_default())?;

    match overrides {
        Some(overrides) if !overrides.is_empty() => {
            tracing::debug!(
                subject = %base.subject(),
                overridden = overrides.len(),
                "Applying rubric overrides"
            );
            base.with_overrides(overrides)
        }
        _ => Ok(base),
    }
}

/// Dominant modality of one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub category: Category,
    pub dominant_modality: Modality,
    pub weight: f64,
    pub weights: ModalityWeights,
}

/// Human-oriented summary of a rubric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RubricSummary {
    pub subject: Subject,
    pub display_name: String,
    pub categories: Vec<CategorySummary>,
}

pub fn rubric_summary(rubric: &Rubric) -> RubricSummary {
    let categories = rubric
        .categories()
        .map(|(category, weights)| {
            let (dominant_modality, weight) = weights.dominant();
            CategorySummary {
                category,
                dominant_modality,
                weight,
                weights,
            }
        })
        .collect();

    RubricSummary {
        subject: rubric.subject(),
        display_name: rubric.subject().display_name().to_string(),
        categories,
    }
}
