//! Fusion engine
//!
//! **[ME-FU-010]** Combines per-modality raw score sets into five fused category
//! scores using rubric weights.
//!
//! # Extraction order
//! For each (category, modality) the first matching key wins:
//! 1. `<category>` (exact)
//! 2. `<category>_score`
//! 3. `<modality>_overall`
//! 4. `overall`
//! 5. `overall_score`
//!
//! With no match the neutral default (5.0) is used. A matched key whose value
//! is not numeric also yields the neutral default.

use super::rubric::{ModalityWeights, Rubric, Subject};
use super::{clamp_score, round_to, Category, Modality};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Neutral value substituted for missing or unparseable modality scores
pub const NEUTRAL_DEFAULT: f64 = 5.0;

/// Raw modality score set as produced by a collaborator
pub type RawScores = BTreeMap<String, Value>;

/// Accessor strategy that produced a modality value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    ExactCategory,
    CategorySuffixed,
    ModalityOverall,
    GenericOverall,
    GenericOverallScore,
    NeutralDefault,
}

impl ExtractionSource {
    /// Key strategies, tried in this order
    pub const ORDER: [ExtractionSource; 5] = [
        ExtractionSource::ExactCategory,
        ExtractionSource::CategorySuffixed,
        ExtractionSource::ModalityOverall,
        ExtractionSource::GenericOverall,
        ExtractionSource::GenericOverallScore,
    ];

    /// Candidate key for this strategy (none for the neutral default)
    fn key(&self, category: Category, modality: Modality) -> Option<String> {
        match self {
            ExtractionSource::ExactCategory => Some(category.as_str().to_string()),
            ExtractionSource::CategorySuffixed => Some(format!("{}_score", category.as_str())),
            ExtractionSource::ModalityOverall => Some(format!("{}_overall", modality.as_str())),
            ExtractionSource::GenericOverall => Some("overall".to_string()),
            ExtractionSource::GenericOverallScore => Some("overall_score".to_string()),
            ExtractionSource::NeutralDefault => None,
        }
    }
}

/// Value chosen for one (category, modality) pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extraction {
    pub value: f64,
    pub source: ExtractionSource,
    /// The matched key held a non-numeric value
    pub parse_failed: bool,
}

/// Interpret a raw value as a score in [0, 10]
///
/// Numbers and numeric strings parse; everything else is `None`.
pub fn normalize_value(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;

    if parsed.is_finite() {
        Some(clamp_score(parsed))
    } else {
        None
    }
}

/// Run the ordered accessor strategies for one category/modality
pub fn extract_modality_score(scores: &RawScores, category: Category, modality: Modality) -> Extraction {
    for source in ExtractionSource::ORDER {
        let Some(key) = source.key(category, modality) else {
            continue;
        };

        if let Some(raw) = scores.get(&key) {
            return match normalize_value(raw) {
                Some(value) => Extraction {
                    value,
                    source,
                    parse_failed: false,
                },
                None => {
                    tracing::warn!(
                        category = %category,
                        modality = %modality,
                        key = %key,
                        "Non-numeric modality score, using neutral default"
                    );
                    Extraction {
                        value: NEUTRAL_DEFAULT,
                        source,
                        parse_failed: true,
                    }
                }
            };
        }
    }

    Extraction {
        value: NEUTRAL_DEFAULT,
        source: ExtractionSource::NeutralDefault,
        parse_failed: false,
    }
}

/// Contribution of one modality to one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalityContribution {
    pub value: f64,
    pub weight: f64,
    /// value × weight
    pub contribution: f64,
    pub source: ExtractionSource,
    #[serde(default)]
    pub parse_failed: bool,
}

/// Audit trail for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryContribution {
    pub audio: ModalityContribution,
    pub text: ModalityContribution,
    pub visual: ModalityContribution,
    pub fused_score: f64,
}

/// Raw inputs the fusion ran on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModalityInputs {
    pub audio: RawScores,
    pub text: RawScores,
    pub visual: RawScores,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionMetadata {
    pub subject: Subject,
    pub contributions: BTreeMap<Category, CategoryContribution>,
    pub weights_applied: BTreeMap<Category, ModalityWeights>,
    pub modality_inputs: ModalityInputs,
}

/// Fused category scores with their audit metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    pub category_scores: BTreeMap<Category, f64>,
    /// Mean of the five category scores
    pub overall_score: f64,
    pub metadata: FusionMetadata,
}

/// Fuse three modality score sets under `rubric`
///
/// **[ME-FU-020]** Every extracted value and every fused score lies in [0, 10].
/// **[ME-FU-030]** Missing modalities contribute the neutral default.
pub fn fuse(audio: &RawScores, text: &RawScores, visual: &RawScores, rubric: &Rubric) -> FusionResult {
    let mut category_scores = BTreeMap::new();
    let mut contributions = BTreeMap::new();
    let mut weights_applied = BTreeMap::new();

    for category in Category::ALL {
        let weights = rubric.weights(category);

        let contribution_for = |scores: &RawScores, modality: Modality| {
            let extraction = extract_modality_score(scores, category, modality);
            let weight = weights.get(modality);
            ModalityContribution {
                value: extraction.value,
                weight,
                contribution: round_to(extraction.value * weight, 4),
                source: extraction.source,
                parse_failed: extraction.parse_failed,
            }
        };

        let audio_part = contribution_for(audio, Modality::Audio);
        let text_part = contribution_for(text, Modality::Text);
        let visual_part = contribution_for(visual, Modality::Visual);

        let fused = audio_part.value * weights.audio
            + text_part.value * weights.text
            + visual_part.value * weights.visual;
        let fused_score = round_to(clamp_score(fused), 2);

        tracing::debug!(
            category = %category,
            audio = audio_part.value,
            text = text_part.value,
            visual = visual_part.value,
            fused = fused_score,
            "Fused category score"
        );

        category_scores.insert(category, fused_score);
        weights_applied.insert(category, weights);
        contributions.insert(
            category,
            CategoryContribution {
                audio: audio_part,
                text: text_part,
                visual: visual_part,
                fused_score,
            },
        );
    }

    let overall_score = round_to(
        category_scores.values().sum::<f64>() / category_scores.len() as f64,
        2,
    );

    FusionResult {
        category_scores,
        overall_score,
        metadata: FusionMetadata {
            subject: rubric.subject(),
            contributions,
            weights_applied,
            modality_inputs: ModalityInputs {
                audio: audio.clone(),
                text: text.clone(),
                visual: visual.clone(),
            },
        },
    }
}

/// Presence report for the three fusion inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FusionInputReport {
    pub present: Vec<Modality>,
    pub missing: Vec<Modality>,
}

impl FusionInputReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Check which modality sets are empty; missing sets are logged, never fatal
pub fn validate_fusion_inputs(audio: &RawScores, text: &RawScores, visual: &RawScores) -> FusionInputReport {
    let mut report = FusionInputReport {
        present: Vec::new(),
        missing: Vec::new(),
    };

    for (modality, scores) in [
        (Modality::Audio, audio),
        (Modality::Text, text),
        (Modality::Visual, visual),
    ] {
        if scores.is_empty() {
            tracing::warn!(modality = %modality, "Modality scores missing, neutral default will be used");
            report.missing.push(modality);
        } else {
            report.present.push(modality);
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(pairs: &[(&str, Value)]) -> RawScores {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_exact_key_beats_fallbacks() {
        let scores = raw(&[
            ("engagement", json!(9.0)),
            ("engagement_score", json!(1.0)),
            ("audio_overall", json!(2.0)),
        ]);

        let extraction = extract_modality_score(&scores, Category::Engagement, Modality::Audio);
        assert_eq!(extraction.value, 9.0);
        assert_eq!(extraction.source, ExtractionSource::ExactCategory);
    }

    #[test]
    fn test_fallback_order() {
        let scores = raw(&[("overall_score", json!(3.0)), ("overall", json!(4.0))]);
        let extraction = extract_modality_score(&scores, Category::Engagement, Modality::Text);
        assert_eq!(extraction.value, 4.0);
        assert_eq!(extraction.source, ExtractionSource::GenericOverall);

        let scores = raw(&[("overall_score", json!(3.0))]);
        let extraction = extract_modality_score(&scores, Category::Engagement, Modality::Text);
        assert_eq!(extraction.source, ExtractionSource::GenericOverallScore);

        let scores = raw(&[("technical_correctness_score", json!(8.5)), ("text_overall", json!(1.0))]);
        let extraction = extract_modality_score(&scores, Category::TechnicalCorrectness, Modality::Text);
        assert_eq!(extraction.value, 8.5);
        assert_eq!(extraction.source, ExtractionSource::CategorySuffixed);
    }

    #[test]
    fn test_modality_overall_only_matches_own_modality() {
        let scores = raw(&[("visual_overall", json!(7.0))]);
        let extraction = extract_modality_score(&scores, Category::Engagement, Modality::Audio);
        assert_eq!(extraction.value, NEUTRAL_DEFAULT);
        assert_eq!(extraction.source, ExtractionSource::NeutralDefault);
    }

    #[test]
    fn test_non_numeric_value_uses_neutral_default() {
        let scores = raw(&[("engagement", json!("very good")), ("audio_overall", json!(9.0))]);
        let extraction = extract_modality_score(&scores, Category::Engagement, Modality::Audio);
        assert_eq!(extraction.value, NEUTRAL_DEFAULT);
        assert!(extraction.parse_failed);

        let scores = raw(&[("overall", Value::Null)]);
        let extraction = extract_modality_score(&scores, Category::Engagement, Modality::Audio);
        assert_eq!(extraction.value, NEUTRAL_DEFAULT);
    }

    #[test]
    fn test_numeric_strings_parse() {
        assert_eq!(normalize_value(&json!(" 7.5 ")), Some(7.5));
        assert_eq!(normalize_value(&json!("abc")), None);
        assert_eq!(normalize_value(&json!(true)), None);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let audio = raw(&[("audio_overall", json!(-4.0))]);
        let text = raw(&[("text_overall", json!(25.0))]);
        let visual = raw(&[("visual_overall", json!(1e9))]);

        let result = fuse(&audio, &text, &visual, &Rubric::default());

        for (category, score) in &result.category_scores {
            assert!((0.0..=10.0).contains(score), "{} = {}", category, score);
            let contribution = &result.metadata.contributions[category];
            assert_eq!(contribution.audio.value, 0.0);
            assert_eq!(contribution.text.value, 10.0);
            assert_eq!(contribution.visual.value, 10.0);
        }
    }

    #[test]
    fn test_missing_modality_uses_neutral_default() {
        let audio = raw(&[("audio_overall", json!(8.0))]);
        let visual = raw(&[("visual_overall", json!(6.0))]);

        let result = fuse(&audio, &RawScores::new(), &visual, &Rubric::default());

        // technical_correctness: 0.05*8 + 0.90*5 + 0.05*6 = 5.2
        assert_eq!(result.category_scores[&Category::TechnicalCorrectness], 5.2);
        for contribution in result.metadata.contributions.values() {
            assert_eq!(contribution.text.value, NEUTRAL_DEFAULT);
            assert_eq!(contribution.text.source, ExtractionSource::NeutralDefault);
        }
    }

    #[test]
    fn test_all_empty_inputs_fuse_to_neutral() {
        let empty = RawScores::new();
        let result = fuse(&empty, &empty, &empty, &Rubric::default());
        assert_eq!(result.overall_score, 5.0);
        assert!(result.category_scores.values().all(|s| *s == 5.0));
    }

    #[test]
    fn test_overall_is_category_mean() {
        let audio = raw(&[("audio_overall", json!(10.0))]);
        let text = raw(&[("text_overall", json!(0.0))]);
        let visual = raw(&[("visual_overall", json!(5.0))]);

        let result = fuse(&audio, &text, &visual, &Rubric::default());
        let mean = result.category_scores.values().sum::<f64>() / 5.0;
        assert!((result.overall_score - mean).abs() < 0.01);
    }

    #[test]
    fn test_metadata_records_weights_and_contributions() {
        let audio = raw(&[("audio_overall", json!(9.2))]);
        let visual = raw(&[("visual_overall", json!(7.51))]);

        let result = fuse(&audio, &RawScores::new(), &visual, &Rubric::default());
        let engagement = &result.metadata.contributions[&Category::Engagement];

        assert_eq!(engagement.audio.weight, 0.15);
        assert_eq!(engagement.audio.contribution, 1.38);
        assert_eq!(engagement.visual.contribution, 5.6325);
        assert_eq!(engagement.fused_score, 7.51);
        assert_eq!(result.metadata.weights_applied.len(), 5);
        assert_eq!(result.metadata.modality_inputs.audio["audio_overall"], json!(9.2));
    }

    #[test]
    fn test_validate_fusion_inputs() {
        let audio = raw(&[("audio_overall", json!(9.0))]);
        let report = validate_fusion_inputs(&audio, &RawScores::new(), &RawScores::new());
        assert_eq!(report.present, vec![Modality::Audio]);
        assert_eq!(report.missing, vec![Modality::Text, Modality::Visual]);
        assert!(!report.is_complete());
    }
}
