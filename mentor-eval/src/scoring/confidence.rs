//! Confidence & bias module
//!
//! **[ME-CF-010]** Quality-derived confidence: mean of three tiered quality
//! sub-scores (video resolution, audio clarity, face detection consistency).
//! **[ME-CF-020]** Per-score interval `score ± margin` where
//! `margin = clamp(0.1, 1.0, 0.5 × (1 − confidence) × (1/√n) × 2)`.
//! **[ME-CF-030]** Fairness rules run before interval calculation:
//! accent tolerance boosts clarity, poor lighting only attaches a flag.

use super::{clamp_score, round_to, SCORE_MAX};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rule-set version recorded with every envelope
pub const MITIGATION_VERSION: &str = "1.0";

const MIN_MARGIN: f64 = 0.1;
const MAX_MARGIN: f64 = 1.0;

/// Categorical confidence label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    #[serde(rename = "Very High")]
    VeryHigh,
    High,
    Moderate,
    Low,
    #[serde(rename = "Very Low")]
    VeryLow,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::VeryHigh => "Very High",
            ConfidenceLevel::High => "High",
            ConfidenceLevel::Moderate => "Moderate",
            ConfidenceLevel::Low => "Low",
            ConfidenceLevel::VeryLow => "Very Low",
        }
    }

    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            ConfidenceLevel::VeryHigh
        } else if confidence >= 0.8 {
            ConfidenceLevel::High
        } else if confidence >= 0.7 {
            ConfidenceLevel::Moderate
        } else if confidence >= 0.6 {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::VeryLow
        }
    }
}

/// Audio-side quality inputs
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioQuality {
    /// Clarity score in [0, 10] (default 7)
    pub clarity_score: Option<f64>,
    /// Speaking rate (default 130)
    pub words_per_minute: Option<f64>,
}

/// Visual-side quality inputs
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualQuality {
    /// Fraction of frames with a detected face (default 0.8)
    pub face_visibility_ratio: Option<f64>,
    /// Lighting estimate in [0, 1] (default 0.8)
    pub lighting_quality: Option<f64>,
}

/// Recording metadata
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Vertical resolution in pixels (default 720)
    pub video_height: Option<u32>,
    /// Number of sessions the score is based on
    pub sample_size: usize,
}

impl Default for MediaMetadata {
    fn default() -> Self {
        Self {
            video_height: None,
            sample_size: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityBreakdown {
    pub video_quality: f64,
    pub audio_quality: f64,
    pub detection_quality: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceAssessment {
    /// Mean of the quality sub-scores, 3 decimals
    pub confidence_score: f64,
    pub confidence_level: ConfidenceLevel,
    pub quality_breakdown: QualityBreakdown,
}

/// Interval around one score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreInterval {
    pub score: f64,
    pub lower: f64,
    pub upper: f64,
    pub margin: f64,
}

/// Fairness adjustments applied to the inputs
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BiasFlags {
    pub accent_normalization_applied: bool,
    /// Clarity after accent tolerance, when it changed
    pub adjusted_clarity_score: Option<f64>,
    pub eye_contact_confidence_reduced: bool,
    pub lighting_quality: Option<f64>,
}

/// Confidence annotation of a set of scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceEnvelope {
    pub assessment: ConfidenceAssessment,
    pub intervals: BTreeMap<String, ScoreInterval>,
    pub flags: BiasFlags,
    pub mitigation_version: String,
}

impl ConfidenceEnvelope {
    pub fn label(&self) -> &'static str {
        self.assessment.confidence_level.as_str()
    }
}

/// Result of the accent tolerance rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccentAdjustment {
    pub clarity_score: f64,
    pub applied: bool,
}

/// Confidence estimator
///
/// Tier thresholds are fixed at construction; see [`ConfidenceEstimator::new`].
#[derive(Debug, Clone)]
pub struct ConfidenceEstimator {
    /// Resolution tiers (pixels): high ≥ 720, medium ≥ 480
    resolution_high: u32,
    resolution_medium: u32,

    /// Face detection tiers: high ≥ 0.9, medium ≥ 0.7
    face_rate_high: f64,
    face_rate_medium: f64,

    /// Accent tolerance: clarity below 6 with 100–180 wpm gains 0.5
    accent_clarity_ceiling: f64,
    accent_wpm_band: (f64, f64),
    accent_boost: f64,

    /// Lighting below 0.6 flags eye contact detection as unreliable
    lighting_floor: f64,
}

impl ConfidenceEstimator {
    pub fn new() -> Self {
        Self {
            resolution_high: 720,
            resolution_medium: 480,
            face_rate_high: 0.9,
            face_rate_medium: 0.7,
            accent_clarity_ceiling: 6.0,
            accent_wpm_band: (100.0, 180.0),
            accent_boost: 0.5,
            lighting_floor: 0.6,
        }
    }

    /// Quality-based confidence
    pub fn assess(
        &self,
        audio: &AudioQuality,
        visual: &VisualQuality,
        metadata: &MediaMetadata,
    ) -> ConfidenceAssessment {
        let height = metadata.video_height.unwrap_or(720);
        let video_quality = if height >= self.resolution_high {
            1.0
        } else if height >= self.resolution_medium {
            0.8
        } else {
            0.6
        };

        let clarity = audio.clarity_score.unwrap_or(7.0);
        let audio_quality = (clarity / 10.0).min(1.0);

        let face_ratio = visual.face_visibility_ratio.unwrap_or(0.8);
        let detection_quality = if face_ratio >= self.face_rate_high {
            1.0
        } else if face_ratio >= self.face_rate_medium {
            0.85
        } else {
            0.7
        };

        let confidence = (video_quality + audio_quality + detection_quality) / 3.0;

        ConfidenceAssessment {
            confidence_score: round_to(confidence, 3),
            confidence_level: ConfidenceLevel::from_confidence(confidence),
            quality_breakdown: QualityBreakdown {
                video_quality: round_to(video_quality, 2),
                audio_quality: round_to(audio_quality, 2),
                detection_quality: round_to(detection_quality, 2),
            },
        }
    }

    /// Interval for one score
    ///
    /// The score is clamped to the 0-10 scale first, so both bounds stay on it
    /// with `lower <= upper`. A non-finite confidence gives the widest margin.
    pub fn interval(&self, score: f64, confidence: f64, sample_size: usize) -> ScoreInterval {
        let score = clamp_score(score);
        let sample_factor = 1.0 / (sample_size.max(1) as f64).sqrt();
        let raw_margin = 0.5 * (1.0 - confidence) * sample_factor * 2.0;
        let margin = if raw_margin.is_finite() {
            raw_margin.clamp(MIN_MARGIN, MAX_MARGIN)
        } else {
            MAX_MARGIN
        };

        ScoreInterval {
            score: round_to(score, 2),
            lower: round_to(clamp_score(score - margin), 2),
            upper: round_to(clamp_score(score + margin), 2),
            margin: round_to(margin, 2),
        }
    }

    /// Accent tolerance: low clarity at a normal pace is given the benefit of the doubt
    pub fn normalize_for_accent(&self, clarity_score: f64, words_per_minute: Option<f64>) -> AccentAdjustment {
        let wpm = words_per_minute.unwrap_or(130.0);
        let (low, high) = self.accent_wpm_band;

        if clarity_score < self.accent_clarity_ceiling && (low..=high).contains(&wpm) {
            AccentAdjustment {
                clarity_score: (clarity_score + self.accent_boost).min(SCORE_MAX),
                applied: true,
            }
        } else {
            AccentAdjustment {
                clarity_score,
                applied: false,
            }
        }
    }

    /// Lighting tolerance: true when eye-contact confidence should be reduced
    pub fn normalize_for_lighting(&self, lighting_quality: Option<f64>) -> bool {
        lighting_quality.unwrap_or(0.8) < self.lighting_floor
    }

    /// Confidence envelope for `scores`
    ///
    /// Applies the fairness rules, assesses input quality and derives one
    /// interval per score.
    pub fn confidence(
        &self,
        audio: &AudioQuality,
        visual: &VisualQuality,
        metadata: &MediaMetadata,
        scores: &BTreeMap<String, f64>,
    ) -> ConfidenceEnvelope {
        let mut flags = BiasFlags::default();
        let mut audio = *audio;

        if let Some(clarity) = audio.clarity_score {
            let adjustment = self.normalize_for_accent(clarity, audio.words_per_minute);
            if adjustment.applied {
                tracing::debug!(
                    before = clarity,
                    after = adjustment.clarity_score,
                    "Accent tolerance applied to clarity"
                );
                flags.accent_normalization_applied = true;
                flags.adjusted_clarity_score = Some(adjustment.clarity_score);
                audio.clarity_score = Some(adjustment.clarity_score);
            }
        }

        if self.normalize_for_lighting(visual.lighting_quality) {
            flags.eye_contact_confidence_reduced = true;
            flags.lighting_quality = visual.lighting_quality;
        }

        let assessment = self.assess(&audio, visual, metadata);
        let intervals = scores
            .iter()
            .filter(|(_, score)| score.is_finite())
            .map(|(name, score)| {
                (
                    name.clone(),
                    self.interval(*score, assessment.confidence_score, metadata.sample_size),
                )
            })
            .collect();

        ConfidenceEnvelope {
            assessment,
            intervals,
            flags,
            mitigation_version: MITIGATION_VERSION.to_string(),
        }
    }
}

impl Default for ConfidenceEstimator {
    fn default() -> Self {
        Self::new()
    }
}
