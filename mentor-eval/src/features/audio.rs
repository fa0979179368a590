//! Audio modality scoring
//!
//! **[ME-AU-010]** Speaking rate from transcript segment timing; pace, pause
//! and clarity sub-scores combined 0.4 / 0.2 / 0.4 into `audio_overall`.

use crate::collaborators::{ClarityAnalysis, SilenceAnalysis, TranscriptSegment};
use crate::scoring::{clamp_score, round_to, RawScores};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Spans shorter than this give no speaking rate
const MIN_WPM_SPAN_SECS: f64 = 5.0;

/// Ideal pace band (words per minute)
const WPM_IDEAL: (f64, f64) = (120.0, 150.0);

/// Pause ratio tolerated without penalty
const SILENCE_TOLERANCE: f64 = 0.15;

const WEIGHT_WPM: f64 = 0.4;
const WEIGHT_SILENCE: f64 = 0.2;
const WEIGHT_CLARITY: f64 = 0.4;

/// Words per minute over the transcript's timed span
///
/// `None` when there are no segments or the span is under 5 seconds.
pub fn calculate_wpm(segments: &[TranscriptSegment]) -> Option<f64> {
    let (first, last) = (segments.first()?, segments.last()?);
    let span = last.end - first.start;

    if !span.is_finite() || span < MIN_WPM_SPAN_SECS {
        tracing::warn!(span_seconds = span, "Transcript span too short for speaking rate");
        return None;
    }

    let words: usize = segments
        .iter()
        .map(|s| s.text.split_whitespace().count())
        .sum();

    Some(round_to(words as f64 / (span / 60.0), 2))
}

/// Pace sub-score; an unknown pace scores 0
pub fn wpm_score(words_per_minute: Option<f64>) -> f64 {
    let Some(wpm) = words_per_minute else {
        return 0.0;
    };
    let (low, high) = WPM_IDEAL;

    let score = if (low..=high).contains(&wpm) {
        10.0
    } else if wpm > high {
        (10.0 - (wpm - high) * 0.2).max(0.0)
    } else {
        (10.0 - (low - wpm) * 0.1).max(0.0)
    };
    round_to(score, 2)
}

/// Pause sub-score
pub fn silence_score(silence_ratio: f64) -> f64 {
    let score = if silence_ratio <= SILENCE_TOLERANCE {
        10.0
    } else {
        (10.0 - (silence_ratio - SILENCE_TOLERANCE) * 20.0).max(0.0)
    };
    round_to(score, 2)
}

/// Audio modality scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioScores {
    pub wpm_score: f64,
    pub silence_score: f64,
    pub clarity_score: f64,
    pub audio_overall: f64,
    pub words_per_minute: Option<f64>,
    pub silence_ratio: f64,
}

pub fn compute_audio_scores(
    words_per_minute: Option<f64>,
    silence: &SilenceAnalysis,
    clarity: &ClarityAnalysis,
) -> AudioScores {
    let wpm = wpm_score(words_per_minute);
    let pause = silence_score(silence.silence_ratio);
    let clarity_score = round_to(clamp_score(clarity.clarity_score), 2);

    let audio_overall = round_to(
        wpm * WEIGHT_WPM + pause * WEIGHT_SILENCE + clarity_score * WEIGHT_CLARITY,
        2,
    );

    tracing::debug!(
        wpm_score = wpm,
        silence_score = pause,
        clarity_score,
        audio_overall,
        "Audio scores computed"
    );

    AudioScores {
        wpm_score: wpm,
        silence_score: pause,
        clarity_score,
        audio_overall,
        words_per_minute,
        silence_ratio: silence.silence_ratio,
    }
}

impl AudioScores {
    /// Stored score set: the four scores fusion reads
    pub fn score_set(&self) -> RawScores {
        [
            ("wpm_score", self.wpm_score),
            ("silence_score", self.silence_score),
            ("clarity_score", self.clarity_score),
            ("audio_overall", self.audio_overall),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect()
    }

    /// Debug payload stored alongside the score set
    pub fn raw_payload(&self, silence: &SilenceAnalysis, clarity: &ClarityAnalysis) -> Value {
        json!({
            "wpm": self.words_per_minute,
            "silence_ratio": self.silence_ratio,
            "silence": silence,
            "clarity": clarity,
        })
    }
}
