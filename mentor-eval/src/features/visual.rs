//! Visual modality scoring
//!
//! **[ME-VI-010]** Frame observations aggregate into engagement metrics, which
//! map onto face, gaze, gesture and movement sub-scores. `visual_overall`
//! weighs them 0.35 / 0.25 / 0.20 / 0.20.

use crate::collaborators::{FrameObservation, GazeDirection};
use crate::scoring::{clamp_score, round_to, RawScores};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Frames per minute assumed when timestamps cannot give a duration
const FALLBACK_FRAMES_PER_MINUTE: f64 = 120.0;

/// Comfortable body movement band on the 0–10 activity scale
const MOVEMENT_BAND: (f64, f64) = (3.0, 7.0);

/// Session-level engagement metrics
///
/// Deserializing a partial payload fills neutral defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementMetrics {
    #[serde(default = "default_half")]
    pub face_visibility_ratio: f64,
    /// Share of face frames looking forward
    #[serde(default = "default_half")]
    pub gaze_forward_ratio: f64,
    /// Frames with hands per minute
    #[serde(default)]
    pub hand_movement_frequency: f64,
    #[serde(default = "default_movement")]
    pub body_movement_activity: f64,
    #[serde(default = "default_gesture")]
    pub gesture_activity_ratio: f64,
    #[serde(default)]
    pub frames_analyzed: usize,
}

fn default_half() -> f64 {
    0.5
}

fn default_gesture() -> f64 {
    0.3
}

fn default_movement() -> f64 {
    5.0
}

impl Default for EngagementMetrics {
    fn default() -> Self {
        Self {
            face_visibility_ratio: default_half(),
            gaze_forward_ratio: default_half(),
            hand_movement_frequency: 0.0,
            body_movement_activity: default_movement(),
            gesture_activity_ratio: default_gesture(),
            frames_analyzed: 0,
        }
    }
}

/// Aggregate frame observations; no frames yields all zeros
pub fn aggregate_engagement(frames: &[FrameObservation]) -> EngagementMetrics {
    if frames.is_empty() {
        tracing::warn!("No frames provided for engagement analysis");
        return EngagementMetrics {
            face_visibility_ratio: 0.0,
            gaze_forward_ratio: 0.0,
            hand_movement_frequency: 0.0,
            body_movement_activity: 0.0,
            gesture_activity_ratio: 0.0,
            frames_analyzed: 0,
        };
    }

    let total = frames.len() as f64;
    let faces = frames.iter().filter(|f| f.face_detected).count();
    let forward = frames
        .iter()
        .filter(|f| f.face_detected && f.gaze_direction == GazeDirection::Forward)
        .count();
    let hand_frames = frames.iter().filter(|f| f.hand_count > 0).count();
    let movements: Vec<f64> = frames
        .iter()
        .map(|f| f.body_movement)
        .filter(|m| m.is_finite())
        .collect();

    let duration_minutes = estimate_duration_minutes(frames);
    let hand_movement_frequency = if duration_minutes > 0.0 {
        hand_frames as f64 / duration_minutes
    } else {
        hand_frames as f64
    };

    EngagementMetrics {
        face_visibility_ratio: round_to(faces as f64 / total, 3),
        gaze_forward_ratio: if faces > 0 {
            round_to(forward as f64 / faces as f64, 3)
        } else {
            0.0
        },
        hand_movement_frequency: round_to(hand_movement_frequency, 2),
        body_movement_activity: if movements.is_empty() {
            0.0
        } else {
            round_to(movements.iter().sum::<f64>() / movements.len() as f64, 2)
        },
        gesture_activity_ratio: round_to(hand_frames as f64 / total, 3),
        frames_analyzed: frames.len(),
    }
}

fn estimate_duration_minutes(frames: &[FrameObservation]) -> f64 {
    if frames.len() < 2 {
        return frames.len() as f64 / FALLBACK_FRAMES_PER_MINUTE;
    }

    let (min, max) = frames
        .iter()
        .map(|f| f.timestamp_seconds)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), t| (lo.min(t), hi.max(t)));

    (max - min) / 60.0
}

/// Visual modality scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualScores {
    pub face_visibility_score: f64,
    pub gaze_forward_score: f64,
    pub gesture_score: f64,
    pub movement_score: f64,
    pub visual_overall: f64,
}

impl VisualScores {
    pub fn score_set(&self) -> RawScores {
        [
            ("face_visibility_score", self.face_visibility_score),
            ("gaze_forward_score", self.gaze_forward_score),
            ("gesture_score", self.gesture_score),
            ("movement_score", self.movement_score),
            ("visual_overall", self.visual_overall),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect()
    }
}

/// Gesture frequency component, peaking at 4.0 for 10–40 hand frames per minute
fn frequency_component(frequency: f64) -> f64 {
    if frequency <= 10.0 {
        0.4 * frequency
    } else if frequency <= 40.0 {
        4.0
    } else {
        (4.0 - (frequency - 40.0) * 0.05).max(0.0)
    }
}

fn movement_score(activity: f64) -> f64 {
    let (low, high) = MOVEMENT_BAND;
    if (low..=high).contains(&activity) {
        10.0
    } else if activity < low {
        activity * 3.33
    } else {
        (10.0 - (activity - high) * 1.5).max(0.0)
    }
}

pub fn compute_visual_scores(metrics: &EngagementMetrics) -> VisualScores {
    let face = clamp_score(metrics.face_visibility_ratio * 10.0);
    let gaze = clamp_score(metrics.gaze_forward_ratio * 10.0);
    let gesture = clamp_score(
        metrics.gesture_activity_ratio * 10.0 * 0.6 + frequency_component(metrics.hand_movement_frequency),
    );
    let movement = clamp_score(movement_score(metrics.body_movement_activity));

    let overall = clamp_score(face * 0.35 + gaze * 0.25 + gesture * 0.20 + movement * 0.20);

    VisualScores {
        face_visibility_score: round_to(face, 2),
        gaze_forward_score: round_to(gaze, 2),
        gesture_score: round_to(gesture, 2),
        movement_score: round_to(movement, 2),
        visual_overall: round_to(overall, 2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(t: f64, face: bool, gaze: GazeDirection, hands: u32, movement: f64) -> FrameObservation {
        FrameObservation {
            timestamp_seconds: t,
            face_detected: face,
            gaze_direction: gaze,
            hand_count: hands,
            body_movement: movement,
        }
    }

    #[test]
    fn test_empty_frames_yield_zeros() {
        let metrics = aggregate_engagement(&[]);
        assert_eq!(metrics.face_visibility_ratio, 0.0);
        assert_eq!(metrics.body_movement_activity, 0.0);
        assert_eq!(metrics.frames_analyzed, 0);
    }

    #[test]
    fn test_aggregate_engagement() {
        let frames = vec![
            frame(0.0, true, GazeDirection::Forward, 1, 4.0),
            frame(30.0, true, GazeDirection::Left, 0, 6.0),
            frame(60.0, false, GazeDirection::Unknown, 2, 5.0),
            frame(120.0, true, GazeDirection::Forward, 0, 5.0),
        ];
        let metrics = aggregate_engagement(&frames);

        assert_eq!(metrics.face_visibility_ratio, 0.75);
        assert_eq!(metrics.gaze_forward_ratio, 0.667);
        // 2 hand frames over 2 minutes
        assert_eq!(metrics.hand_movement_frequency, 1.0);
        assert_eq!(metrics.body_movement_activity, 5.0);
        assert_eq!(metrics.gesture_activity_ratio, 0.5);
    }

    #[test]
    fn test_single_frame_duration_fallback() {
        let metrics = aggregate_engagement(&[frame(0.0, true, GazeDirection::Forward, 1, 5.0)]);
        // one hand frame over 1/120 minute
        assert_eq!(metrics.hand_movement_frequency, 120.0);
    }

    #[test]
    fn test_reference_visual_scores() {
        let metrics = EngagementMetrics {
            face_visibility_ratio: 0.9,
            gaze_forward_ratio: 0.8,
            hand_movement_frequency: 0.0,
            body_movement_activity: 5.0,
            gesture_activity_ratio: 0.3,
            frames_analyzed: 10,
        };
        let scores = compute_visual_scores(&metrics);

        assert_eq!(scores.face_visibility_score, 9.0);
        assert_eq!(scores.gaze_forward_score, 8.0);
        assert_eq!(scores.gesture_score, 1.8);
        assert_eq!(scores.movement_score, 10.0);
        assert_eq!(scores.visual_overall, 7.51);
    }

    #[test]
    fn test_partial_metrics_use_defaults() {
        let metrics: EngagementMetrics = serde_json::from_str(r#"{"face_visibility_ratio": 1.0}"#).unwrap();
        assert_eq!(metrics.gaze_forward_ratio, 0.5);
        assert_eq!(metrics.gesture_activity_ratio, 0.3);
        assert_eq!(metrics.body_movement_activity, 5.0);
    }

    #[test]
    fn test_movement_and_frequency_curves() {
        assert_eq!(round_to(movement_score(1.0), 2), 3.33);
        assert_eq!(movement_score(9.0), 7.0);
        assert_eq!(movement_score(20.0), 0.0);

        assert_eq!(frequency_component(5.0), 2.0);
        assert_eq!(frequency_component(25.0), 4.0);
        assert_eq!(round_to(frequency_component(60.0), 2), 3.0);
        assert_eq!(frequency_component(200.0), 0.0);
    }

    #[test]
    fn test_scores_clamped() {
        let metrics = EngagementMetrics {
            face_visibility_ratio: 1.0,
            gaze_forward_ratio: 1.0,
            hand_movement_frequency: 25.0,
            body_movement_activity: 5.0,
            gesture_activity_ratio: 1.0,
            frames_analyzed: 1,
        };
        let scores = compute_visual_scores(&metrics);
        assert_eq!(scores.gesture_score, 10.0);
        assert_eq!(scores.visual_overall, 10.0);
    }
}
