//! In-memory collaborators with call counters

use async_trait::async_trait;
use mentor_eval::collaborators::{
    AudioAnalyzer, AudioExtractor, ClarityAnalysis, CollaboratorError, Collaborators, FrameBatch,
    FrameObservation, FrameSampler, GazeDirection, LanguageModel, MediaStore, SampledFrame, SilenceAnalysis,
    SpeechToText, Transcript, TranscriptSegment, VisualDetector,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Number of calls each collaborator received
#[derive(Debug, Default)]
pub struct CallCounts {
    pub extract_audio: AtomicUsize,
    pub transcribe: AtomicUsize,
    pub detect_silence: AtomicUsize,
    pub analyze_clarity: AtomicUsize,
    pub sample_frames: AtomicUsize,
    pub detect_frame: AtomicUsize,
    pub text_prompts: AtomicUsize,
    pub report_prompts: AtomicUsize,
}

impl CallCounts {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Total collaborator work across a run
    pub fn total(&self) -> usize {
        [
            &self.extract_audio,
            &self.transcribe,
            &self.detect_silence,
            &self.analyze_clarity,
            &self.sample_frames,
            &self.detect_frame,
            &self.text_prompts,
            &self.report_prompts,
        ]
        .into_iter()
        .map(Self::get)
        .sum()
    }
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

/// LLM behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmMode {
    /// Valid JSON for both prompts
    Healthy,
    /// Prose instead of JSON
    Garbage,
    /// Every call fails
    Down,
}

/// Knobs for one mock collaborator bundle
#[derive(Debug, Clone)]
pub struct MockSetup {
    pub stt_fails: bool,
    pub clarity_fails: bool,
    pub detector_fails: bool,
    pub frames: usize,
    pub llm: LlmMode,
}

impl Default for MockSetup {
    fn default() -> Self {
        Self {
            stt_fails: false,
            clarity_fails: false,
            detector_fails: false,
            frames: 10,
            llm: LlmMode::Healthy,
        }
    }
}

impl MockSetup {
    pub fn build(&self) -> (Collaborators, Arc<CallCounts>) {
        let counts = Arc::new(CallCounts::default());
        let collaborators = Collaborators {
            media: Arc::new(MockMedia),
            audio_extractor: Arc::new(MockExtractor {
                counts: counts.clone(),
            }),
            stt: Arc::new(MockStt {
                counts: counts.clone(),
                fail: self.stt_fails,
            }),
            audio_analyzer: Arc::new(MockAnalyzer {
                counts: counts.clone(),
                clarity_fails: self.clarity_fails,
            }),
            frame_sampler: Arc::new(MockSampler {
                counts: counts.clone(),
                frames: self.frames,
            }),
            visual_detector: Arc::new(MockDetector {
                counts: counts.clone(),
                fail: self.detector_fails,
            }),
            llm: Arc::new(MockLlm {
                counts: counts.clone(),
                mode: self.llm,
            }),
        };
        (collaborators, counts)
    }
}

pub struct MockMedia;

#[async_trait]
impl MediaStore for MockMedia {
    async fn resolve_video(&self, _session_id: Uuid, filename: &str) -> Result<PathBuf, CollaboratorError> {
        Ok(PathBuf::from("/nonexistent/uploads").join(filename))
    }
}

pub struct MockExtractor {
    counts: Arc<CallCounts>,
}

#[async_trait]
impl AudioExtractor for MockExtractor {
    async fn extract_audio(&self, video: &Path) -> Result<PathBuf, CollaboratorError> {
        bump(&self.counts.extract_audio);
        Ok(video.with_extension("wav"))
    }
}

/// 130 words spoken over one minute
pub fn lecture_transcript() -> Transcript {
    let half = vec!["recursion"; 65].join(" ");
    Transcript {
        text: format!("{} {}", half, half),
        segments: vec![
            TranscriptSegment {
                start: 0.0,
                end: 30.0,
                text: half.clone(),
            },
            TranscriptSegment {
                start: 30.0,
                end: 60.0,
                text: half,
            },
        ],
    }
}

pub struct MockStt {
    counts: Arc<CallCounts>,
    fail: bool,
}

#[async_trait]
impl SpeechToText for MockStt {
    async fn transcribe(&self, _audio: &Path) -> Result<Transcript, CollaboratorError> {
        bump(&self.counts.transcribe);
        if self.fail {
            return Err(CollaboratorError::Unavailable("whisper offline".to_string()));
        }
        Ok(lecture_transcript())
    }

    fn model_name(&self) -> String {
        "mock-whisper".to_string()
    }
}

pub struct MockAnalyzer {
    counts: Arc<CallCounts>,
    clarity_fails: bool,
}

#[async_trait]
impl AudioAnalyzer for MockAnalyzer {
    async fn detect_silence(&self, _audio: &Path) -> Result<SilenceAnalysis, CollaboratorError> {
        bump(&self.counts.detect_silence);
        Ok(SilenceAnalysis {
            silence_ratio: 0.10,
            total_silence_seconds: 6.0,
            duration_seconds: 60.0,
            pause_count: 3,
        })
    }

    async fn analyze_clarity(&self, _audio: &Path) -> Result<ClarityAnalysis, CollaboratorError> {
        bump(&self.counts.analyze_clarity);
        if self.clarity_fails {
            return Err(CollaboratorError::Process("decoder crashed".to_string()));
        }
        Ok(ClarityAnalysis {
            clarity_score: 8.0,
            rms_mean: 0.1,
            rms_std: 0.05,
            spectral_centroid_hz: 1800.0,
        })
    }
}

pub struct MockSampler {
    counts: Arc<CallCounts>,
    frames: usize,
}

#[async_trait]
impl FrameSampler for MockSampler {
    async fn sample_frames(
        &self,
        video: &Path,
        _fps: f64,
        max_frames: usize,
    ) -> Result<FrameBatch, CollaboratorError> {
        bump(&self.counts.sample_frames);
        let frames = (0..self.frames.min(max_frames))
            .map(|index| SampledFrame {
                index,
                timestamp_seconds: index as f64 * 6.0,
                path: video.with_file_name(format!("frame_{:04}.jpg", index)),
            })
            .collect();

        Ok(FrameBatch {
            frames,
            video_height: Some(1080),
            lighting_quality: Some(0.9),
            work_dir: None,
        })
    }
}

pub struct MockDetector {
    counts: Arc<CallCounts>,
    fail: bool,
}

#[async_trait]
impl VisualDetector for MockDetector {
    async fn detect_visual_features(&self, frame: &SampledFrame) -> Result<FrameObservation, CollaboratorError> {
        bump(&self.counts.detect_frame);
        if self.fail {
            return Err(CollaboratorError::Request("sidecar returned 500".to_string()));
        }
        Ok(FrameObservation {
            timestamp_seconds: frame.timestamp_seconds,
            face_detected: frame.index % 10 != 9,
            gaze_direction: if frame.index % 5 == 4 {
                GazeDirection::Left
            } else {
                GazeDirection::Forward
            },
            hand_count: if frame.index % 10 < 3 { 1 } else { 0 },
            body_movement: 5.0,
        })
    }
}

pub const TEXT_RESPONSE: &str = r#"{
    "clarity_score": 9,
    "structure_score": 8,
    "technical_correctness_score": 9,
    "explanation_quality_score": 8,
    "summary": "Clear walkthrough of recursion with a worked example."
}"#;

pub const REPORT_RESPONSE: &str = r#"```json
{
    "summary": "A confident, well paced lesson.",
    "strengths": ["Steady pace", "Accurate content"],
    "improvements": ["Ask the class more questions"],
    "actionable_tips": ["Pause after each example for questions"]
}
```"#;

pub struct MockLlm {
    counts: Arc<CallCounts>,
    mode: LlmMode,
}

#[async_trait]
impl LanguageModel for MockLlm {
    async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError> {
        let is_report = prompt.contains("teaching coach");
        if is_report {
            bump(&self.counts.report_prompts);
        } else {
            bump(&self.counts.text_prompts);
        }

        match self.mode {
            LlmMode::Healthy if is_report => Ok(REPORT_RESPONSE.to_string()),
            LlmMode::Healthy => Ok(TEXT_RESPONSE.to_string()),
            LlmMode::Garbage => Ok("I think the lesson went fine overall.".to_string()),
            LlmMode::Down => Err(CollaboratorError::Unavailable("quota exceeded".to_string())),
        }
    }

    fn model_name(&self) -> String {
        "mock-llm".to_string()
    }
}
