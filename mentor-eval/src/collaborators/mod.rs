//! External collaborators of the evaluation pipeline
//!
//! **[ME-CO-010]** Every signal-extraction dependency sits behind an async,
//! object-safe trait so the orchestrator can be driven by real adapters in
//! production and by in-memory fakes in tests.
//!
//! Default adapters:
//! - [`media`]: local upload directory, `ffmpeg`/`ffprobe` subprocesses
//! - [`signal`]: PCM silence and clarity analysis (symphonia decode)
//! - [`http`]: Whisper-compatible STT, landmark sidecar, Gemini-style LLM

pub mod http;
pub mod media;
pub mod signal;

use async_trait::async_trait;
use mentor_common::config::TomlConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Collaborator errors
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Service not configured or not reachable
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Request failed: {0}")]
    Request(String),

    /// Service answered with something we cannot use
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Subprocess exited unsuccessfully
    #[error("Process failed: {0}")]
    Process(String),
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            CollaboratorError::Unavailable(err.to_string())
        } else {
            CollaboratorError::Request(err.to_string())
        }
    }
}

/// Timed transcript segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Speech-to-text output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
}

impl Transcript {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Pause analysis of the extracted audio
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SilenceAnalysis {
    /// Fraction of the recording spent in long pauses, [0, 1]
    pub silence_ratio: f64,
    pub total_silence_seconds: f64,
    pub duration_seconds: f64,
    pub pause_count: usize,
}

/// Signal-level clarity analysis
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClarityAnalysis {
    /// Clarity in [0, 10]
    pub clarity_score: f64,
    pub rms_mean: f64,
    pub rms_std: f64,
    pub spectral_centroid_hz: f64,
}

/// A frame written to disk by the sampler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledFrame {
    pub index: usize,
    pub timestamp_seconds: f64,
    pub path: PathBuf,
}

/// Result of frame sampling
#[derive(Debug, Clone, Default)]
pub struct FrameBatch {
    pub frames: Vec<SampledFrame>,
    /// Vertical resolution of the source video
    pub video_height: Option<u32>,
    /// Mean brightness estimate in [0, 1]
    pub lighting_quality: Option<f64>,
    /// Scratch directory to remove once frames are consumed
    pub work_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GazeDirection {
    Forward,
    Left,
    Right,
    Up,
    Down,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Per-frame visual detection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameObservation {
    #[serde(default)]
    pub timestamp_seconds: f64,
    #[serde(default)]
    pub face_detected: bool,
    #[serde(default)]
    pub gaze_direction: GazeDirection,
    #[serde(default)]
    pub hand_count: u32,
    /// Body movement magnitude in [0, 10]
    #[serde(default)]
    pub body_movement: f64,
}

/// Resolves a session's uploaded recording
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn resolve_video(&self, session_id: Uuid, filename: &str) -> Result<PathBuf, CollaboratorError>;
}

/// Extracts a mono WAV track from a recording
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    async fn extract_audio(&self, video: &Path) -> Result<PathBuf, CollaboratorError>;

    /// Release scratch resources held by the adapter
    async fn shutdown(&self) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript, CollaboratorError>;

    /// Model identifier recorded in completion metadata
    fn model_name(&self) -> String;
}

#[async_trait]
pub trait AudioAnalyzer: Send + Sync {
    async fn detect_silence(&self, audio: &Path) -> Result<SilenceAnalysis, CollaboratorError>;
    async fn analyze_clarity(&self, audio: &Path) -> Result<ClarityAnalysis, CollaboratorError>;
}

#[async_trait]
pub trait FrameSampler: Send + Sync {
    async fn sample_frames(
        &self,
        video: &Path,
        fps: f64,
        max_frames: usize,
    ) -> Result<FrameBatch, CollaboratorError>;

    /// Release scratch resources held by the adapter
    async fn shutdown(&self) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

#[async_trait]
pub trait VisualDetector: Send + Sync {
    async fn detect_visual_features(&self, frame: &SampledFrame) -> Result<FrameObservation, CollaboratorError>;
}

/// Text completion model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError>;

    fn model_name(&self) -> String;
}

/// Stand-in for a service with no configured endpoint
///
/// Every call fails with [`CollaboratorError::Unavailable`].
#[derive(Debug, Clone)]
pub struct Unconfigured {
    service: &'static str,
    model: String,
}

impl Unconfigured {
    pub fn new(service: &'static str, model: impl Into<String>) -> Self {
        Self {
            service,
            model: model.into(),
        }
    }

    fn error(&self) -> CollaboratorError {
        CollaboratorError::Unavailable(format!("{} endpoint not configured", self.service))
    }
}

#[async_trait]
impl SpeechToText for Unconfigured {
    async fn transcribe(&self, _audio: &Path) -> Result<Transcript, CollaboratorError> {
        Err(self.error())
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}

#[async_trait]
impl VisualDetector for Unconfigured {
    async fn detect_visual_features(&self, _frame: &SampledFrame) -> Result<FrameObservation, CollaboratorError> {
        Err(self.error())
    }
}

#[async_trait]
impl LanguageModel for Unconfigured {
    async fn complete(&self, _prompt: &str) -> Result<String, CollaboratorError> {
        Err(self.error())
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}

/// Collaborator bundle injected into the orchestrator
#[derive(Clone)]
pub struct Collaborators {
    pub media: Arc<dyn MediaStore>,
    pub audio_extractor: Arc<dyn AudioExtractor>,
    pub stt: Arc<dyn SpeechToText>,
    pub audio_analyzer: Arc<dyn AudioAnalyzer>,
    pub frame_sampler: Arc<dyn FrameSampler>,
    pub visual_detector: Arc<dyn VisualDetector>,
    pub llm: Arc<dyn LanguageModel>,
}

impl Collaborators {
    /// Default adapters for the given configuration
    ///
    /// Services without a configured endpoint are replaced by [`Unconfigured`].
    pub fn from_config(config: &TomlConfig, uploads_dir: PathBuf, scratch_dir: PathBuf) -> Result<Self, CollaboratorError> {
        let services = &config.services;

        let stt: Arc<dyn SpeechToText> = match &services.stt_url {
            Some(url) => Arc::new(http::WhisperClient::new(url, &config.models.whisper)?),
            None => {
                tracing::warn!("No STT endpoint configured; transcription will fail");
                Arc::new(Unconfigured::new("speech-to-text", &config.models.whisper))
            }
        };

        let visual_detector: Arc<dyn VisualDetector> = match &services.vision_url {
            Some(url) => Arc::new(http::VisionClient::new(url)?),
            None => {
                tracing::warn!("No vision endpoint configured; visual analysis will fail");
                Arc::new(Unconfigured::new("vision", "none"))
            }
        };

        let llm: Arc<dyn LanguageModel> = match &services.llm_api_key {
            Some(key) => Arc::new(http::GeminiClient::new(
                services.llm_url.as_deref(),
                &config.models.llm,
                key,
            )?),
            None => {
                tracing::warn!("No LLM API key configured; text evaluation and reports use fallbacks");
                Arc::new(Unconfigured::new("language model", &config.models.llm))
            }
        };

        Ok(Self {
            media: Arc::new(media::LocalMediaStore::new(uploads_dir)),
            audio_extractor: Arc::new(media::FfmpegAudioExtractor::new(scratch_dir.clone())),
            stt,
            audio_analyzer: Arc::new(signal::PcmAudioAnalyzer::new()),
            frame_sampler: Arc::new(media::FfmpegFrameSampler::new(scratch_dir)),
            visual_detector,
            llm,
        })
    }

    /// Release adapter resources on exit
    pub async fn shutdown(&self) {
        if let Err(e) = self.audio_extractor.shutdown().await {
            tracing::warn!(error = %e, "Audio extractor shutdown failed");
        }
        if let Err(e) = self.frame_sampler.shutdown().await {
            tracing::warn!(error = %e, "Frame sampler shutdown failed");
        }
        tracing::info!("Collaborators shut down");
    }
}
