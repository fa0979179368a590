//! HTTP inference clients
//!
//! - [`WhisperClient`]: OpenAI-compatible `/v1/audio/transcriptions`
//!   (`response_format=verbose_json`)
//! - [`VisionClient`]: landmark-detection sidecar, `POST /detect` with one image
//! - [`GeminiClient`]: `generateContent` text completion

use super::{
    CollaboratorError, FrameObservation, LanguageModel, SampledFrame, SpeechToText, Transcript,
    TranscriptSegment, VisualDetector,
};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const USER_AGENT: &str = concat!("mentor-eval/", env!("CARGO_PKG_VERSION"));
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

fn build_client(timeout_secs: u64) -> Result<reqwest::Client, CollaboratorError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| CollaboratorError::Request(format!("Failed to build HTTP client: {}", e)))
}

async fn file_part(path: &Path, mime: &str) -> Result<Part, CollaboratorError> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .to_string();

    Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(mime)
        .map_err(|e| CollaboratorError::Request(e.to_string()))
}

/// Fail with the response body on a non-2xx status
async fn check_status(response: reqwest::Response, service: &str) -> Result<reqwest::Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        Err(CollaboratorError::Unavailable(format!("{} returned {}: {}", service, status, snippet)))
    } else {
        Err(CollaboratorError::Request(format!("{} returned {}: {}", service, status, snippet)))
    }
}

/// Whisper verbose_json response
#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    #[serde(default)]
    text: String,
}

impl From<WhisperResponse> for Transcript {
    fn from(response: WhisperResponse) -> Self {
        Transcript {
            text: response.text.trim().to_string(),
            segments: response
                .segments
                .into_iter()
                .map(|s| TranscriptSegment {
                    start: s.start,
                    end: s.end,
                    text: s.text,
                })
                .collect(),
        }
    }
}

/// Speech-to-text over a Whisper-compatible server
pub struct WhisperClient {
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl WhisperClient {
    pub fn new(base_url: &str, model: &str) -> Result<Self, CollaboratorError> {
        Ok(Self {
            http_client: build_client(600)?,
            endpoint: format!("{}/v1/audio/transcriptions", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl SpeechToText for WhisperClient {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript, CollaboratorError> {
        let form = Form::new()
            .part("file", file_part(audio, "audio/wav").await?)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        tracing::debug!(endpoint = %self.endpoint, audio = %audio.display(), "Requesting transcription");

        let response = self
            .http_client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;
        let response = check_status(response, "STT").await?;

        let body: WhisperResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse(format!("Transcription body: {}", e)))?;

        let transcript = Transcript::from(body);
        tracing::debug!(
            segments = transcript.segments.len(),
            words = transcript.word_count(),
            "Transcription received"
        );
        Ok(transcript)
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}

/// Landmark-detection sidecar client
pub struct VisionClient {
    http_client: reqwest::Client,
    endpoint: String,
}

impl VisionClient {
    pub fn new(base_url: &str) -> Result<Self, CollaboratorError> {
        Ok(Self {
            http_client: build_client(30)?,
            endpoint: format!("{}/detect", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl VisualDetector for VisionClient {
    async fn detect_visual_features(&self, frame: &SampledFrame) -> Result<FrameObservation, CollaboratorError> {
        let form = Form::new().part("image", file_part(&frame.path, "image/jpeg").await?);

        let response = self
            .http_client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;
        let response = check_status(response, "Vision").await?;

        let mut observation: FrameObservation = response
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse(format!("Detection body: {}", e)))?;
        observation.timestamp_seconds = frame.timestamp_seconds;

        Ok(observation)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    fn into_text(self) -> Option<String> {
        let text: String = self
            .candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect();
        (!text.is_empty()).then_some(text)
    }
}

/// Gemini-style text completion
pub struct GeminiClient {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiClient {
    /// `base_url` defaults to the public Generative Language API
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Result<Self, CollaboratorError> {
        Ok(Self {
            http_client: build_client(120)?,
            base_url: base_url.unwrap_or(GEMINI_BASE_URL).trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            temperature: 0.2,
            max_output_tokens: 2000,
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "Calling language model");

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;
        let response = check_status(response, "LLM").await?;

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse(format!("Completion body: {}", e)))?;

        body.into_text()
            .ok_or_else(|| CollaboratorError::InvalidResponse("Completion had no text candidates".to_string()))
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}
