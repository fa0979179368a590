//! Local media adapters
//!
//! Recordings live in the uploads directory under the root folder. Audio
//! extraction and frame sampling shell out to `ffmpeg` / `ffprobe`, which must
//! be on `PATH`; output goes to a scratch directory owned by the adapter.

use super::{AudioExtractor, CollaboratorError, FrameBatch, FrameSampler, MediaStore, SampledFrame};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use uuid::Uuid;

const FFMPEG: &str = "ffmpeg";
const FFPROBE: &str = "ffprobe";

/// Sample rate of extracted speech audio
pub const SPEECH_SAMPLE_RATE: u32 = 16_000;

/// Uploads directory on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalMediaStore {
    uploads_dir: PathBuf,
}

impl LocalMediaStore {
    pub fn new(uploads_dir: PathBuf) -> Self {
        Self { uploads_dir }
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn resolve_video(&self, session_id: Uuid, filename: &str) -> Result<PathBuf, CollaboratorError> {
        let name = Path::new(filename)
            .file_name()
            .ok_or_else(|| CollaboratorError::InvalidResponse(format!("Invalid filename: {}", filename)))?;

        // Uploads are stored either flat or in a per-session directory
        let candidates = [
            self.uploads_dir.join(session_id.to_string()).join(name),
            self.uploads_dir.join(name),
        ];

        for candidate in candidates {
            if tokio::fs::try_exists(&candidate).await? {
                tracing::debug!(session_id = %session_id, path = %candidate.display(), "Resolved recording");
                return Ok(candidate);
            }
        }

        Err(CollaboratorError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Recording not found in uploads: {}", filename),
        )))
    }
}

/// Run a blocking subprocess off the async runtime
async fn run_command(program: &'static str, args: Vec<String>) -> Result<Output, CollaboratorError> {
    let output = tokio::task::spawn_blocking(move || Command::new(program).args(&args).output())
        .await
        .map_err(|e| CollaboratorError::Process(format!("{} task panicked: {}", program, e)))?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CollaboratorError::Unavailable(format!("{} not found in PATH", program))
            } else {
                CollaboratorError::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr.lines().rev().take(3).collect::<Vec<_>>().join(" | ");
        return Err(CollaboratorError::Process(format!(
            "{} exit code {:?}: {}",
            program,
            output.status.code(),
            tail
        )));
    }

    Ok(output)
}

async fn remove_scratch(scratch_dir: &Path) -> Result<(), CollaboratorError> {
    match tokio::fs::remove_dir_all(scratch_dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Mono 16 kHz WAV extraction through `ffmpeg`
#[derive(Debug, Clone)]
pub struct FfmpegAudioExtractor {
    scratch_dir: PathBuf,
}

impl FfmpegAudioExtractor {
    pub fn new(scratch_dir: PathBuf) -> Self {
        Self { scratch_dir }
    }
}

#[async_trait]
impl AudioExtractor for FfmpegAudioExtractor {
    async fn extract_audio(&self, video: &Path) -> Result<PathBuf, CollaboratorError> {
        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        let output = self.scratch_dir.join(format!("audio_{}.wav", Uuid::new_v4()));

        let args = vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            video.display().to_string(),
            "-vn".to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-ar".to_string(),
            SPEECH_SAMPLE_RATE.to_string(),
            "-acodec".to_string(),
            "pcm_s16le".to_string(),
            output.display().to_string(),
        ];

        tracing::debug!(video = %video.display(), output = %output.display(), "Extracting audio");
        run_command(FFMPEG, args).await?;

        Ok(output)
    }

    async fn shutdown(&self) -> Result<(), CollaboratorError> {
        remove_scratch(&self.scratch_dir).await
    }
}

/// Frame sampling through `ffmpeg`, with `ffprobe` resolution and a luma-based
/// lighting estimate
#[derive(Debug, Clone)]
pub struct FfmpegFrameSampler {
    scratch_dir: PathBuf,
}

impl FfmpegFrameSampler {
    pub fn new(scratch_dir: PathBuf) -> Self {
        Self { scratch_dir }
    }

    async fn probe_height(video: &Path) -> Option<u32> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-select_streams".to_string(),
            "v:0".to_string(),
            "-show_entries".to_string(),
            "stream=height".to_string(),
            "-of".to_string(),
            "csv=p=0".to_string(),
            video.display().to_string(),
        ];

        match run_command(FFPROBE, args).await {
            Ok(output) => parse_probe_height(&String::from_utf8_lossy(&output.stdout)),
            Err(e) => {
                tracing::warn!(video = %video.display(), error = %e, "Resolution probe failed");
                None
            }
        }
    }

    async fn estimate_lighting(video: &Path, fps: f64) -> Option<f64> {
        let args = vec![
            "-loglevel".to_string(),
            "info".to_string(),
            "-i".to_string(),
            video.display().to_string(),
            "-vf".to_string(),
            format!("fps={},signalstats,metadata=print:key=lavfi.signalstats.YAVG", fps),
            "-f".to_string(),
            "null".to_string(),
            "-".to_string(),
        ];

        match run_command(FFMPEG, args).await {
            Ok(output) => lighting_from_luma(&String::from_utf8_lossy(&output.stderr)),
            Err(e) => {
                tracing::warn!(video = %video.display(), error = %e, "Lighting estimate failed");
                None
            }
        }
    }
}

#[async_trait]
impl FrameSampler for FfmpegFrameSampler {
    async fn sample_frames(
        &self,
        video: &Path,
        fps: f64,
        max_frames: usize,
    ) -> Result<FrameBatch, CollaboratorError> {
        if !(fps.is_finite() && fps > 0.0) {
            return Err(CollaboratorError::Process(format!("Invalid frame rate: {}", fps)));
        }

        let work_dir = self.scratch_dir.join(format!("frames_{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&work_dir).await?;

        let args = vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            video.display().to_string(),
            "-vf".to_string(),
            format!("fps={}", fps),
            "-frames:v".to_string(),
            max_frames.to_string(),
            work_dir.join("frame_%05d.jpg").display().to_string(),
        ];

        if let Err(e) = run_command(FFMPEG, args).await {
            let _ = tokio::fs::remove_dir_all(&work_dir).await;
            return Err(e);
        }

        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&work_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("jpg") {
                paths.push(path);
            }
        }
        paths.sort();

        let frames = paths
            .into_iter()
            .enumerate()
            .map(|(index, path)| SampledFrame {
                index,
                timestamp_seconds: index as f64 / fps,
                path,
            })
            .collect::<Vec<_>>();

        let video_height = Self::probe_height(video).await;
        let lighting_quality = Self::estimate_lighting(video, fps).await;

        tracing::debug!(
            video = %video.display(),
            frames = frames.len(),
            video_height = ?video_height,
            lighting_quality = ?lighting_quality,
            "Frames sampled"
        );

        Ok(FrameBatch {
            frames,
            video_height,
            lighting_quality,
            work_dir: Some(work_dir),
        })
    }

    async fn shutdown(&self) -> Result<(), CollaboratorError> {
        remove_scratch(&self.scratch_dir).await
    }
}

fn parse_probe_height(stdout: &str) -> Option<u32> {
    stdout
        .lines()
        .find_map(|line| line.trim().trim_end_matches(',').parse::<u32>().ok())
}

/// Mean `YAVG` over the printed frames, mapped so mid-grey (128) and above is 1.0
fn lighting_from_luma(log: &str) -> Option<f64> {
    const KEY: &str = "lavfi.signalstats.YAVG=";

    let values: Vec<f64> = log
        .lines()
        .filter_map(|line| line.find(KEY).map(|pos| &line[pos + KEY.len()..]))
        .filter_map(|value| value.trim().parse::<f64>().ok())
        .collect();

    if values.is_empty() {
        return None;
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some((mean / 128.0).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_probe_height() {
        assert_eq!(parse_probe_height("720\n"), Some(720));
        assert_eq!(parse_probe_height("1080,\n"), Some(1080));
        assert_eq!(parse_probe_height("N/A\n"), None);
    }

    #[test]
    fn test_lighting_from_luma() {
        let log = "[Parsed_metadata_2 @ 0x1] frame:0 pts:0\n\
                   [Parsed_metadata_2 @ 0x1] lavfi.signalstats.YAVG=64.0\n\
                   [Parsed_metadata_2 @ 0x1] lavfi.signalstats.YAVG=32.0\n";
        assert_eq!(lighting_from_luma(log), Some(0.375));

        let bright = "lavfi.signalstats.YAVG=200.5\n";
        assert_eq!(lighting_from_luma(bright), Some(1.0));

        assert_eq!(lighting_from_luma("no stats"), None);
    }

    #[tokio::test]
    async fn test_resolve_video_flat_and_session_dirs() {
        let temp = TempDir::new().unwrap();
        let store = LocalMediaStore::new(temp.path().to_path_buf());
        let session_id = Uuid::new_v4();

        std::fs::write(temp.path().join("flat.mp4"), b"x").unwrap();
        let nested = temp.path().join(session_id.to_string());
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("nested.mp4"), b"x").unwrap();

        assert_eq!(
            store.resolve_video(session_id, "flat.mp4").await.unwrap(),
            temp.path().join("flat.mp4")
        );
        assert_eq!(
            store.resolve_video(session_id, "nested.mp4").await.unwrap(),
            nested.join("nested.mp4")
        );
        assert!(store.resolve_video(session_id, "missing.mp4").await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_video_strips_directories() {
        let temp = TempDir::new().unwrap();
        let store = LocalMediaStore::new(temp.path().join("uploads"));
        std::fs::write(temp.path().join("secret.mp4"), b"x").unwrap();

        assert!(store
            .resolve_video(Uuid::new_v4(), "../secret.mp4")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_scratch_shutdown_tolerates_missing_dir() {
        let temp = TempDir::new().unwrap();
        let extractor = FfmpegAudioExtractor::new(temp.path().join("never-created"));
        assert!(extractor.shutdown().await.is_ok());
    }
}
