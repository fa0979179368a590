//! PCM signal analysis of extracted speech audio
//!
//! **[ME-AU-020]** Long-pause detection: RMS windows below -40 dBFS lasting at
//! least 0.8 s count as silence. Recordings shorter than 2 s report no silence.
//!
//! **[ME-AU-030]** Clarity: RMS frame statistics (2048 / 512) plus a
//! zero-crossing approximation of the spectral centroid.
//!
//! Decoding uses symphonia and runs on the blocking pool.

use super::{AudioAnalyzer, ClarityAnalysis, CollaboratorError, SilenceAnalysis};
use crate::scoring::round_to;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::FromSample;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;

/// Decoded mono audio
#[derive(Debug)]
pub struct DecodedAudio {
    /// Mono samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.samples.len() as f64 / self.sample_rate as f64
        }
    }
}

/// Decode an audio file to mono f32 PCM
pub fn decode_mono(path: &Path) -> Result<DecodedAudio, CollaboratorError> {
    let decode_err = |what: &str, e: symphonia::core::errors::Error| {
        CollaboratorError::InvalidResponse(format!("{} {}: {}", what, path.display(), e))
    };

    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| decode_err("Failed to probe", e))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| CollaboratorError::InvalidResponse(format!("No audio track in {}", path.display())))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| CollaboratorError::InvalidResponse(format!("Unknown sample rate in {}", path.display())))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err("No decoder for", e))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(decode_err("Failed to read packet from", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| decode_err("Failed to decode packet in", e))?;
        append_mono(&decoded, &mut samples);
    }

    tracing::debug!(
        path = %path.display(),
        sample_rate,
        samples = samples.len(),
        "Audio decoded"
    );

    Ok(DecodedAudio { samples, sample_rate })
}

fn append_mono(decoded: &AudioBufferRef, out: &mut Vec<f32>) {
    match decoded {
        AudioBufferRef::U8(buf) => mix_down(&**buf, out),
        AudioBufferRef::U16(buf) => mix_down(&**buf, out),
        AudioBufferRef::U24(buf) => mix_down(&**buf, out),
        AudioBufferRef::U32(buf) => mix_down(&**buf, out),
        AudioBufferRef::S8(buf) => mix_down(&**buf, out),
        AudioBufferRef::S16(buf) => mix_down(&**buf, out),
        AudioBufferRef::S24(buf) => mix_down(&**buf, out),
        AudioBufferRef::S32(buf) => mix_down(&**buf, out),
        AudioBufferRef::F32(buf) => mix_down(&**buf, out),
        AudioBufferRef::F64(buf) => mix_down(&**buf, out),
    }
}

/// Average all channels into one
fn mix_down<S>(buf: &AudioBuffer<S>, out: &mut Vec<f32>)
where
    S: Sample,
    f32: FromSample<S>,
{
    let channels = buf.spec().channels.count();
    if channels == 0 {
        return;
    }

    out.reserve(buf.frames());
    for frame in 0..buf.frames() {
        let sum: f32 = (0..channels).map(|ch| f32::from_sample(buf.chan(ch)[frame])).sum();
        out.push(sum / channels as f32);
    }
}

fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_squares / samples.len() as f64).sqrt()
}

fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Long-pause detector
#[derive(Debug, Clone)]
pub struct SilenceDetector {
    /// Silence threshold in dBFS (default -40)
    threshold_db: f64,
    /// Minimum pause length in seconds (default 0.8)
    min_duration_sec: f64,
    /// RMS window length in seconds (default 10 ms)
    window_sec: f64,
    /// Recordings shorter than this report no silence (default 2 s)
    min_audio_sec: f64,
}

impl SilenceDetector {
    pub fn new() -> Self {
        Self {
            threshold_db: -40.0,
            min_duration_sec: 0.8,
            window_sec: 0.01,
            min_audio_sec: 2.0,
        }
    }

    pub fn analyze(&self, samples: &[f32], sample_rate: u32) -> SilenceAnalysis {
        if sample_rate == 0 {
            return SilenceAnalysis::default();
        }

        let duration_seconds = samples.len() as f64 / sample_rate as f64;
        if duration_seconds < self.min_audio_sec {
            tracing::warn!(duration_seconds, "Audio too short for silence detection");
            return SilenceAnalysis {
                duration_seconds,
                ..Default::default()
            };
        }

        let threshold = db_to_linear(self.threshold_db);
        let window = ((self.window_sec * sample_rate as f64) as usize).max(1);
        let min_samples = (self.min_duration_sec * sample_rate as f64) as usize;

        let mut silent_samples = 0usize;
        let mut pause_count = 0usize;
        let mut run_start: Option<usize> = None;

        let mut close_run = |start: usize, end: usize| {
            if end - start >= min_samples {
                silent_samples += end - start;
                pause_count += 1;
            }
        };

        for (idx, chunk) in samples.chunks(window).enumerate() {
            let position = idx * window;
            if rms(chunk) < threshold {
                run_start.get_or_insert(position);
            } else if let Some(start) = run_start.take() {
                close_run(start, position);
            }
        }
        if let Some(start) = run_start {
            close_run(start, samples.len());
        }

        let total_silence_seconds = silent_samples as f64 / sample_rate as f64;

        SilenceAnalysis {
            silence_ratio: round_to(total_silence_seconds / duration_seconds, 2),
            total_silence_seconds: round_to(total_silence_seconds, 2),
            duration_seconds,
            pause_count,
        }
    }
}

impl Default for SilenceDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Signal-level clarity estimator
#[derive(Debug, Clone)]
pub struct ClarityAnalyzer {
    frame_length: usize,
    hop_length: usize,
    /// Spectral centroid band considered natural speech (Hz)
    centroid_band: (f64, f64),
}

impl ClarityAnalyzer {
    pub fn new() -> Self {
        Self {
            frame_length: 2048,
            hop_length: 512,
            centroid_band: (500.0, 4000.0),
        }
    }

    pub fn analyze(&self, samples: &[f32], sample_rate: u32) -> ClarityAnalysis {
        if samples.is_empty() || sample_rate == 0 {
            return ClarityAnalysis::default();
        }

        let frame_rms: Vec<f64> = if samples.len() <= self.frame_length {
            vec![rms(samples)]
        } else {
            (0..=(samples.len() - self.frame_length) / self.hop_length)
                .map(|i| {
                    let start = i * self.hop_length;
                    rms(&samples[start..start + self.frame_length])
                })
                .collect()
        };

        let n = frame_rms.len() as f64;
        let mean = frame_rms.iter().sum::<f64>() / n;
        let variance = frame_rms.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();

        let centroid = zero_crossing_rate(samples) * sample_rate as f64 / 2.0;

        let volume_score = (mean * 100.0).min(1.0);
        let variation_score = (std * 100.0).min(1.0);
        let (low, high) = self.centroid_band;
        let centroid_score = if (low..=high).contains(&centroid) { 1.0 } else { 0.5 };

        let clarity = (volume_score * 0.4 + variation_score * 0.4 + centroid_score * 0.2) * 10.0;

        ClarityAnalysis {
            clarity_score: round_to(clarity, 2),
            rms_mean: round_to(mean, 4),
            rms_std: round_to(std, 4),
            spectral_centroid_hz: round_to(centroid, 2),
        }
    }
}

impl Default for ClarityAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Sign changes per sample
fn zero_crossing_rate(samples: &[f32]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f64 / (samples.len() - 1) as f64
}

/// Default [`AudioAnalyzer`]: decode then analyze on the blocking pool
#[derive(Debug, Clone, Default)]
pub struct PcmAudioAnalyzer {
    silence: SilenceDetector,
    clarity: ClarityAnalyzer,
}

impl PcmAudioAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    async fn with_decoded<T, F>(&self, audio: &Path, analyze: F) -> Result<T, CollaboratorError>
    where
        T: Send + 'static,
        F: FnOnce(&DecodedAudio) -> T + Send + 'static,
    {
        let path: PathBuf = audio.to_path_buf();
        tokio::task::spawn_blocking(move || decode_mono(&path).map(|decoded| analyze(&decoded)))
            .await
            .map_err(|e| CollaboratorError::Process(format!("Audio analysis task panicked: {}", e)))?
    }
}

#[async_trait]
impl AudioAnalyzer for PcmAudioAnalyzer {
    async fn detect_silence(&self, audio: &Path) -> Result<SilenceAnalysis, CollaboratorError> {
        let detector = self.silence.clone();
        self.with_decoded(audio, move |decoded| {
            detector.analyze(&decoded.samples, decoded.sample_rate)
        })
        .await
    }

    async fn analyze_clarity(&self, audio: &Path) -> Result<ClarityAnalysis, CollaboratorError> {
        let analyzer = self.clarity.clone();
        self.with_decoded(audio, move |decoded| {
            analyzer.analyze(&decoded.samples, decoded.sample_rate)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    const SR: u32 = 16_000;

    fn tone(seconds: f64, freq: f32, amplitude: f32) -> Vec<f32> {
        let n = (seconds * SR as f64) as usize;
        (0..n)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / SR as f32).sin())
            .collect()
    }

    fn silence(seconds: f64) -> Vec<f32> {
        vec![0.0; (seconds * SR as f64) as usize]
    }

    #[test]
    fn test_short_audio_reports_no_silence() {
        let analysis = SilenceDetector::new().analyze(&silence(1.5), SR);
        assert_eq!(analysis.silence_ratio, 0.0);
        assert_eq!(analysis.pause_count, 0);
    }

    #[test]
    fn test_long_pause_counted() {
        let mut samples = tone(2.0, 440.0, 0.5);
        samples.extend(silence(1.0));
        samples.extend(tone(2.0, 440.0, 0.5));

        let analysis = SilenceDetector::new().analyze(&samples, SR);
        assert_eq!(analysis.pause_count, 1);
        assert_eq!(analysis.total_silence_seconds, 1.0);
        assert_eq!(analysis.silence_ratio, 0.2);
    }

    #[test]
    fn test_brief_pause_ignored() {
        let mut samples = tone(2.0, 440.0, 0.5);
        samples.extend(silence(0.5));
        samples.extend(tone(2.0, 440.0, 0.5));

        let analysis = SilenceDetector::new().analyze(&samples, SR);
        assert_eq!(analysis.pause_count, 0);
        assert_eq!(analysis.silence_ratio, 0.0);
    }

    #[test]
    fn test_trailing_silence_counted() {
        let mut samples = tone(3.0, 440.0, 0.5);
        samples.extend(silence(1.0));

        let analysis = SilenceDetector::new().analyze(&samples, SR);
        assert_eq!(analysis.pause_count, 1);
        assert_eq!(analysis.silence_ratio, 0.25);
    }

    #[test]
    fn test_zero_crossing_tracks_frequency() {
        let centroid = zero_crossing_rate(&tone(1.0, 1000.0, 0.5)) * SR as f64 / 2.0;
        assert!((centroid - 1000.0).abs() < 20.0, "centroid {}", centroid);
    }

    #[test]
    fn test_clarity_of_empty_audio() {
        let analysis = ClarityAnalyzer::new().analyze(&[], SR);
        assert_eq!(analysis.clarity_score, 0.0);
    }

    #[test]
    fn test_clarity_loud_speech_band_tone() {
        // Steady tone: full volume score, no variation, centroid in band
        let analysis = ClarityAnalyzer::new().analyze(&tone(2.0, 1000.0, 0.5), SR);
        assert!(analysis.rms_mean > 0.3);
        assert!(analysis.rms_std < 0.01);
        assert!((analysis.clarity_score - 6.0).abs() < 0.5, "clarity {}", analysis.clarity_score);
    }

    #[test]
    fn test_clarity_low_rumble_out_of_band() {
        // 125 Hz: whole periods per frame, so only the centroid term changes
        let analysis = ClarityAnalyzer::new().analyze(&tone(2.0, 125.0, 0.5), SR);
        assert!(analysis.spectral_centroid_hz < 500.0);
        assert!((analysis.clarity_score - 5.0).abs() < 0.2, "clarity {}", analysis.clarity_score);
    }

    #[tokio::test]
    async fn test_decode_wav_and_analyze() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("speech.wav");

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SR,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        let mut samples = tone(2.0, 440.0, 0.5);
        samples.extend(silence(1.0));
        samples.extend(tone(1.0, 440.0, 0.5));
        for s in samples {
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();

        let analyzer = PcmAudioAnalyzer::new();
        let silence = analyzer.detect_silence(&path).await.unwrap();
        assert_eq!(silence.pause_count, 1);
        assert_eq!(silence.silence_ratio, 0.25);

        let clarity = analyzer.analyze_clarity(&path).await.unwrap();
        assert!(clarity.clarity_score > 0.0);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let err = PcmAudioAnalyzer::new()
            .detect_silence(Path::new("/nonexistent/audio.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Io(_)));
    }
}
