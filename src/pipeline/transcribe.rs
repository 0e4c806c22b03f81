use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::error::{PipelineError, Result};
use crate::models::{TranscriptSegment, TranscriptionResult};

/// Marker embedded in every `FixedTranscriber` transcript, asserted on by
/// integration tests.
pub const FIXED_MARKER: &str = "[FIXED TRANSCRIPTION]";

/// Converts one audio file into a structured transcription.
///
/// The speech model is an opaque external capability; implementations only
/// promise the `TranscriptionResult` contract (non-empty segments, duration
/// >= 0).
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptionResult>;
}

/// Production transcriber: spawns whisper-cli against a local ggml model and
/// parses its JSON output.
pub struct WhisperCliTranscriber {
    cli_path: PathBuf,
    model_path: PathBuf,
}

impl WhisperCliTranscriber {
    pub fn new(cli_path: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            cli_path: cli_path.into(),
            model_path: model_path.into(),
        }
    }
}

#[async_trait]
impl Transcriber for WhisperCliTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptionResult> {
        if !audio_path.exists() {
            return Err(PipelineError::Transcribe(format!(
                "Audio file not found: {:?}",
                audio_path
            )));
        }
        if !self.model_path.exists() {
            return Err(PipelineError::Transcribe(format!(
                "Model not found: {:?}",
                self.model_path
            )));
        }

        // Output lands next to the audio, inside the caller's scratch dir
        let output_base = audio_path.with_extension("");

        log::info!("Running whisper-cli on {:?}", audio_path);

        let output = Command::new(&self.cli_path)
            .arg("-m")
            .arg(&self.model_path)
            .arg("-f")
            .arg(audio_path)
            .arg("-oj")
            .arg("-of")
            .arg(&output_base)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| PipelineError::Transcribe(format!("Failed to spawn whisper-cli: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Transcribe(format!(
                "whisper-cli failed with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let transcript_path = output_base.with_extension("json");
        let content = tokio::fs::read_to_string(&transcript_path)
            .await
            .map_err(|e| {
                PipelineError::Transcribe(format!(
                    "Failed to read whisper output {:?}: {}",
                    transcript_path, e
                ))
            })?;

        parse_whisper_json(&content)
    }
}

// whisper-cli -oj output: a "transcription" array with millisecond offsets
// and a "result" object naming the detected language.

#[derive(Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    transcription: Vec<WhisperSegment>,
    result: Option<WhisperInfo>,
}

#[derive(Deserialize)]
struct WhisperSegment {
    offsets: WhisperOffsets,
    text: String,
}

#[derive(Deserialize)]
struct WhisperOffsets {
    from: i64,
    to: i64,
}

#[derive(Deserialize)]
struct WhisperInfo {
    language: Option<String>,
}

fn parse_whisper_json(content: &str) -> Result<TranscriptionResult> {
    let output: WhisperOutput = serde_json::from_str(content)
        .map_err(|e| PipelineError::Transcribe(format!("Failed to parse whisper output: {}", e)))?;

    if output.transcription.is_empty() {
        return Err(PipelineError::Transcribe(
            "whisper output contained no segments".into(),
        ));
    }

    let segments: Vec<TranscriptSegment> = output
        .transcription
        .iter()
        .map(|s| TranscriptSegment {
            start: s.offsets.from as f64 / 1000.0,
            end: s.offsets.to as f64 / 1000.0,
            text: s.text.trim().to_string(),
        })
        .collect();

    let duration = segments.last().map(|s| s.end).unwrap_or(0.0);
    let full_text = TranscriptionResult::join_segments(&segments);

    Ok(TranscriptionResult {
        language: output
            .result
            .and_then(|r| r.language)
            .unwrap_or_else(|| "unknown".to_string()),
        // whisper-cli does not report a confidence; the language field is
        // what the model committed to
        language_probability: 1.0,
        duration,
        full_text,
        segments,
    })
}

/// Deterministic stand-in: instant results, no model required. Selected with
/// `TRANSCRIBER=fixed` for local runs and integration tests.
pub struct FixedTranscriber;

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptionResult> {
        let file_size = tokio::fs::metadata(audio_path)
            .await
            .map_err(|e| PipelineError::Transcribe(format!("Unreadable audio: {}", e)))?
            .len();

        Ok(TranscriptionResult {
            language: "sv".to_string(),
            language_probability: 0.99,
            duration: 120.0,
            full_text: format!(
                "{} file={} size={}",
                FIXED_MARKER,
                audio_path.display(),
                file_size
            ),
            segments: vec![TranscriptSegment {
                start: 0.0,
                end: 120.0,
                text: "[fixed]".to_string(),
            }],
        })
    }
}
