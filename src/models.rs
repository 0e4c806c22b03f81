use serde::{Deserialize, Serialize};

/// One feed entry representing a single audio item.
///
/// `guid` is the sole identity key: two records with an equal `guid` are the
/// same episode regardless of drift in the other fields. Records are built
/// once when a feed is parsed and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpisodeRecord {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub guid: String,
    #[serde(default)]
    pub pub_date: String,
    pub audio_url: String,
}

/// A timed slice of the transcript. `0 <= start <= end`, ordered by `start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Structured output of one transcription, owned by the processing call that
/// produced it until it is handed to the result store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub language: String,
    pub language_probability: f64,
    /// Audio duration in seconds, >= 0.
    pub duration: f64,
    pub full_text: String,
    pub segments: Vec<TranscriptSegment>,
}

impl TranscriptionResult {
    /// Rebuild `full_text` from segments, the way whisper emits them.
    pub fn join_segments(segments: &[TranscriptSegment]) -> String {
        segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
