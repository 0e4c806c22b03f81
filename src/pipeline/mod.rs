pub mod fetch;
pub mod store;
pub mod transcribe;

use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::models::EpisodeRecord;

use fetch::AudioFetcher;
use store::ResultStore;
use transcribe::Transcriber;

/// Coordinates download → transcribe → store for one episode.
///
/// Stages are capability traits so backends swap independently; the
/// processor itself holds no state beyond them and one invocation owns its
/// scratch directory exclusively, so concurrent calls for different episodes
/// need no coordination. Calling `process` twice for the same guid overwrites
/// the same storage location, which is what makes at-least-once dispatch
/// safe.
pub struct EpisodeProcessor {
    fetcher: Arc<dyn AudioFetcher>,
    transcriber: Arc<dyn Transcriber>,
    store: Arc<dyn ResultStore>,
}

impl EpisodeProcessor {
    pub fn new(
        fetcher: Arc<dyn AudioFetcher>,
        transcriber: Arc<dyn Transcriber>,
        store: Arc<dyn ResultStore>,
    ) -> Self {
        Self {
            fetcher,
            transcriber,
            store,
        }
    }

    /// Run the fixed three-stage pipeline for one episode, returning the
    /// storage location. A stage failure propagates immediately and aborts
    /// the later stages; the scratch audio file is released on every exit
    /// path, including cancellation (the temp dir guard drops with the
    /// future).
    pub async fn process(&self, episode: &EpisodeRecord) -> Result<String> {
        if episode.audio_url.is_empty() {
            return Err(PipelineError::Fetch(format!(
                "Episode '{}' has no audio URL",
                episode.guid
            )));
        }

        let scratch = tempfile::TempDir::new()
            .map_err(|e| PipelineError::Fetch(format!("Failed to create scratch dir: {}", e)))?;
        let audio_path = scratch.path().join("episode.mp3");

        log::info!("Processing episode '{}' ({})", episode.title, episode.guid);

        self.fetcher.download(&episode.audio_url, &audio_path).await?;

        let result = self.transcriber.transcribe(&audio_path).await?;
        log::info!(
            "Transcribed {:.1}s of audio for '{}'",
            result.duration,
            episode.guid
        );

        let location = self.store.store(episode, &result).await?;
        log::info!("Episode '{}' stored at {}", episode.guid, location);

        Ok(location)
        // scratch dropped here, audio file deleted
    }
}
