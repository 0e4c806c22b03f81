use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{PipelineError, Result};
use crate::models::{EpisodeRecord, TranscriptionResult};

/// Persisted payload: the bit-exact contract every store backend produces.
#[derive(Debug, Serialize)]
pub struct StoredDocument<'a> {
    pub episode: &'a EpisodeRecord,
    pub transcription: &'a TranscriptionResult,
}

/// Owned counterpart of `StoredDocument`, used when reading artifacts back.
#[derive(Debug, Deserialize)]
pub struct StoredDocumentOwned {
    pub episode: EpisodeRecord,
    pub transcription: TranscriptionResult,
}

/// Derive the storage file stem from an episode guid.
///
/// Pure function of the guid, so reprocessing the same episode always lands
/// at the same location (overwrite semantics). Guids are arbitrary feed
/// strings — often URLs — so they are hashed rather than sanitized.
pub fn storage_key(guid: &str) -> String {
    let digest = Sha256::digest(guid.as_bytes());
    format!("{:x}", digest)[..16].to_string()
}

/// Persists an (episode, transcription) pair, returning its location.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn store(
        &self,
        episode: &EpisodeRecord,
        result: &TranscriptionResult,
    ) -> Result<String>;
}

fn encode_document(episode: &EpisodeRecord, result: &TranscriptionResult) -> Result<String> {
    serde_json::to_string_pretty(&StoredDocument {
        episode,
        transcription: result,
    })
    .map_err(|e| PipelineError::Store(format!("Failed to serialize result: {}", e)))
}

/// Writes transcriptions to a local directory.
pub struct LocalResultStore {
    output_dir: PathBuf,
}

impl LocalResultStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Location an episode would be stored at, without storing anything.
    pub fn location_for(&self, guid: &str) -> PathBuf {
        self.output_dir.join(format!("{}.json", storage_key(guid)))
    }
}

#[async_trait]
impl ResultStore for LocalResultStore {
    async fn store(
        &self,
        episode: &EpisodeRecord,
        result: &TranscriptionResult,
    ) -> Result<String> {
        let content = encode_document(episode, result)?;
        let path = self.location_for(&episode.guid);

        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| PipelineError::Store(format!("Failed to create output dir: {}", e)))?;

        // Write-then-rename so a mid-write failure never leaves a partial
        // artifact at the destination
        let mut tmp = tempfile::NamedTempFile::new_in(&self.output_dir)
            .map_err(|e| PipelineError::Store(format!("Failed to create temp file: {}", e)))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| PipelineError::Store(format!("Failed to write result: {}", e)))?;
        tmp.flush()
            .map_err(|e| PipelineError::Store(format!("Failed to flush result: {}", e)))?;
        tmp.persist(&path)
            .map_err(|e| PipelineError::Store(format!("Failed to persist result: {}", e)))?;

        let location = path.to_string_lossy().to_string();
        log::info!("Wrote transcription to {}", location);
        Ok(location)
    }
}

/// Uploads transcriptions to a remote object store with a single PUT per
/// artifact. Last writer wins, which makes duplicate deliveries convergent.
pub struct RemoteResultStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RemoteResultStore {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| PipelineError::Store(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn location_for(&self, guid: &str) -> String {
        format!("{}/transcriptions/{}.json", self.base_url, storage_key(guid))
    }
}

#[async_trait]
impl ResultStore for RemoteResultStore {
    async fn store(
        &self,
        episode: &EpisodeRecord,
        result: &TranscriptionResult,
    ) -> Result<String> {
        let content = encode_document(episode, result)?;
        let location = self.location_for(&episode.guid);

        let mut request = self
            .client
            .put(&location)
            .header("content-type", "application/json")
            .body(content);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::Store(format!("Upload failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PipelineError::Store(format!(
                "Upload to {} failed with status: {}",
                location,
                response.status()
            )));
        }

        log::info!("Uploaded transcription to {}", location);
        Ok(location)
    }
}

#[cfg(test)]
pub(crate) mod stand_ins {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stand-in store that records nothing durable, counting invocations.
    pub struct CountingStore {
        pub calls: AtomicUsize,
    }

    impl CountingStore {
        pub fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ResultStore for CountingStore {
        async fn store(
            &self,
            episode: &EpisodeRecord,
            _result: &TranscriptionResult,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("memory://{}", storage_key(&episode.guid)))
        }
    }
}
