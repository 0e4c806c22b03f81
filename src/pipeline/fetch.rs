use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::error::{PipelineError, Result};

/// Retrieves a remote audio resource into a local scratch location.
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    async fn download(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Streaming HTTP fetcher with retry and Content-Length validation.
///
/// Bodies are streamed to disk chunk by chunk; episodes run to hundreds of
/// megabytes and must never be buffered whole.
pub struct HttpAudioFetcher {
    client: reqwest::Client,
}

const BACKOFF_DELAYS: [u64; 2] = [2, 8];

impl HttpAudioFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Fetch(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Single download attempt with streaming and validation.
    async fn try_download(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::Fetch(format!("Failed to start download: {}", e)))?;

        if !response.status().is_success() {
            return Err(PipelineError::Fetch(format!(
                "Download failed with status: {}",
                response.status()
            )));
        }

        let content_length = response.content_length();
        let mut stream = response.bytes_stream();
        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| PipelineError::Fetch(format!("Failed to create file: {}", e)))?;
        let mut downloaded: u64 = 0;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result
                .map_err(|e| PipelineError::Fetch(format!("Error reading download stream: {}", e)))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| PipelineError::Fetch(format!("Failed to write chunk: {}", e)))?;
            downloaded += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| PipelineError::Fetch(format!("Failed to flush file: {}", e)))?;

        if let Some(expected) = content_length {
            if downloaded != expected {
                return Err(PipelineError::Fetch(format!(
                    "Download incomplete: got {} bytes, expected {}",
                    downloaded, expected
                )));
            }
        }

        Ok(downloaded)
    }
}

#[async_trait]
impl AudioFetcher for HttpAudioFetcher {
    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        log::info!("Downloading {} to {:?}", url, dest);

        let attempts = BACKOFF_DELAYS.len() + 1;
        for attempt in 0..attempts {
            match self.try_download(url, dest).await {
                Ok(bytes) => {
                    log::info!("Download complete: {} bytes", bytes);
                    return Ok(());
                }
                Err(e) => {
                    // Clean up the partial file before retrying or giving up
                    let _ = tokio::fs::remove_file(dest).await;

                    if attempt + 1 < attempts {
                        let delay = BACKOFF_DELAYS[attempt];
                        log::warn!(
                            "Download attempt {} failed, retrying in {}s: {}",
                            attempt + 1,
                            delay,
                            e
                        );
                        tokio::time::sleep(Duration::from_secs(delay)).await;
                    } else {
                        return Err(PipelineError::Fetch(format!(
                            "Download failed after {} attempts: {}",
                            attempts, e
                        )));
                    }
                }
            }
        }

        unreachable!()
    }
}

#[cfg(test)]
pub(crate) mod stand_ins {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stand-in fetcher writing a fixed payload, counting invocations.
    pub struct FixedFetcher {
        pub payload: Vec<u8>,
        pub calls: AtomicUsize,
    }

    impl FixedFetcher {
        pub fn zeros(len: usize) -> Self {
            Self {
                payload: vec![0u8; len],
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AudioFetcher for FixedFetcher {
        async fn download(&self, _url: &str, dest: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::fs::write(dest, &self.payload)
                .await
                .map_err(|e| PipelineError::Fetch(e.to_string()))
        }
    }

    /// Stand-in fetcher that always fails, counting invocations.
    pub struct FailingFetcher {
        pub calls: AtomicUsize,
    }

    impl FailingFetcher {
        pub fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AudioFetcher for FailingFetcher {
        async fn download(&self, _url: &str, _dest: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PipelineError::Fetch("simulated network failure".into()))
        }
    }
}
