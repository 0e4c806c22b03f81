//! Hands newly discovered episodes to the processing worker.
//!
//! Delivery is at-least-once: the worker's storage is idempotent per guid,
//! so a redelivered episode converges on the same artifact. One episode's
//! enqueue failure never blocks the rest of the batch.

use async_trait::async_trait;

use crate::error::{PipelineError, Result};
use crate::models::EpisodeRecord;

/// Converts one discovered episode into a unit of work for asynchronous
/// processing.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn enqueue(&self, episode: &EpisodeRecord) -> Result<()>;
}

/// Dispatcher that POSTs the episode record to the processing worker's
/// ingress endpoint.
pub struct HttpDispatcher {
    client: reqwest::Client,
    worker_url: String,
}

impl HttpDispatcher {
    pub fn new(worker_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| PipelineError::Dispatch(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            worker_url: worker_url.into(),
        })
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn enqueue(&self, episode: &EpisodeRecord) -> Result<()> {
        let response = self
            .client
            .post(&self.worker_url)
            .json(episode)
            .send()
            .await
            .map_err(|e| PipelineError::Dispatch(format!("Failed to reach worker: {}", e)))?;

        if !response.status().is_success() {
            return Err(PipelineError::Dispatch(format!(
                "Worker rejected episode '{}' with status {}",
                episode.guid,
                response.status()
            )));
        }

        log::info!("Dispatched episode '{}' to worker", episode.guid);
        Ok(())
    }
}

/// Outcome of dispatching one batch of new episodes.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub dispatched: usize,
    /// (guid, error) per failed enqueue.
    pub failures: Vec<(String, PipelineError)>,
}

impl DispatchReport {
    pub fn attempted(&self) -> usize {
        self.dispatched + self.failures.len()
    }
}

/// Enqueue every episode, collecting failures instead of aborting the batch.
pub async fn dispatch_all(
    dispatcher: &dyn Dispatcher,
    episodes: &[EpisodeRecord],
) -> DispatchReport {
    let mut report = DispatchReport::default();

    for episode in episodes {
        match dispatcher.enqueue(episode).await {
            Ok(()) => report.dispatched += 1,
            Err(e) => {
                log::error!("Dispatch failed for '{}': {}", episode.guid, e);
                report.failures.push((episode.guid.clone(), e));
            }
        }
    }

    report
}

#[cfg(test)]
pub(crate) mod stand_ins {
    use super::*;
    use std::sync::Mutex;

    /// Stand-in dispatcher recording every attempted guid, failing the ones
    /// it is told to.
    pub struct RecordingDispatcher {
        pub attempts: Mutex<Vec<String>>,
        pub fail_guids: Vec<String>,
    }

    impl RecordingDispatcher {
        pub fn failing_on(fail_guids: &[&str]) -> Self {
            Self {
                attempts: Mutex::new(Vec::new()),
                fail_guids: fail_guids.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl Dispatcher for RecordingDispatcher {
        async fn enqueue(&self, episode: &EpisodeRecord) -> Result<()> {
            self.attempts.lock().unwrap().push(episode.guid.clone());
            if self.fail_guids.contains(&episode.guid) {
                return Err(PipelineError::Dispatch("simulated enqueue failure".into()));
            }
            Ok(())
        }
    }
}
