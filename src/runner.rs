//! One discovery run: load the ledger, diff every configured feed against
//! it, process or dispatch the new episodes, save the ledger.
//!
//! The load→diff→save cycle is one logical transaction; the scheduler must
//! not overlap two runs against the same ledger. Episode processing inside a
//! run is concurrent up to the configured limit, and one episode's failure
//! never aborts its siblings. A discovered guid is marked seen even when its
//! processing attempt failed — redelivery is the dispatcher's job — but a
//! ledger save failure aborts the run so the same items are rediscovered
//! next time (reprocess, never skip).

use std::sync::Arc;

use futures_util::{stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::dispatch::{dispatch_all, Dispatcher};
use crate::error::{PipelineError, Result};
use crate::feed::diff::diff_entries;
use crate::feed::FeedSource;
use crate::models::EpisodeRecord;
use crate::pipeline::EpisodeProcessor;
use crate::state::DispatchLedger;

/// What happens to each newly discovered episode.
pub enum RunMode {
    /// Process inline with bounded concurrency.
    Inline {
        processor: Arc<EpisodeProcessor>,
        concurrency: usize,
    },
    /// Hand off to a processing worker, at-least-once.
    Dispatch(Arc<dyn Dispatcher>),
}

/// Counters reported at the end of a run.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// New entries found across all feeds.
    pub discovered: usize,
    /// Episodes processed or dispatched successfully.
    pub completed: usize,
    /// Episodes whose processing or dispatch failed.
    pub failed: usize,
    /// New entries recorded as seen but never dispatched (no audio URL).
    pub skipped_no_audio: usize,
}

pub struct DiscoveryRun {
    ledger: DispatchLedger,
    source: Arc<dyn FeedSource>,
    feed_urls: Vec<String>,
    mode: RunMode,
}

impl DiscoveryRun {
    pub fn new(
        ledger: DispatchLedger,
        source: Arc<dyn FeedSource>,
        feed_urls: Vec<String>,
        mode: RunMode,
    ) -> Self {
        Self {
            ledger,
            source,
            feed_urls,
            mode,
        }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunSummary> {
        let seen = self.ledger.load()?;
        log::info!(
            "Discovery run started: {} feeds, {} guids seen",
            self.feed_urls.len(),
            seen.len()
        );

        // Diff feeds one after another against the running seen set, so an
        // episode syndicated in two feeds is discovered once
        let mut updated_seen = seen;
        let mut new_entries: Vec<EpisodeRecord> = Vec::new();

        for feed_url in &self.feed_urls {
            match self.source.fetch_entries(feed_url).await {
                Ok(entries) => {
                    let diff = diff_entries(entries, &updated_seen);
                    log::info!("{}: {} new entries", feed_url, diff.new_entries.len());
                    new_entries.extend(diff.new_entries);
                    updated_seen = diff.updated_seen;
                }
                Err(e) => {
                    // A broken feed skips that feed, not the run
                    log::error!("Skipping feed {}: {}", feed_url, e);
                }
            }
        }

        let mut summary = RunSummary {
            discovered: new_entries.len(),
            ..RunSummary::default()
        };

        let (to_handle, no_audio): (Vec<_>, Vec<_>) = new_entries
            .into_iter()
            .partition(|e| !e.audio_url.is_empty());
        for entry in &no_audio {
            log::warn!(
                "Episode '{}' ({}) has no audio URL, recording as seen without dispatch",
                entry.title,
                entry.guid
            );
        }
        summary.skipped_no_audio = no_audio.len();

        if cancel.is_cancelled() {
            return Err(PipelineError::State(
                "Run cancelled before processing".into(),
            ));
        }

        match &self.mode {
            RunMode::Dispatch(dispatcher) => {
                let report = dispatch_all(dispatcher.as_ref(), &to_handle).await;
                summary.completed = report.dispatched;
                summary.failed = report.failures.len();
            }
            RunMode::Inline {
                processor,
                concurrency,
            } => {
                let results = tokio::select! {
                    _ = cancel.cancelled() => {
                        // In-flight episode futures are dropped here, which
                        // releases their scratch dirs; nothing is marked seen
                        return Err(PipelineError::State("Run cancelled".into()));
                    }
                    // Each future owns its episode; borrowing `&to_handle`
                    // here trips rustc's "implementation of `FnOnce` is not
                    // general enough" when the run future is spawned
                    results = stream::iter(to_handle)
                        .map(|episode| {
                            let processor = Arc::clone(processor);
                            async move { (episode.guid.clone(), processor.process(&episode).await) }
                        })
                        .buffer_unordered((*concurrency).max(1))
                        .collect::<Vec<_>>() => results,
                };

                for (guid, result) in results {
                    match result {
                        Ok(location) => {
                            log::info!("Episode '{}' processed -> {}", guid, location);
                            summary.completed += 1;
                        }
                        Err(e) => {
                            log::error!("Episode '{}' failed: {}", guid, e);
                            summary.failed += 1;
                        }
                    }
                }
            }
        }

        // Save failure aborts here with a State error; the external "last
        // run" marker must not advance, so these items come back next run
        self.ledger.save(&updated_seen)?;

        log::info!(
            "Discovery run finished: {} discovered, {} completed, {} failed, {} without audio",
            summary.discovered,
            summary.completed,
            summary.failed,
            summary.skipped_no_audio
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::stand_ins::RecordingDispatcher;
    use crate::pipeline::fetch::stand_ins::FixedFetcher;
    use crate::pipeline::fetch::AudioFetcher;
    use crate::pipeline::store::LocalResultStore;
    use crate::pipeline::transcribe::FixedTranscriber;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    /// Stand-in fetcher that records its scratch dir, signals the test, then
    /// parks forever. Only cancellation gets past it.
    struct BlockingFetcher {
        scratch_dir: Mutex<Option<PathBuf>>,
        started: Notify,
    }

    impl BlockingFetcher {
        fn new() -> Self {
            Self {
                scratch_dir: Mutex::new(None),
                started: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl AudioFetcher for BlockingFetcher {
        async fn download(&self, _url: &str, dest: &Path) -> Result<()> {
            *self.scratch_dir.lock().unwrap() = dest.parent().map(|p| p.to_path_buf());
            self.started.notify_one();
            std::future::pending().await
        }
    }

    struct StaticFeeds {
        feeds: HashMap<String, Vec<EpisodeRecord>>,
    }

    #[async_trait]
    impl FeedSource for StaticFeeds {
        async fn fetch_entries(&self, feed_url: &str) -> Result<Vec<EpisodeRecord>> {
            self.feeds
                .get(feed_url)
                .cloned()
                .ok_or_else(|| PipelineError::Feed(format!("no such feed: {}", feed_url)))
        }
    }

    fn episode(guid: &str) -> EpisodeRecord {
        EpisodeRecord {
            title: format!("Episode {}", guid),
            description: String::new(),
            guid: guid.into(),
            pub_date: String::new(),
            audio_url: format!("https://x/{}.mp3", guid),
        }
    }

    fn inline_mode(out_dir: &std::path::Path) -> RunMode {
        RunMode::Inline {
            processor: Arc::new(EpisodeProcessor::new(
                Arc::new(FixedFetcher::zeros(1024)),
                Arc::new(FixedTranscriber),
                Arc::new(LocalResultStore::new(out_dir)),
            )),
            concurrency: 2,
        }
    }

    #[tokio::test]
    async fn second_run_discovers_nothing_new() {
        let temp = TempDir::new().unwrap();
        let feeds: HashMap<_, _> = [(
            "feed-a".to_string(),
            vec![episode("1"), episode("2")],
        )]
        .into();

        let make_run = || {
            DiscoveryRun::new(
                DispatchLedger::new(temp.path().join("state.json")),
                Arc::new(StaticFeeds {
                    feeds: feeds.clone(),
                }),
                vec!["feed-a".into()],
                inline_mode(&temp.path().join("out")),
            )
        };

        let first = make_run().run(&CancellationToken::new()).await.unwrap();
        assert_eq!(first.discovered, 2);
        assert_eq!(first.completed, 2);
        assert_eq!(first.failed, 0);

        let second = make_run().run(&CancellationToken::new()).await.unwrap();
        assert_eq!(second.discovered, 0);
        assert_eq!(second.completed, 0);
    }

    #[tokio::test]
    async fn entries_without_audio_are_seen_but_not_processed() {
        let temp = TempDir::new().unwrap();
        let mut silent = episode("no-audio");
        silent.audio_url = String::new();

        let feeds: HashMap<_, _> =
            [("feed-a".to_string(), vec![silent, episode("ok")])].into();

        let run = DiscoveryRun::new(
            DispatchLedger::new(temp.path().join("state.json")),
            Arc::new(StaticFeeds { feeds }),
            vec!["feed-a".into()],
            inline_mode(&temp.path().join("out")),
        );

        let summary = run.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.discovered, 2);
        assert_eq!(summary.skipped_no_audio, 1);
        assert_eq!(summary.completed, 1);

        // both guids are in the ledger, so neither comes back
        let seen = DispatchLedger::new(temp.path().join("state.json"))
            .load()
            .unwrap();
        assert!(seen.contains("no-audio"));
        assert!(seen.contains("ok"));
    }

    #[tokio::test]
    async fn dispatch_failures_are_reported_not_fatal() {
        let temp = TempDir::new().unwrap();
        let feeds: HashMap<_, _> = [(
            "feed-a".to_string(),
            vec![episode("a"), episode("b"), episode("c")],
        )]
        .into();

        let dispatcher = Arc::new(RecordingDispatcher::failing_on(&["b"]));
        let run = DiscoveryRun::new(
            DispatchLedger::new(temp.path().join("state.json")),
            Arc::new(StaticFeeds { feeds }),
            vec!["feed-a".into()],
            RunMode::Dispatch(dispatcher.clone()),
        );

        let summary = run.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(
            dispatcher.attempts.lock().unwrap().clone(),
            vec!["a", "b", "c"]
        );
    }

    #[tokio::test]
    async fn broken_feed_skips_that_feed_only() {
        let temp = TempDir::new().unwrap();
        let feeds: HashMap<_, _> = [("good".to_string(), vec![episode("x")])].into();

        let dispatcher = Arc::new(RecordingDispatcher::failing_on(&[]));
        let run = DiscoveryRun::new(
            DispatchLedger::new(temp.path().join("state.json")),
            Arc::new(StaticFeeds { feeds }),
            vec!["broken".into(), "good".into()],
            RunMode::Dispatch(dispatcher.clone()),
        );

        let summary = run.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.discovered, 1);
        assert_eq!(summary.completed, 1);
    }

    #[tokio::test]
    async fn cross_feed_duplicates_are_discovered_once() {
        let temp = TempDir::new().unwrap();
        let feeds: HashMap<_, _> = [
            ("a".to_string(), vec![episode("shared")]),
            ("b".to_string(), vec![episode("shared"), episode("own")]),
        ]
        .into();

        let dispatcher = Arc::new(RecordingDispatcher::failing_on(&[]));
        let run = DiscoveryRun::new(
            DispatchLedger::new(temp.path().join("state.json")),
            Arc::new(StaticFeeds { feeds }),
            vec!["a".into(), "b".into()],
            RunMode::Dispatch(dispatcher.clone()),
        );

        let summary = run.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.discovered, 2);
    }

    #[tokio::test]
    async fn cancelled_run_saves_nothing() {
        let temp = TempDir::new().unwrap();
        let feeds: HashMap<_, _> = [("feed-a".to_string(), vec![episode("1")])].into();

        let run = DiscoveryRun::new(
            DispatchLedger::new(temp.path().join("state.json")),
            Arc::new(StaticFeeds { feeds }),
            vec!["feed-a".into()],
            inline_mode(&temp.path().join("out")),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(run.run(&cancel).await.is_err());
        assert!(!temp.path().join("state.json").exists());
    }

    #[tokio::test]
    async fn mid_flight_cancellation_releases_scratch_and_saves_nothing() {
        let temp = TempDir::new().unwrap();
        let feeds: HashMap<_, _> = [("feed-a".to_string(), vec![episode("1")])].into();

        let fetcher = Arc::new(BlockingFetcher::new());
        let run = DiscoveryRun::new(
            DispatchLedger::new(temp.path().join("state.json")),
            Arc::new(StaticFeeds { feeds }),
            vec!["feed-a".into()],
            RunMode::Inline {
                processor: Arc::new(EpisodeProcessor::new(
                    fetcher.clone(),
                    Arc::new(FixedTranscriber),
                    Arc::new(LocalResultStore::new(temp.path().join("out"))),
                )),
                concurrency: 1,
            },
        );

        let cancel = CancellationToken::new();
        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { run.run(&cancel).await })
        };

        // Wait until the episode future is inside the download stage
        fetcher.started.notified().await;
        let scratch = fetcher.scratch_dir.lock().unwrap().clone().unwrap();
        assert!(scratch.exists());

        cancel.cancel();
        assert!(handle.await.unwrap().is_err());

        // Dropping the in-flight future released its scratch dir, and the
        // ledger never advanced
        assert!(!scratch.exists());
        assert!(!temp.path().join("state.json").exists());
    }
}
