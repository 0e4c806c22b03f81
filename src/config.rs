use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};

/// Which transcription capability to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriberKind {
    /// Subprocess whisper-cli against a local ggml model.
    Whisper,
    /// Deterministic stand-in: instant results, no model required.
    Fixed,
}

/// Which result-store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Local,
    Remote,
}

/// Process-wide configuration, resolved once from the environment at startup
/// and passed into constructors. Nothing reads the environment after this.
#[derive(Debug, Clone)]
pub struct Config {
    /// RSS feed URLs polled by a discovery run.
    pub feed_urls: Vec<String>,
    /// Path of the seen-guid ledger file.
    pub state_path: PathBuf,
    /// Output directory for the local result store.
    pub output_dir: PathBuf,
    pub transcriber: TranscriberKind,
    pub storage: StorageKind,
    /// Base URL of the remote object store (required when storage = remote).
    pub remote_store_url: Option<String>,
    pub remote_store_token: Option<String>,
    pub whisper_cli: PathBuf,
    pub whisper_model: PathBuf,
    /// Processing-worker URL. When set, discovery dispatches episodes to it
    /// instead of processing them inline.
    pub worker_url: Option<String>,
    pub fetch_timeout: Duration,
    /// Upper bound on concurrent inline episode processing.
    pub concurrency: usize,
    pub port: u16,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let feed_urls = env_opt("FEED_URLS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let transcriber = match env_opt("TRANSCRIBER").as_deref() {
            None | Some("whisper") => TranscriberKind::Whisper,
            Some("fixed") => TranscriberKind::Fixed,
            Some(other) => bail!("unknown TRANSCRIBER '{}', expected whisper|fixed", other),
        };

        let storage = match env_opt("STORAGE").as_deref() {
            None | Some("local") => StorageKind::Local,
            Some("remote") => StorageKind::Remote,
            Some(other) => bail!("unknown STORAGE '{}', expected local|remote", other),
        };

        let remote_store_url = env_opt("REMOTE_STORE_URL");
        if storage == StorageKind::Remote && remote_store_url.is_none() {
            bail!("STORAGE=remote requires REMOTE_STORE_URL");
        }

        let fetch_timeout = env_opt("FETCH_TIMEOUT_SECS")
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("FETCH_TIMEOUT_SECS must be an integer")?
            .unwrap_or(600);

        let concurrency = env_opt("CONCURRENCY")
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("CONCURRENCY must be an integer")?
            .unwrap_or(2)
            .max(1);

        let port = env_opt("PORT")
            .map(|v| v.parse::<u16>())
            .transpose()
            .context("PORT must be a port number")?
            .unwrap_or(8080);

        Ok(Self {
            feed_urls,
            state_path: env_opt("STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("state/rss_state.json")),
            output_dir: env_opt("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("output")),
            transcriber,
            storage,
            remote_store_url,
            remote_store_token: env_opt("REMOTE_STORE_TOKEN"),
            whisper_cli: env_opt("WHISPER_CLI")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("whisper-cli")),
            whisper_model: env_opt("WHISPER_MODEL")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("models/ggml-large-v3.bin")),
            worker_url: env_opt("WORKER_URL"),
            fetch_timeout: Duration::from_secs(fetch_timeout),
            concurrency,
            port,
        })
    }
}
