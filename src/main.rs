use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use podscribe::config::{Config, StorageKind, TranscriberKind};
use podscribe::dispatch::HttpDispatcher;
use podscribe::feed::FeedClient;
use podscribe::pipeline::fetch::HttpAudioFetcher;
use podscribe::pipeline::store::{LocalResultStore, RemoteResultStore, ResultStore};
use podscribe::pipeline::transcribe::{FixedTranscriber, Transcriber, WhisperCliTranscriber};
use podscribe::pipeline::EpisodeProcessor;
use podscribe::runner::{DiscoveryRun, RunMode};
use podscribe::server;
use podscribe::state::DispatchLedger;

#[derive(Parser)]
#[command(name = "podscribe", about = "Podcast RSS discovery and transcription pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one discovery cycle over the configured feeds
    Discover,
    /// Run the HTTP processing worker
    Serve,
}

fn build_processor(config: &Config) -> anyhow::Result<Arc<EpisodeProcessor>> {
    let fetcher = Arc::new(HttpAudioFetcher::new(config.fetch_timeout)?);

    let transcriber: Arc<dyn Transcriber> = match config.transcriber {
        TranscriberKind::Whisper => Arc::new(WhisperCliTranscriber::new(
            &config.whisper_cli,
            &config.whisper_model,
        )),
        TranscriberKind::Fixed => {
            log::warn!("Using fixed transcriber: no model, deterministic output");
            Arc::new(FixedTranscriber)
        }
    };

    let store: Arc<dyn ResultStore> = match config.storage {
        StorageKind::Local => Arc::new(LocalResultStore::new(&config.output_dir)),
        StorageKind::Remote => {
            let base_url = config
                .remote_store_url
                .clone()
                .expect("validated in Config::from_env");
            Arc::new(RemoteResultStore::new(
                base_url,
                config.remote_store_token.clone(),
            )?)
        }
    };

    Ok(Arc::new(EpisodeProcessor::new(fetcher, transcriber, store)))
}

async fn discover(config: Config) -> anyhow::Result<()> {
    if config.feed_urls.is_empty() {
        bail!("FEED_URLS is empty, nothing to discover");
    }

    let mode = match &config.worker_url {
        Some(worker_url) => {
            log::info!("Dispatching new episodes to {}", worker_url);
            RunMode::Dispatch(Arc::new(HttpDispatcher::new(worker_url.clone())?))
        }
        None => RunMode::Inline {
            processor: build_processor(&config)?,
            concurrency: config.concurrency,
        },
    };

    let run = DiscoveryRun::new(
        DispatchLedger::new(&config.state_path),
        Arc::new(FeedClient::new(config.fetch_timeout)?),
        config.feed_urls.clone(),
        mode,
    );

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, cancelling run");
            ctrl_c_cancel.cancel();
        }
    });

    let summary = run.run(&cancel).await?;
    println!(
        "discovered={} completed={} failed={} no_audio={}",
        summary.discovered, summary.completed, summary.failed, summary.skipped_no_audio
    );

    if summary.failed > 0 {
        bail!("{} episodes failed; they will be retried on redelivery", summary.failed);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Discover => discover(config).await,
        Command::Serve => {
            let processor = build_processor(&config)?;
            server::serve(processor, config.port).await
        }
    }
}
