//! HTTP ingress for the processing worker.
//!
//! One endpoint: POST / with an episode record body runs the pipeline and
//! answers with the storage location. GET / is the liveness probe. The
//! handler exposes no ambiguous state — either a location comes back with
//! 200 or an error message with a non-2xx status.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;

use crate::models::EpisodeRecord;
use crate::pipeline::EpisodeProcessor;

pub fn router(processor: Arc<EpisodeProcessor>) -> Router {
    Router::new()
        .route("/", get(health).post(process_episode))
        .with_state(processor)
}

/// Run the ingress until the process is stopped.
pub async fn serve(processor: Arc<EpisodeProcessor>, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    log::info!("Worker listening on 0.0.0.0:{}", port);
    axum::serve(listener, router(processor)).await?;
    Ok(())
}

async fn health() -> &'static str {
    "OK"
}

async fn process_episode(
    State(processor): State<Arc<EpisodeProcessor>>,
    body: Bytes,
) -> (StatusCode, String) {
    let episode: EpisodeRecord = match serde_json::from_slice(&body) {
        Ok(episode) => episode,
        Err(e) => {
            log::warn!("Rejected malformed episode body: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                "No episode data provided".to_string(),
            );
        }
    };

    log::info!("Ingress accepted episode '{}'", episode.guid);

    match processor.process(&episode).await {
        Ok(location) => (
            StatusCode::OK,
            format!("Processed: {} -> {}", episode.title, location),
        ),
        Err(e) => {
            log::error!("Error processing '{}': {}", episode.guid, e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e))
        }
    }
}
