pub mod config;
pub mod dispatch;
pub mod error;
pub mod feed;
pub mod models;
pub mod pipeline;
pub mod runner;
pub mod server;
pub mod state;

pub use config::Config;
pub use error::PipelineError;
pub use models::{EpisodeRecord, TranscriptSegment, TranscriptionResult};
