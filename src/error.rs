use thiserror::Error;

/// Typed error taxonomy for the discovery and processing pipeline.
///
/// Each variant maps to one stage boundary so callers can tell retryable
/// failures (fetch, store) apart from ones that need attention (transcribe)
/// and from ledger failures that must abort a discovery run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Network or I/O failure while retrieving audio. Retryable.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Speech model or codec failure. Retry only if transient.
    #[error("transcription failed: {0}")]
    Transcribe(String),

    /// Durable-write failure. The episode must not be treated as processed.
    #[error("store failed: {0}")]
    Store(String),

    /// Enqueue failure for one episode. Reported, never fatal to the batch.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// Ledger load/save failure. The run aborts without marking anything seen.
    #[error("ledger error: {0}")]
    State(String),

    /// Feed fetch/parse failure. Skips the feed, not the run.
    #[error("feed error: {0}")]
    Feed(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// True when the episode may safely be re-dispatched later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::Store(_) | Self::Dispatch(_))
    }
}

// ── From impls ─────────────────────────────────────────────────────────────

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        PipelineError::State(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(PipelineError::Fetch("timeout".into()).is_retryable());
        assert!(PipelineError::Store("disk full".into()).is_retryable());
        assert!(!PipelineError::Transcribe("bad codec".into()).is_retryable());
        assert!(!PipelineError::State("rename failed".into()).is_retryable());
    }

    #[test]
    fn messages_carry_cause() {
        let e = PipelineError::Fetch("status 503".into());
        assert_eq!(e.to_string(), "fetch failed: status 503");
    }
}
