//! Durable ledger of seen episode guids.
//!
//! One JSON file, read at the start of a discovery run and written at the
//! end. The load→diff→save cycle is a single logical transaction per run;
//! concurrent runs against the same ledger are not supported and must be
//! prevented by the scheduler (one invocation at a time).

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::feed::diff::SeenSet;

/// Wire format of the ledger file. The field may be absent in ledgers
/// written by older revisions; that reads as empty.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    seen_guids: Vec<String>,
}

/// File-backed dispatch ledger.
pub struct DispatchLedger {
    path: PathBuf,
}

impl DispatchLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the seen set. A missing ledger file is a valid cold start and
    /// returns the empty set; a present-but-unreadable file is an error, so
    /// a corrupt ledger never silently re-dispatches the whole feed.
    pub fn load(&self) -> Result<SeenSet> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No ledger at {:?}, starting cold", self.path);
                return Ok(HashSet::new());
            }
            Err(e) => {
                return Err(PipelineError::State(format!(
                    "Failed to read ledger {:?}: {}",
                    self.path, e
                )))
            }
        };

        let ledger: LedgerFile = serde_json::from_str(&content)
            .map_err(|e| PipelineError::State(format!("Failed to parse ledger: {}", e)))?;

        Ok(ledger.seen_guids.into_iter().collect())
    }

    /// Persist the seen set. All-or-nothing: the new content is written to a
    /// temp file in the same directory and renamed over the old ledger, so a
    /// failed save leaves the previous ledger intact and reports the error.
    pub fn save(&self, seen: &SeenSet) -> Result<()> {
        let mut seen_guids: Vec<String> = seen.iter().cloned().collect();
        seen_guids.sort(); // stable file content for identical sets

        let ledger = LedgerFile { seen_guids };
        let content = serde_json::to_string_pretty(&ledger)
            .map_err(|e| PipelineError::State(format!("Failed to serialize ledger: {}", e)))?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| {
            PipelineError::State(format!("Failed to create ledger directory: {}", e))
        })?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| PipelineError::State(format!("Failed to create temp ledger: {}", e)))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| PipelineError::State(format!("Failed to write ledger: {}", e)))?;
        tmp.flush()
            .map_err(|e| PipelineError::State(format!("Failed to flush ledger: {}", e)))?;
        tmp.persist(&self.path)
            .map_err(|e| PipelineError::State(format!("Failed to persist ledger: {}", e)))?;

        log::info!("Saved ledger with {} guids to {:?}", seen.len(), self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn cold_start_returns_empty_set() {
        let temp = TempDir::new().unwrap();
        let ledger = DispatchLedger::new(temp.path().join("missing/rss_state.json"));
        let seen = ledger.load().unwrap();
        assert!(seen.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let temp = TempDir::new().unwrap();
        let ledger = DispatchLedger::new(temp.path().join("rss_state.json"));

        let seen: SeenSet = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        ledger.save(&seen).unwrap();

        assert_eq!(ledger.load().unwrap(), seen);
    }

    #[test]
    fn save_creates_parent_directories() {
        let temp = TempDir::new().unwrap();
        let ledger = DispatchLedger::new(temp.path().join("nested/state/rss_state.json"));
        ledger.save(&SeenSet::new()).unwrap();
        assert!(ledger.path().exists());
    }

    #[test]
    fn missing_field_reads_as_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rss_state.json");
        std::fs::write(&path, "{}").unwrap();

        let seen = DispatchLedger::new(&path).load().unwrap();
        assert!(seen.is_empty());
    }

    #[test]
    fn corrupt_ledger_is_an_error_not_a_reset() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rss_state.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(DispatchLedger::new(&path).load().is_err());
    }

    #[test]
    fn save_overwrites_previous_content() {
        let temp = TempDir::new().unwrap();
        let ledger = DispatchLedger::new(temp.path().join("rss_state.json"));

        let first: SeenSet = ["a"].iter().map(|s| s.to_string()).collect();
        ledger.save(&first).unwrap();

        let second: SeenSet = ["a", "b"].iter().map(|s| s.to_string()).collect();
        ledger.save(&second).unwrap();

        assert_eq!(ledger.load().unwrap(), second);
    }
}
