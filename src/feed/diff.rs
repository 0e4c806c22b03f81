//! Pure diff of freshly parsed feed entries against the seen-guid set.
//!
//! No I/O happens here; loading and saving the ledger is the caller's job
//! (see `state::DispatchLedger`), which keeps the diff itself trivially
//! testable.

use std::collections::HashSet;

use crate::models::EpisodeRecord;

/// Guids already discovered in previous runs.
pub type SeenSet = HashSet<String>;

/// Result of diffing one batch of parsed entries against the seen set.
#[derive(Debug)]
pub struct FeedDiff {
    /// Entries not in the seen set, in feed order.
    pub new_entries: Vec<EpisodeRecord>,
    /// `seen ∪ {guid of every input entry}`.
    pub updated_seen: SeenSet,
}

/// Select the entries whose guid has not been seen, preserving feed order,
/// and compute the seen set a successful run should persist.
pub fn diff_entries(entries: Vec<EpisodeRecord>, seen: &SeenSet) -> FeedDiff {
    let mut updated_seen = seen.clone();
    let mut new_entries = Vec::new();

    for entry in entries {
        // insert() doubles as the membership check; a guid repeated within
        // the same batch is only selected once
        if updated_seen.insert(entry.guid.clone()) {
            new_entries.push(entry);
        }
    }

    FeedDiff {
        new_entries,
        updated_seen,
    }
}
