//! Results of write operations.
//!
//! Index maintenance happens after the primary commit. When it fails the
//! write still succeeds and the result carries a pending flag instead of
//! an error.

use super::{CacheSuggestion, CustomDatum, ItemRef, KnowledgeItem, Link, ProgressEntry};
use serde::{Deserialize, Serialize};

/// Result of a create or update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteOutcome<T> {
    /// The committed record.
    pub item: T,
    /// True if the index write failed and awaits reconciliation.
    pub index_sync_pending: bool,
}

impl<T> WriteOutcome<T> {
    /// Maps the committed record, keeping the flag.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WriteOutcome<U> {
        WriteOutcome {
            item: f(self.item),
            index_sync_pending: self.index_sync_pending,
        }
    }
}

/// A logged progress entry and the link created with it, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedProgress {
    /// The new entry.
    pub entry: ProgressEntry,
    /// Link from the entry to the item named at logging time.
    pub link: Option<Link>,
}

/// A logged custom datum and any caching advice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedCustomData {
    /// The stored datum.
    pub datum: CustomDatum,
    /// Caching advice, when the value is large or advice was requested.
    pub cache_suggestion: Option<CacheSuggestion>,
}

/// Result of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    /// The deleted identity.
    pub deleted: ItemRef,
    /// True if index cleanup failed and awaits reconciliation.
    pub index_cleanup_pending: bool,
}

/// Outcome of one element of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchItemResult {
    /// The element was logged.
    Logged {
        /// Position in the input list.
        index: usize,
        /// The committed item.
        item: KnowledgeItem,
        /// True if the index write failed.
        index_sync_pending: bool,
    },
    /// The element was rejected or failed.
    Failed {
        /// Position in the input list.
        index: usize,
        /// Why it failed.
        error: String,
    },
}

impl BatchItemResult {
    /// Returns true for a logged element.
    #[must_use]
    pub const fn is_logged(&self) -> bool {
        matches!(self, Self::Logged { .. })
    }
}

/// Per-element outcomes of a batch log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// One entry per input element, in input order.
    pub results: Vec<BatchItemResult>,
}

impl BatchReport {
    /// Number of logged elements.
    #[must_use]
    pub fn logged_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_logged()).count()
    }

    /// Number of failed elements.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.results.len() - self.logged_count()
    }
}

/// Result of replaying the index backlog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Backlog entries applied successfully.
    pub repaired: usize,
    /// Backlog entries that failed again.
    pub still_pending: usize,
}
