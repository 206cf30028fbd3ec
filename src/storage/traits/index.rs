//! Lexical index trait.
//!
//! The lexical index is a derived view of the primary store: one entry per
//! knowledge item holding its projected text and tags, keyed by the item's
//! [`ItemRef`].
//!
//! # Error Recovery
//!
//! | Failure | Effect |
//! |---------|--------|
//! | `index` fails after the primary write | write reports `index_sync_pending`, backlog row recorded |
//! | `remove` fails after the primary delete | delete reports `index_cleanup_pending`, backlog row recorded |
//! | `search` fails | the search call fails with [`crate::Error::OperationFailed`] |

use crate::Result;
use crate::models::{ItemRef, ItemType};

/// Trait for lexical (full-text) index backends.
///
/// # Implementor Notes
///
/// - Methods use `&self` to enable sharing via `Arc<dyn LexicalIndex>`
/// - Use interior mutability (e.g., `Mutex<Connection>`) for mutable state
/// - `index` replaces any existing entry for the same identity
/// - Scores are relevance values where higher is better
pub trait LexicalIndex: Send + Sync {
    /// Indexes (or re-indexes) the text of one item.
    ///
    /// # Errors
    ///
    /// Returns an error if the indexing operation fails.
    fn index(&self, item: ItemRef, text: &str, tags: &[String]) -> Result<()>;

    /// Removes an item from the index.
    ///
    /// Returns true if an entry was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal operation fails.
    fn remove(&self, item: ItemRef) -> Result<bool>;

    /// Searches for items matching a text query.
    ///
    /// Returns identities with their relevance scores, best first. An empty
    /// `item_types` slice means every type.
    ///
    /// # Errors
    ///
    /// Returns an error if the search operation fails.
    fn search(&self, query: &str, item_types: &[ItemType], limit: usize)
    -> Result<Vec<(ItemRef, f32)>>;

    /// Returns the number of indexed items.
    ///
    /// # Errors
    ///
    /// Returns an error if the count operation fails.
    fn count(&self) -> Result<usize>;
}
