//! Similarity index trait.
//!
//! Entries are keyed by the same [`ItemRef`] tuples the primary store uses,
//! so every hit can be joined back to its item.

use crate::Result;
use crate::models::{ItemRef, ItemType};

/// Trait for similarity (vector) index backends.
///
/// # Implementor Notes
///
/// - Methods use `&self` to enable sharing via `Arc<dyn VectorIndex>`
/// - Use interior mutability for mutable state
/// - All embeddings must match [`dimensions()`](VectorIndex::dimensions)
pub trait VectorIndex: Send + Sync {
    /// The dimensionality of stored embeddings.
    fn dimensions(&self) -> usize;

    /// Inserts or replaces the embedding of one item.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedding has the wrong dimensions or the
    /// write fails.
    fn upsert(&self, item: ItemRef, embedding: &[f32]) -> Result<()>;

    /// Removes an item's embedding.
    ///
    /// Returns true if an entry was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    fn remove(&self, item: ItemRef) -> Result<bool>;

    /// Searches for the most similar embeddings.
    ///
    /// Returns identities with similarity scores in `[0, 1]`, best first. An
    /// empty `item_types` slice means every type.
    ///
    /// # Errors
    ///
    /// Returns an error if the search fails.
    fn search(
        &self,
        query_embedding: &[f32],
        item_types: &[ItemType],
        limit: usize,
    ) -> Result<Vec<(ItemRef, f32)>>;

    /// Returns the number of stored embeddings.
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    fn count(&self) -> Result<usize>;
}
