//! Storage layer.
//!
//! Each workspace owns three stores:
//! - **Primary**: authoritative records in `SQLite` ([`SqliteStore`])
//! - **Lexical**: full-text search over projected item text (`SQLite` + FTS5)
//! - **Vector**: embedding similarity search (brute-force cosine)
//!
//! The lexical and vector stores are derived views keyed by the same
//! `(item_type, item_id)` identities as the primary store.

#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::cast_precision_loss)]

pub mod index;
pub mod sqlite;
pub mod traits;
pub mod vector;

pub use index::SqliteLexicalIndex;
pub use sqlite::{BacklogEntry, BacklogOp, SqliteStore};
pub use traits::{LexicalIndex, VectorIndex};
pub use vector::FlatVectorIndex;

use crate::Result;
use std::path::Path;
use std::sync::Arc;

/// File name of the primary database inside a workspace directory.
pub const PRIMARY_DB_FILE: &str = "context.db";
/// File name of the lexical index database.
pub const LEXICAL_DB_FILE: &str = "index.db";
/// File name of the persisted vector index.
pub const VECTOR_INDEX_FILE: &str = "vectors.json";

/// The three stores of one workspace.
#[derive(Clone)]
pub struct WorkspaceStores {
    /// Authoritative record store.
    pub primary: Arc<SqliteStore>,
    /// Lexical index.
    pub lexical: Arc<dyn LexicalIndex>,
    /// Similarity index.
    pub vector: Arc<dyn VectorIndex>,
}

impl WorkspaceStores {
    /// Creates stores with custom index backends.
    #[must_use]
    pub fn new(
        primary: SqliteStore,
        lexical: Arc<dyn LexicalIndex>,
        vector: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            primary: Arc::new(primary),
            lexical,
            vector,
        }
    }

    /// Creates in-memory stores.
    ///
    /// # Errors
    ///
    /// Returns an error if an in-memory database cannot be created.
    pub fn in_memory(dimensions: usize) -> Result<Self> {
        Ok(Self::new(
            SqliteStore::in_memory()?,
            Arc::new(SqliteLexicalIndex::in_memory()?),
            Arc::new(FlatVectorIndex::in_memory(dimensions)),
        ))
    }

    /// Opens (or creates) the stores inside `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if any store cannot be opened.
    pub fn open(dir: &Path, dimensions: usize) -> Result<Self> {
        Ok(Self::new(
            SqliteStore::new(dir.join(PRIMARY_DB_FILE))?,
            Arc::new(SqliteLexicalIndex::new(dir.join(LEXICAL_DB_FILE))?),
            Arc::new(FlatVectorIndex::open(dir.join(VECTOR_INDEX_FILE), dimensions)?),
        ))
    }
}

impl std::fmt::Debug for WorkspaceStores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceStores")
            .field("primary", &self.primary.db_path())
            .field("vector_dimensions", &self.vector.dimensions())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_workspace_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let stores = WorkspaceStores::open(dir.path(), 8).unwrap();
        assert!(dir.path().join(PRIMARY_DB_FILE).exists());
        assert!(dir.path().join(LEXICAL_DB_FILE).exists());
        assert_eq!(stores.vector.dimensions(), 8);
        assert_eq!(stores.lexical.count().unwrap(), 0);
    }
}
