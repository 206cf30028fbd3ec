//! # Contextkeep
//!
//! Workspace-scoped project context for AI coding assistants.
//!
//! Contextkeep keeps four things per workspace:
//!
//! - Versioned singleton documents (product and active context) with
//!   append-only history and key-level patches
//! - A knowledge graph of decisions, progress entries, system patterns and
//!   custom data, joined by loosely-coupled typed links
//! - A lexical (FTS5) and a similarity index kept in step with the graph,
//!   fused into a single hybrid ranking
//! - A deterministic stable-context prefix with a content hash, staleness
//!   detection and token-budgeted dynamic context
//!
//! ## Example
//!
//! ```rust,ignore
//! use contextkeep::{ContextKeepConfig, ContextKind, ContextUpdate, ServiceContainer, WorkspaceId};
//!
//! let services = ServiceContainer::new(ContextKeepConfig::in_memory())?;
//! let workspace = WorkspaceId::new("/home/me/project")?;
//! let doc = services.context().update(
//!     &workspace,
//!     ContextKind::Product,
//!     ContextUpdate::replace(serde_json::json!({"goal": "ship"}))?,
//! )?;
//! assert_eq!(doc.version, 1);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod embedding;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::ContextKeepConfig;
pub use embedding::Embedder;
pub use models::{
    ContextDocument, ContextKind, ContextUpdate, ContextVersion, ItemType, KnowledgeItem, Link,
    PatchOp, SearchFilter, SearchHit, SearchMode, WorkspaceId,
};
pub use services::{
    ActivityService, AssemblerService, ContextService, GraphService, IndexSynchronizer,
    SearchService, ServiceContainer, WorkspaceRegistry,
};
pub use storage::{LexicalIndex, SqliteStore, VectorIndex, WorkspaceStores};

/// Error type for contextkeep operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Contradictory or missing arguments, unknown item types, bad filters |
/// | `NotFound` | A referenced id, version, or category/key does not exist |
/// | `OperationFailed` | The primary store or an index is unavailable, I/O or serialization fails |
///
/// A failed index write after a committed primary write is never an error;
/// it is reported through the `*_pending` flags on write results.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - Both or neither of `content` and `patch` are supplied to a document update
    /// - A required item field is empty (decision summary, pattern name, ...)
    /// - Mutually exclusive filters are combined
    /// - An item type string is not recognized
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// The kind of entity that was looked up.
        kind: String,
        /// The identifier that was not found.
        id: String,
    },

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` database operations fail
    /// - Filesystem I/O errors occur
    /// - Stored JSON cannot be decoded
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Builds a [`Error::NotFound`] from anything displayable.
    pub fn not_found(kind: impl Into<String>, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.to_string(),
        }
    }

    /// Returns true for validation failures.
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    /// Returns true for missing entities.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for contextkeep operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current time truncated to microsecond precision.
///
/// Timestamps are stored as microseconds, so truncating up front makes a
/// value returned from a write equal to the value read back later.
///
/// # Examples
///
/// ```rust
/// use contextkeep::current_timestamp;
///
/// assert_eq!(current_timestamp().timestamp_subsec_nanos() % 1000, 0);
/// ```
#[must_use]
pub fn current_timestamp() -> chrono::DateTime<chrono::Utc> {
    let now = chrono::Utc::now();
    chrono::DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}
