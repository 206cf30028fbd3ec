//! `SQLite` primary record store.
//!
//! One [`SqliteStore`] per workspace holds the singleton documents and their
//! history, every knowledge item, the link table, per-source change markers
//! and the index backlog. All access goes through a single
//! `Mutex<Connection>`, so every method observes a consistent snapshot and
//! writes never interleave.
//!
//! ## Module Structure
//!
//! - [`connection`]: lock acquisition, pragmas, transactions, metrics
//! - `documents`: versioned documents and history
//! - `items`: decisions, progress entries, system patterns, custom data
//! - `links`: the link table
//! - `markers`: change markers and the index backlog

mod connection;
mod documents;
mod items;
mod links;
mod markers;

pub use connection::{
    acquire_lock, configure_connection, from_micros, immediate_transaction, measured, open_file,
    open_memory, record_operation_metrics, sql_err, to_micros,
};
pub use markers::{BacklogEntry, BacklogOp};

use crate::Result;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Backend label used in metrics.
pub(crate) const BACKEND: &str = "sqlite";

/// `SQLite`-based primary store for one workspace.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens (or creates) a store at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = open_file(&db_path, "open_primary_store")?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = open_memory("open_primary_store_memory")?;
        let store = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        acquire_lock(&self.conn)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.lock();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS context_documents (
                kind TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS context_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                version INTEGER NOT NULL,
                content TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                change_source TEXT NOT NULL,
                UNIQUE (kind, version)
            );
            CREATE TABLE IF NOT EXISTS decisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                summary TEXT NOT NULL,
                rationale TEXT,
                implementation_details TEXT,
                tags TEXT NOT NULL DEFAULT '[]'
            );
            CREATE TABLE IF NOT EXISTS progress_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                status TEXT NOT NULL,
                description TEXT NOT NULL,
                parent_id INTEGER
            );
            CREATE TABLE IF NOT EXISTS system_patterns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                name TEXT NOT NULL UNIQUE,
                description TEXT,
                tags TEXT NOT NULL DEFAULT '[]'
            );
            CREATE TABLE IF NOT EXISTS custom_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                category TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                cache_hint INTEGER,
                cache_score INTEGER,
                UNIQUE (category, key)
            );
            CREATE TABLE IF NOT EXISTS context_links (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                source_item_type TEXT NOT NULL,
                source_item_id TEXT NOT NULL,
                target_item_type TEXT NOT NULL,
                target_item_id TEXT NOT NULL,
                relationship_type TEXT NOT NULL,
                description TEXT
            );
            CREATE TABLE IF NOT EXISTS change_markers (
                source TEXT PRIMARY KEY,
                modified_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS index_backlog (
                item_type TEXT NOT NULL,
                item_id INTEGER NOT NULL,
                operation TEXT NOT NULL,
                recorded_at INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 1,
                last_error TEXT,
                PRIMARY KEY (item_type, item_id)
            );",
        )
        .map_err(sql_err("create_primary_schema"))?;

        Self::create_indexes(&conn);
        Ok(())
    }

    /// Creates secondary indexes. Failures only cost performance.
    fn create_indexes(conn: &Connection) {
        for sql in [
            "CREATE INDEX IF NOT EXISTS idx_history_kind_version ON context_history(kind, version DESC)",
            "CREATE INDEX IF NOT EXISTS idx_decisions_timestamp ON decisions(timestamp DESC)",
            "CREATE INDEX IF NOT EXISTS idx_progress_status ON progress_entries(status)",
            "CREATE INDEX IF NOT EXISTS idx_progress_parent ON progress_entries(parent_id)",
            "CREATE INDEX IF NOT EXISTS idx_custom_data_category ON custom_data(category)",
            "CREATE INDEX IF NOT EXISTS idx_links_source ON context_links(source_item_type, source_item_id)",
            "CREATE INDEX IF NOT EXISTS idx_links_target ON context_links(target_item_type, target_item_id)",
        ] {
            let _ = conn.execute(sql, []);
        }
    }
}

/// Decodes a JSON tag list, treating malformed values as empty.
pub(crate) fn decode_tags(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Encodes a tag list as JSON.
pub(crate) fn encode_tags(tags: &[String]) -> Result<String> {
    serde_json::to_string(tags).map_err(sql_err("serialize_tags"))
}
