//! `SQLite` + FTS5 lexical index.
//!
//! A standalone database with one FTS5 table. Rows are keyed by
//! `(item_type, item_id)`; `content` and `tags` are tokenized, the identity
//! columns are stored but not indexed.

use crate::models::{ItemRef, ItemType};
use crate::storage::sqlite::{acquire_lock, measured, open_file, open_memory, sql_err};
use crate::storage::traits::LexicalIndex;
use crate::Result;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params, params_from_iter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::instrument;

const BACKEND: &str = "sqlite_fts";

/// SQLite-based lexical index with FTS5 and BM25 ranking.
pub struct SqliteLexicalIndex {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SqliteLexicalIndex {
    /// Opens (or creates) an index at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = open_file(&db_path, "open_lexical_index")?;
        let index = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        index.initialize()?;
        Ok(index)
    }

    /// Creates an in-memory index (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the FTS table cannot be created.
    pub fn in_memory() -> Result<Self> {
        let index = Self {
            conn: Mutex::new(open_memory("open_lexical_index_memory")?),
            db_path: None,
        };
        index.initialize()?;
        Ok(index)
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute(
            "CREATE VIRTUAL TABLE IF NOT EXISTS items_fts USING fts5(
                item_type UNINDEXED,
                item_id UNINDEXED,
                content,
                tags
            )",
            [],
        )
        .map_err(sql_err("create_fts_table"))?;
        Ok(())
    }
}

/// Builds an FTS5 query from free text.
///
/// Each whitespace-separated term is quoted (doubling embedded quotes) so
/// FTS5 operators in user input are matched literally, and terms are joined
/// with `OR`. Returns `None` for a blank query.
#[must_use]
pub fn build_fts_query(query: &str) -> Option<String> {
    let terms: Vec<_> = query.split_whitespace().collect();
    if terms.is_empty() {
        return None;
    }
    let estimated_len = terms.iter().map(|t| t.len() + 8).sum::<usize>();
    let mut fts_query = String::with_capacity(estimated_len);
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            fts_query.push_str(" OR ");
        }
        fts_query.push('"');
        for c in term.chars() {
            if c == '"' {
                fts_query.push_str("\"\"");
            } else {
                fts_query.push(c);
            }
        }
        fts_query.push('"');
    }
    Some(fts_query)
}

/// Maps a BM25 score (more negative is better) into `(0, 1)`.
#[allow(clippy::cast_possible_truncation)]
fn normalize_bm25(score: f64) -> f32 {
    let positive_score = -score;
    let sigmoid = 1.0 / (1.0 + (-0.5 * positive_score).exp());
    sigmoid.clamp(0.0, 1.0) as f32
}

impl LexicalIndex for SqliteLexicalIndex {
    #[instrument(skip(self, text, tags), fields(operation = "index", backend = "sqlite_fts", item = %item))]
    fn index(&self, item: ItemRef, text: &str, tags: &[String]) -> Result<()> {
        measured(BACKEND, "index", || {
            let conn = acquire_lock(&self.conn);
            crate::storage::sqlite::immediate_transaction(&conn, |conn| {
                conn.execute(
                    "DELETE FROM items_fts WHERE item_type = ?1 AND item_id = ?2",
                    params![item.item_type.as_str(), item.item_id],
                )
                .map_err(sql_err("delete_fts"))?;
                conn.execute(
                    "INSERT INTO items_fts (item_type, item_id, content, tags) VALUES (?1, ?2, ?3, ?4)",
                    params![item.item_type.as_str(), item.item_id, text, tags.join(" ")],
                )
                .map_err(sql_err("insert_fts"))?;
                Ok(())
            })
        })
    }

    #[instrument(skip(self), fields(operation = "remove", backend = "sqlite_fts", item = %item))]
    fn remove(&self, item: ItemRef) -> Result<bool> {
        measured(BACKEND, "remove", || {
            let conn = acquire_lock(&self.conn);
            let deleted = conn
                .execute(
                    "DELETE FROM items_fts WHERE item_type = ?1 AND item_id = ?2",
                    params![item.item_type.as_str(), item.item_id],
                )
                .map_err(sql_err("delete_fts"))?;
            Ok(deleted > 0)
        })
    }

    #[instrument(
        skip(self, query, item_types),
        fields(operation = "search", backend = "sqlite_fts", query_length = query.len(), limit = limit)
    )]
    fn search(
        &self,
        query: &str,
        item_types: &[ItemType],
        limit: usize,
    ) -> Result<Vec<(ItemRef, f32)>> {
        let Some(fts_query) = build_fts_query(query) else {
            return Ok(Vec::new());
        };

        measured(BACKEND, "search", || {
            let conn = acquire_lock(&self.conn);

            let mut args = vec![SqlValue::from(fts_query)];
            let mut type_clause = String::new();
            if !item_types.is_empty() {
                let placeholders: Vec<String> = item_types
                    .iter()
                    .map(|t| {
                        args.push(SqlValue::from(t.as_str().to_string()));
                        format!("?{}", args.len())
                    })
                    .collect();
                type_clause = format!(" AND item_type IN ({})", placeholders.join(", "));
            }
            args.push(SqlValue::from(i64::try_from(limit).unwrap_or(i64::MAX)));
            let sql = format!(
                "SELECT item_type, item_id, bm25(items_fts) AS score
                 FROM items_fts
                 WHERE items_fts MATCH ?1{type_clause}
                 ORDER BY score
                 LIMIT ?{}",
                args.len()
            );

            let mut stmt = conn.prepare(&sql).map_err(sql_err("prepare_search"))?;
            let rows = stmt
                .query_map(params_from_iter(args), |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, f64>(2)?,
                    ))
                })
                .map_err(sql_err("execute_search"))?;

            let mut results = Vec::new();
            for row in rows {
                let (item_type, item_id, score) = row.map_err(sql_err("read_search_row"))?;
                if let Some(item_type) = ItemType::parse(&item_type) {
                    results.push((ItemRef::new(item_type, item_id), normalize_bm25(score)));
                }
            }
            Ok(results)
        })
    }

    fn count(&self) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM items_fts", [], |row| row.get(0))
            .map_err(sql_err("count_fts"))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
