//! Per-source change markers and the index backlog.
//!
//! A change marker records when a source (`product_context`, `decisions`,
//! `custom_data`, ...) was last written. Markers are bumped inside the same
//! transaction as the write they describe.
//!
//! The backlog records index writes or removals that failed after their
//! primary write committed, one row per item identity.

use super::{BACKEND, SqliteStore, from_micros, measured, sql_err, to_micros};
use crate::Result;
use crate::models::{ItemRef, ItemType};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::instrument;

/// Index operation awaiting reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacklogOp {
    /// Re-project the item into both indexes.
    Upsert,
    /// Remove the item from both indexes.
    Remove,
}

impl BacklogOp {
    /// Returns the operation as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Remove => "remove",
        }
    }

    fn parse(s: &str) -> Self {
        if s == "remove" { Self::Remove } else { Self::Upsert }
    }
}

/// A pending index operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogEntry {
    /// Item whose index entry diverged.
    pub item: ItemRef,
    /// What still has to happen.
    pub operation: BacklogOp,
    /// When the latest failure was recorded.
    pub recorded_at: DateTime<Utc>,
    /// Number of failed attempts so far.
    pub attempts: u32,
    /// Last failure message.
    pub last_error: Option<String>,
}

impl SqliteStore {
    /// Bumps the change marker for `source` within an open transaction.
    pub(crate) fn touch_marker(conn: &Connection, source: &str, now: DateTime<Utc>) -> Result<()> {
        conn.execute(
            "INSERT INTO change_markers (source, modified_at) VALUES (?1, ?2)
             ON CONFLICT(source) DO UPDATE SET
                modified_at = MAX(modified_at, excluded.modified_at)",
            params![source, to_micros(now)],
        )
        .map_err(sql_err("touch_change_marker"))?;
        Ok(())
    }

    /// Returns every change marker keyed by source name.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OperationFailed`] if the read fails.
    #[instrument(skip(self), fields(operation = "change_markers", backend = "sqlite"))]
    pub fn change_markers(&self) -> Result<BTreeMap<String, DateTime<Utc>>> {
        measured(BACKEND, "change_markers", || {
            let conn = self.lock();
            let mut stmt = conn
                .prepare("SELECT source, modified_at FROM change_markers")
                .map_err(sql_err("prepare_change_markers"))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
                .map_err(sql_err("query_change_markers"))?;

            let mut markers = BTreeMap::new();
            for row in rows {
                let (source, modified_at) = row.map_err(sql_err("read_change_marker"))?;
                markers.insert(source, from_micros(modified_at));
            }
            Ok(markers)
        })
    }

    /// Records (or re-records) a failed index operation for `item`.
    ///
    /// A later failure for the same item replaces the operation and
    /// increments the attempt count.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OperationFailed`] if the write fails.
    #[instrument(skip(self), fields(operation = "record_backlog", backend = "sqlite", item = %item))]
    pub fn record_backlog(
        &self,
        item: ItemRef,
        operation: BacklogOp,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        measured(BACKEND, "record_backlog", || {
            let conn = self.lock();
            conn.execute(
                "INSERT INTO index_backlog (item_type, item_id, operation, recorded_at, attempts, last_error)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5)
                 ON CONFLICT(item_type, item_id) DO UPDATE SET
                    operation = excluded.operation,
                    recorded_at = excluded.recorded_at,
                    attempts = attempts + 1,
                    last_error = excluded.last_error",
                params![
                    item.item_type.as_str(),
                    item.item_id,
                    operation.as_str(),
                    to_micros(now),
                    error
                ],
            )
            .map_err(sql_err("record_backlog"))?;
            Ok(())
        })
    }

    /// Returns the backlog, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OperationFailed`] if the read fails.
    pub fn backlog(&self) -> Result<Vec<BacklogEntry>> {
        measured(BACKEND, "read_backlog", || {
            let conn = self.lock();
            let mut stmt = conn
                .prepare(
                    "SELECT item_type, item_id, operation, recorded_at, attempts, last_error
                     FROM index_backlog ORDER BY recorded_at ASC, item_type ASC, item_id ASC",
                )
                .map_err(sql_err("prepare_backlog"))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                })
                .map_err(sql_err("query_backlog"))?;

            let mut entries = Vec::new();
            for row in rows {
                let (item_type, item_id, operation, recorded_at, attempts, last_error) =
                    row.map_err(sql_err("read_backlog_row"))?;
                let Some(item_type) = ItemType::parse(&item_type) else {
                    tracing::warn!(item_type = %item_type, "Skipping backlog row with unknown item type");
                    continue;
                };
                entries.push(BacklogEntry {
                    item: ItemRef::new(item_type, item_id),
                    operation: BacklogOp::parse(&operation),
                    recorded_at: from_micros(recorded_at),
                    attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
                    last_error,
                });
            }
            Ok(entries)
        })
    }

    /// Removes the backlog row for `item`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OperationFailed`] if the write fails.
    pub fn clear_backlog(&self, item: ItemRef) -> Result<()> {
        measured(BACKEND, "clear_backlog", || {
            let conn = self.lock();
            conn.execute(
                "DELETE FROM index_backlog WHERE item_type = ?1 AND item_id = ?2",
                params![item.item_type.as_str(), item.item_id],
            )
            .map_err(sql_err("clear_backlog"))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::current_timestamp;

    #[test]
    fn test_backlog_upserts_per_item() {
        let store = SqliteStore::in_memory().unwrap();
        let item = ItemRef::new(ItemType::Decision, 4);
        let now = current_timestamp();
        store.record_backlog(item, BacklogOp::Upsert, "down", now).unwrap();
        store.record_backlog(item, BacklogOp::Remove, "still down", now).unwrap();

        let backlog = store.backlog().unwrap();
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].operation, BacklogOp::Remove);
        assert_eq!(backlog[0].attempts, 2);
        assert_eq!(backlog[0].last_error.as_deref(), Some("still down"));

        store.clear_backlog(item).unwrap();
        assert!(store.backlog().unwrap().is_empty());
    }

    #[test]
    fn test_markers_never_move_backwards() {
        let store = SqliteStore::in_memory().unwrap();
        let later = current_timestamp();
        let earlier = later - chrono::Duration::seconds(10);
        {
            let conn = store.lock();
            SqliteStore::touch_marker(&conn, "custom_data", later).unwrap();
            SqliteStore::touch_marker(&conn, "custom_data", earlier).unwrap();
        }
        let markers = store.change_markers().unwrap();
        assert_eq!(markers.get("custom_data"), Some(&later));
    }
}
