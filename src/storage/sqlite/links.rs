//! Link table.
//!
//! Links are stored directionally and queried in both directions. Endpoint
//! existence is never checked.

use super::{BACKEND, SqliteStore, from_micros, immediate_transaction, measured, sql_err, to_micros};
use crate::models::{Link, LinkQuery, NewLink};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, Row, params, params_from_iter};
use tracing::instrument;

const LINK_COLUMNS: &str = "id, timestamp, source_item_type, source_item_id, \
     target_item_type, target_item_id, relationship_type, description";

fn link_from_row(row: &Row<'_>) -> rusqlite::Result<Link> {
    Ok(Link {
        id: row.get(0)?,
        timestamp: from_micros(row.get(1)?),
        source_item_type: row.get(2)?,
        source_item_id: row.get(3)?,
        target_item_type: row.get(4)?,
        target_item_id: row.get(5)?,
        relationship_type: row.get(6)?,
        description: row.get(7)?,
    })
}

/// Inserts a link row within an open transaction.
pub(super) fn insert_link_row(conn: &Connection, link: &NewLink, now: DateTime<Utc>) -> Result<Link> {
    conn.execute(
        "INSERT INTO context_links (timestamp, source_item_type, source_item_id,
            target_item_type, target_item_id, relationship_type, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            to_micros(now),
            link.source_item_type,
            link.source_item_id,
            link.target_item_type,
            link.target_item_id,
            link.relationship_type,
            link.description
        ],
    )
    .map_err(sql_err("insert_link"))?;

    Ok(Link {
        id: conn.last_insert_rowid(),
        source_item_type: link.source_item_type.clone(),
        source_item_id: link.source_item_id.clone(),
        target_item_type: link.target_item_type.clone(),
        target_item_id: link.target_item_id.clone(),
        relationship_type: link.relationship_type.clone(),
        description: link.description.clone(),
        timestamp: now,
    })
}

fn query_links(conn: &Connection, sql: &str, args: Vec<SqlValue>) -> Result<Vec<Link>> {
    let mut stmt = conn.prepare(sql).map_err(sql_err("prepare_links"))?;
    let rows = stmt
        .query_map(params_from_iter(args), link_from_row)
        .map_err(sql_err("query_links"))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(sql_err("read_link_row"))
}

impl SqliteStore {
    /// Inserts a link.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the write fails.
    #[instrument(skip(self, link), fields(operation = "insert_link", backend = "sqlite", relationship = %link.relationship_type))]
    pub fn insert_link(&self, link: &NewLink, now: DateTime<Utc>) -> Result<Link> {
        measured(BACKEND, "insert_link", || {
            let conn = self.lock();
            immediate_transaction(&conn, |conn| insert_link_row(conn, link, now))
        })
    }

    /// Returns links touching `query`'s identity as source or target,
    /// newest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the read fails.
    #[instrument(skip(self), fields(operation = "links_for", backend = "sqlite"))]
    pub fn links_for(&self, query: &LinkQuery) -> Result<Vec<Link>> {
        measured(BACKEND, "links_for", || {
            let conn = self.lock();
            let mut sql = format!(
                "SELECT {LINK_COLUMNS} FROM context_links
                 WHERE ((source_item_type = ?1 AND source_item_id = ?2)
                     OR (target_item_type = ?1 AND target_item_id = ?2))"
            );
            let mut args = vec![
                SqlValue::from(query.item_type.clone()),
                SqlValue::from(query.item_id.clone()),
            ];
            if let Some(relationship) = &query.relationship_type {
                args.push(SqlValue::from(relationship.clone()));
                sql.push_str(&format!(" AND relationship_type = ?{}", args.len()));
            }
            if let Some(linked_type) = &query.linked_item_type {
                args.push(SqlValue::from(linked_type.clone()));
                sql.push_str(&format!(
                    " AND (CASE WHEN source_item_type = ?1 AND source_item_id = ?2
                               THEN target_item_type ELSE source_item_type END) = ?{}",
                    args.len()
                ));
            }
            sql.push_str(" ORDER BY timestamp DESC, id DESC");
            if let Some(limit) = query.limit {
                args.push(SqlValue::from(i64::try_from(limit).unwrap_or(i64::MAX)));
                sql.push_str(&format!(" LIMIT ?{}", args.len()));
            }
            query_links(&conn, &sql, args)
        })
    }

    /// Returns links created at or after `since`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the read fails.
    pub fn links_since(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<Link>> {
        measured(BACKEND, "links_since", || {
            let conn = self.lock();
            let sql = format!(
                "SELECT {LINK_COLUMNS} FROM context_links
                 WHERE timestamp >= ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2"
            );
            query_links(
                &conn,
                &sql,
                vec![
                    SqlValue::from(to_micros(since)),
                    SqlValue::from(i64::try_from(limit).unwrap_or(i64::MAX)),
                ],
            )
        })
    }

    /// Deletes one link by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no link has this id, or
    /// [`Error::OperationFailed`] if the write fails.
    #[instrument(skip(self), fields(operation = "delete_link", backend = "sqlite"))]
    pub fn delete_link(&self, id: i64) -> Result<()> {
        measured(BACKEND, "delete_link", || {
            let conn = self.lock();
            let deleted = conn
                .execute("DELETE FROM context_links WHERE id = ?1", params![id])
                .map_err(sql_err("delete_link"))?;
            if deleted == 0 {
                return Err(Error::not_found("link", id));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::current_timestamp;

    #[test]
    fn test_links_are_bidirectional() {
        let store = SqliteStore::in_memory().unwrap();
        let now = current_timestamp();
        store
            .insert_link(
                &NewLink::new(("decision", "5"), ("system_pattern", "Repository Pattern"), "implements"),
                now,
            )
            .unwrap();

        let from_source = store.links_for(&LinkQuery::new("decision", "5")).unwrap();
        let from_target = store
            .links_for(&LinkQuery::new("system_pattern", "Repository Pattern"))
            .unwrap();
        assert_eq!(from_source.len(), 1);
        assert_eq!(from_source, from_target);
    }

    #[test]
    fn test_linked_type_filters_other_endpoint() {
        let store = SqliteStore::in_memory().unwrap();
        let now = current_timestamp();
        store
            .insert_link(&NewLink::new(("decision", "1"), ("progress_entry", "2"), "tracks"), now)
            .unwrap();
        store
            .insert_link(&NewLink::new(("system_pattern", "3"), ("decision", "1"), "informs"), now)
            .unwrap();

        let query = LinkQuery::new("decision", "1").with_linked_type("system_pattern");
        let links = store.links_for(&query).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].relationship_type, "informs");

        let query = LinkQuery::new("decision", "1").with_linked_type("decision");
        assert!(store.links_for(&query).unwrap().is_empty());
    }

    #[test]
    fn test_delete_link() {
        let store = SqliteStore::in_memory().unwrap();
        let link = store
            .insert_link(
                &NewLink::new(("decision", "1"), ("decision", "2"), "supersedes"),
                current_timestamp(),
            )
            .unwrap();
        store.delete_link(link.id).unwrap();
        assert!(store.delete_link(link.id).unwrap_err().is_not_found());
    }
}
