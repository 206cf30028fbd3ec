//! Knowledge item persistence.
//!
//! Every write bumps the change marker of its item type inside the same
//! transaction, so staleness checks always see the write and its marker
//! together.

use super::links::insert_link_row;
use super::{
    BACKEND, SqliteStore, decode_tags, encode_tags, from_micros, immediate_transaction, measured,
    sql_err, to_micros,
};
use crate::models::{
    CustomDatum, Decision, ItemFilter, ItemRef, ItemType, KnowledgeItem, Link, NewCustomDatum,
    NewDecision, NewLink, NewProgress, NewSystemPattern, ProgressEntry, ProgressUpdate,
    SystemPattern,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::collections::HashMap;
use tracing::instrument;

const DECISION_COLUMNS: &str = "id, timestamp, summary, rationale, implementation_details, tags";
const PROGRESS_COLUMNS: &str = "id, timestamp, status, description, parent_id";
const PATTERN_COLUMNS: &str = "id, timestamp, name, description, tags";
const CUSTOM_DATA_COLUMNS: &str = "id, timestamp, category, key, value, cache_hint, cache_score";

const fn table_name(item_type: ItemType) -> &'static str {
    match item_type {
        ItemType::Decision => "decisions",
        ItemType::ProgressEntry => "progress_entries",
        ItemType::SystemPattern => "system_patterns",
        ItemType::CustomData => "custom_data",
    }
}

const fn columns(item_type: ItemType) -> &'static str {
    match item_type {
        ItemType::Decision => DECISION_COLUMNS,
        ItemType::ProgressEntry => PROGRESS_COLUMNS,
        ItemType::SystemPattern => PATTERN_COLUMNS,
        ItemType::CustomData => CUSTOM_DATA_COLUMNS,
    }
}

fn decision_from_row(row: &Row<'_>) -> rusqlite::Result<Decision> {
    Ok(Decision {
        id: row.get(0)?,
        timestamp: from_micros(row.get(1)?),
        summary: row.get(2)?,
        rationale: row.get(3)?,
        implementation_details: row.get(4)?,
        tags: decode_tags(&row.get::<_, String>(5)?),
    })
}

fn progress_from_row(row: &Row<'_>) -> rusqlite::Result<ProgressEntry> {
    Ok(ProgressEntry {
        id: row.get(0)?,
        timestamp: from_micros(row.get(1)?),
        status: row.get(2)?,
        description: row.get(3)?,
        parent_id: row.get(4)?,
    })
}

fn pattern_from_row(row: &Row<'_>) -> rusqlite::Result<SystemPattern> {
    Ok(SystemPattern {
        id: row.get(0)?,
        timestamp: from_micros(row.get(1)?),
        name: row.get(2)?,
        description: row.get(3)?,
        tags: decode_tags(&row.get::<_, String>(4)?),
    })
}

fn custom_datum_from_row(row: &Row<'_>) -> rusqlite::Result<CustomDatum> {
    let raw: String = row.get(4)?;
    let value = serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    let cache_score: Option<i64> = row.get(6)?;
    Ok(CustomDatum {
        id: row.get(0)?,
        timestamp: from_micros(row.get(1)?),
        category: row.get(2)?,
        key: row.get(3)?,
        value,
        cache_hint: row.get(5)?,
        cache_score: cache_score.and_then(|s| u32::try_from(s).ok()),
    })
}

fn item_from_row(item_type: ItemType, row: &Row<'_>) -> rusqlite::Result<KnowledgeItem> {
    Ok(match item_type {
        ItemType::Decision => KnowledgeItem::Decision(decision_from_row(row)?),
        ItemType::ProgressEntry => KnowledgeItem::ProgressEntry(progress_from_row(row)?),
        ItemType::SystemPattern => KnowledgeItem::SystemPattern(pattern_from_row(row)?),
        ItemType::CustomData => KnowledgeItem::CustomData(custom_datum_from_row(row)?),
    })
}

fn load_item(conn: &Connection, item: ItemRef) -> Result<Option<KnowledgeItem>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = ?1",
        columns(item.item_type),
        table_name(item.item_type)
    );
    conn.query_row(&sql, params![item.item_id], |row| {
        item_from_row(item.item_type, row)
    })
    .optional()
    .map_err(sql_err("get_item"))
}

fn query_rows<T>(
    conn: &Connection,
    sql: &str,
    args: Vec<SqlValue>,
    map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql).map_err(sql_err("prepare_list_items"))?;
    let rows = stmt
        .query_map(params_from_iter(args), map)
        .map_err(sql_err("list_items"))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(sql_err("read_item_row"))
}

fn apply_limit<T>(mut items: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit {
        items.truncate(limit);
    }
    items
}

impl SqliteStore {
    /// Inserts a decision.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the write fails.
    #[instrument(skip(self, args), fields(operation = "insert_decision", backend = "sqlite"))]
    pub fn insert_decision(&self, args: &NewDecision, now: DateTime<Utc>) -> Result<Decision> {
        measured(BACKEND, "insert_decision", || {
            let tags = encode_tags(&args.tags)?;
            let conn = self.lock();
            immediate_transaction(&conn, |conn| {
                conn.execute(
                    "INSERT INTO decisions (timestamp, summary, rationale, implementation_details, tags)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        to_micros(now),
                        args.summary,
                        args.rationale,
                        args.implementation_details,
                        tags
                    ],
                )
                .map_err(sql_err("insert_decision"))?;
                let id = conn.last_insert_rowid();
                Self::touch_marker(conn, ItemType::Decision.source_name(), now)?;
                Ok(Decision {
                    id,
                    summary: args.summary.clone(),
                    rationale: args.rationale.clone(),
                    implementation_details: args.implementation_details.clone(),
                    tags: args.tags.clone(),
                    timestamp: now,
                })
            })
        })
    }

    /// Inserts a progress entry and, if requested, its automatic link.
    ///
    /// Both rows commit in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the write fails.
    #[instrument(skip(self, args), fields(operation = "insert_progress", backend = "sqlite"))]
    pub fn insert_progress_with_link(
        &self,
        args: &NewProgress,
        now: DateTime<Utc>,
    ) -> Result<(ProgressEntry, Option<Link>)> {
        measured(BACKEND, "insert_progress", || {
            let conn = self.lock();
            immediate_transaction(&conn, |conn| {
                conn.execute(
                    "INSERT INTO progress_entries (timestamp, status, description, parent_id)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![to_micros(now), args.status, args.description, args.parent_id],
                )
                .map_err(sql_err("insert_progress"))?;
                let entry = ProgressEntry {
                    id: conn.last_insert_rowid(),
                    status: args.status.clone(),
                    description: args.description.clone(),
                    parent_id: args.parent_id,
                    timestamp: now,
                };
                Self::touch_marker(conn, ItemType::ProgressEntry.source_name(), now)?;

                let link = match (&args.linked_item_type, &args.linked_item_id) {
                    (Some(target_type), Some(target_id)) => {
                        let preview: String = entry.description.chars().take(30).collect();
                        let new_link = NewLink::new(
                            (ItemType::ProgressEntry.as_str(), entry.id.to_string()),
                            (target_type.as_str(), target_id.as_str()),
                            args.link_relationship_type.as_str(),
                        )
                        .with_description(format!(
                            "Progress entry '{preview}...' automatically linked."
                        ));
                        Some(insert_link_row(conn, &new_link, now)?)
                    },
                    _ => None,
                };
                Ok((entry, link))
            })
        })
    }

    /// Updates fields of a progress entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id, or
    /// [`Error::OperationFailed`] if the write fails.
    #[instrument(skip(self, update), fields(operation = "update_progress", backend = "sqlite"))]
    pub fn update_progress(
        &self,
        id: i64,
        update: &ProgressUpdate,
        now: DateTime<Utc>,
    ) -> Result<ProgressEntry> {
        measured(BACKEND, "update_progress", || {
            let conn = self.lock();
            immediate_transaction(&conn, |conn| {
                let Some(KnowledgeItem::ProgressEntry(mut entry)) =
                    load_item(conn, ItemRef::new(ItemType::ProgressEntry, id))?
                else {
                    return Err(Error::not_found("progress_entry", id));
                };
                if let Some(status) = &update.status {
                    entry.status = status.trim().to_string();
                }
                if let Some(description) = &update.description {
                    entry.description.clone_from(description);
                }
                if let Some(parent_id) = update.parent_id {
                    entry.parent_id = Some(parent_id);
                }
                entry.timestamp = now;

                conn.execute(
                    "UPDATE progress_entries
                     SET status = ?1, description = ?2, parent_id = ?3, timestamp = ?4
                     WHERE id = ?5",
                    params![
                        entry.status,
                        entry.description,
                        entry.parent_id,
                        to_micros(now),
                        id
                    ],
                )
                .map_err(sql_err("update_progress"))?;
                Self::touch_marker(conn, ItemType::ProgressEntry.source_name(), now)?;
                Ok(entry)
            })
        })
    }

    /// Inserts a system pattern, or replaces the one with the same name
    /// keeping its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the write fails.
    #[instrument(skip(self, args), fields(operation = "upsert_system_pattern", backend = "sqlite"))]
    pub fn upsert_system_pattern(
        &self,
        args: &NewSystemPattern,
        now: DateTime<Utc>,
    ) -> Result<SystemPattern> {
        measured(BACKEND, "upsert_system_pattern", || {
            let tags = encode_tags(&args.tags)?;
            let conn = self.lock();
            immediate_transaction(&conn, |conn| {
                let id: i64 = conn
                    .query_row(
                        "INSERT INTO system_patterns (timestamp, name, description, tags)
                         VALUES (?1, ?2, ?3, ?4)
                         ON CONFLICT(name) DO UPDATE SET
                            timestamp = excluded.timestamp,
                            description = excluded.description,
                            tags = excluded.tags
                         RETURNING id",
                        params![to_micros(now), args.name, args.description, tags],
                        |row| row.get(0),
                    )
                    .map_err(sql_err("upsert_system_pattern"))?;
                Self::touch_marker(conn, ItemType::SystemPattern.source_name(), now)?;
                Ok(SystemPattern {
                    id,
                    name: args.name.clone(),
                    description: args.description.clone(),
                    tags: args.tags.clone(),
                    timestamp: now,
                })
            })
        })
    }

    /// Inserts a custom datum, or replaces the one with the same
    /// `(category, key)` keeping its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the write fails.
    #[instrument(skip(self, args), fields(operation = "upsert_custom_data", backend = "sqlite", category = %args.category))]
    pub fn upsert_custom_data(
        &self,
        args: &NewCustomDatum,
        cache_score: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<CustomDatum> {
        measured(BACKEND, "upsert_custom_data", || {
            let value = serde_json::to_string(&args.value).map_err(sql_err("serialize_value"))?;
            let conn = self.lock();
            immediate_transaction(&conn, |conn| {
                let id: i64 = conn
                    .query_row(
                        "INSERT INTO custom_data (timestamp, category, key, value, cache_hint, cache_score)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                         ON CONFLICT(category, key) DO UPDATE SET
                            timestamp = excluded.timestamp,
                            value = excluded.value,
                            cache_hint = excluded.cache_hint,
                            cache_score = excluded.cache_score
                         RETURNING id",
                        params![
                            to_micros(now),
                            args.category,
                            args.key,
                            value,
                            args.cache_hint,
                            cache_score
                        ],
                        |row| row.get(0),
                    )
                    .map_err(sql_err("upsert_custom_data"))?;
                Self::touch_marker(conn, ItemType::CustomData.source_name(), now)?;
                Ok(CustomDatum {
                    id,
                    category: args.category.clone(),
                    key: args.key.clone(),
                    value: args.value.clone(),
                    cache_hint: args.cache_hint,
                    cache_score,
                    timestamp: now,
                })
            })
        })
    }

    /// Reads one item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the read fails.
    pub fn get_item(&self, item: ItemRef) -> Result<Option<KnowledgeItem>> {
        measured(BACKEND, "get_item", || {
            let conn = self.lock();
            load_item(&conn, item)
        })
    }

    /// Reads several items under one lock, so they form a consistent snapshot.
    ///
    /// Missing items are absent from the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if a read fails.
    pub fn get_items(&self, items: &[ItemRef]) -> Result<HashMap<ItemRef, KnowledgeItem>> {
        measured(BACKEND, "get_items", || {
            let conn = self.lock();
            let mut found = HashMap::with_capacity(items.len());
            for &item in items {
                if let Some(loaded) = load_item(&conn, item)? {
                    found.insert(item, loaded);
                }
            }
            Ok(found)
        })
    }

    /// Lists every item of one type in id order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the read fails.
    pub fn list_all(&self, item_type: ItemType) -> Result<Vec<KnowledgeItem>> {
        measured(BACKEND, "list_all", || {
            let conn = self.lock();
            let sql = format!(
                "SELECT {} FROM {} ORDER BY id ASC",
                columns(item_type),
                table_name(item_type)
            );
            query_rows(&conn, &sql, Vec::new(), |row| item_from_row(item_type, row))
        })
    }

    /// Lists decisions, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the read fails.
    #[instrument(skip(self), fields(operation = "list_decisions", backend = "sqlite"))]
    pub fn list_decisions(&self, filter: &ItemFilter) -> Result<Vec<Decision>> {
        measured(BACKEND, "list_decisions", || {
            let conn = self.lock();
            let mut sql = format!("SELECT {DECISION_COLUMNS} FROM decisions WHERE 1=1");
            let mut args = Vec::new();
            if let Some(since) = filter.since {
                sql.push_str(" AND timestamp >= ?");
                args.push(SqlValue::from(to_micros(since)));
            }
            sql.push_str(" ORDER BY timestamp DESC, id DESC");
            let rows = query_rows(&conn, &sql, args, decision_from_row)?;
            let matching = rows
                .into_iter()
                .filter(|d| filter.matches_tags(&d.tags))
                .collect();
            Ok(apply_limit(matching, filter.limit))
        })
    }

    /// Lists progress entries, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the read fails.
    #[instrument(skip(self), fields(operation = "list_progress", backend = "sqlite"))]
    pub fn list_progress(&self, filter: &ItemFilter) -> Result<Vec<ProgressEntry>> {
        measured(BACKEND, "list_progress", || {
            let conn = self.lock();
            let mut sql = format!("SELECT {PROGRESS_COLUMNS} FROM progress_entries WHERE 1=1");
            let mut args = Vec::new();
            if let Some(status) = &filter.status {
                sql.push_str(" AND status = ?");
                args.push(SqlValue::from(status.clone()));
            }
            if let Some(parent_id) = filter.parent_id {
                sql.push_str(" AND parent_id = ?");
                args.push(SqlValue::from(parent_id));
            }
            if let Some(since) = filter.since {
                sql.push_str(" AND timestamp >= ?");
                args.push(SqlValue::from(to_micros(since)));
            }
            sql.push_str(" ORDER BY timestamp DESC, id DESC");
            let rows = query_rows(&conn, &sql, args, progress_from_row)?;
            Ok(apply_limit(rows, filter.limit))
        })
    }

    /// Lists system patterns by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the read fails.
    #[instrument(skip(self), fields(operation = "list_system_patterns", backend = "sqlite"))]
    pub fn list_system_patterns(&self, filter: &ItemFilter) -> Result<Vec<SystemPattern>> {
        measured(BACKEND, "list_system_patterns", || {
            let conn = self.lock();
            let mut sql = format!("SELECT {PATTERN_COLUMNS} FROM system_patterns WHERE 1=1");
            let mut args = Vec::new();
            if let Some(since) = filter.since {
                sql.push_str(" AND timestamp >= ?");
                args.push(SqlValue::from(to_micros(since)));
            }
            sql.push_str(" ORDER BY name ASC");
            let rows = query_rows(&conn, &sql, args, pattern_from_row)?;
            let matching = rows
                .into_iter()
                .filter(|p| filter.matches_tags(&p.tags))
                .collect();
            Ok(apply_limit(matching, filter.limit))
        })
    }

    /// Lists custom data by category, then key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the read fails.
    #[instrument(skip(self), fields(operation = "list_custom_data", backend = "sqlite"))]
    pub fn list_custom_data(
        &self,
        category: Option<&str>,
        key: Option<&str>,
    ) -> Result<Vec<CustomDatum>> {
        measured(BACKEND, "list_custom_data", || {
            let conn = self.lock();
            let mut sql = format!("SELECT {CUSTOM_DATA_COLUMNS} FROM custom_data WHERE 1=1");
            let mut args = Vec::new();
            if let Some(category) = category {
                sql.push_str(" AND category = ?");
                args.push(SqlValue::from(category.to_string()));
            }
            if let Some(key) = key {
                sql.push_str(" AND key = ?");
                args.push(SqlValue::from(key.to_string()));
            }
            sql.push_str(" ORDER BY category ASC, key ASC");
            query_rows(&conn, &sql, args, custom_datum_from_row)
        })
    }

    /// Deletes an item. Links referencing it are left in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the item does not exist, or
    /// [`Error::OperationFailed`] if the write fails.
    #[instrument(skip(self), fields(operation = "delete_item", backend = "sqlite", item = %item))]
    pub fn delete_item(&self, item: ItemRef, now: DateTime<Utc>) -> Result<()> {
        measured(BACKEND, "delete_item", || {
            let conn = self.lock();
            immediate_transaction(&conn, |conn| {
                let sql = format!("DELETE FROM {} WHERE id = ?1", table_name(item.item_type));
                let deleted = conn
                    .execute(&sql, params![item.item_id])
                    .map_err(sql_err("delete_item"))?;
                if deleted == 0 {
                    return Err(Error::not_found(item.item_type.as_str(), item.item_id));
                }
                Self::touch_marker(conn, item.item_type.source_name(), now)?;
                Ok(())
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::current_timestamp;
    use serde_json::json;

    #[test]
    fn test_pattern_upsert_keeps_id() {
        let store = SqliteStore::in_memory().unwrap();
        let now = current_timestamp();
        let first = store
            .upsert_system_pattern(&NewSystemPattern::new("Repository Pattern"), now)
            .unwrap();
        let second = store
            .upsert_system_pattern(
                &NewSystemPattern::new("Repository Pattern").with_description("data access"),
                now,
            )
            .unwrap();
        assert_eq!(first.id, second.id);
        let patterns = store.list_system_patterns(&ItemFilter::new()).unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].description.as_deref(), Some("data access"));
    }

    #[test]
    fn test_custom_data_roundtrip_and_upsert() {
        let store = SqliteStore::in_memory().unwrap();
        let now = current_timestamp();
        let args = NewCustomDatum::new("Glossary", "KV", json!({"a": [1, 2]})).with_cache_hint(true);
        let first = store.upsert_custom_data(&args, Some(40), now).unwrap();
        let args = NewCustomDatum::new("Glossary", "KV", json!("plain"));
        let second = store.upsert_custom_data(&args, None, now).unwrap();
        assert_eq!(first.id, second.id);

        let loaded = store
            .get_item(ItemRef::new(ItemType::CustomData, first.id))
            .unwrap()
            .unwrap();
        let KnowledgeItem::CustomData(datum) = loaded else {
            panic!("expected custom data");
        };
        assert_eq!(datum.value, json!("plain"));
        assert_eq!(datum.cache_hint, None);
    }

    #[test]
    fn test_progress_auto_link_in_same_write() {
        let store = SqliteStore::in_memory().unwrap();
        let args = NewProgress::new("TODO", "Implement the repository layer for storage")
            .linked_to("decision", "5");
        let (entry, link) = store
            .insert_progress_with_link(&args, current_timestamp())
            .unwrap();
        let link = link.unwrap();
        assert_eq!(link.source_item_id, entry.id.to_string());
        assert_eq!(link.relationship_type, "relates_to_progress");
        assert_eq!(
            link.description.as_deref(),
            Some("Progress entry 'Implement the repository layer...' automatically linked.")
        );
    }

    #[test]
    fn test_delete_missing_item_is_not_found() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store
            .delete_item(ItemRef::new(ItemType::Decision, 9), current_timestamp())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_list_filters() {
        let store = SqliteStore::in_memory().unwrap();
        let now = current_timestamp();
        store
            .insert_decision(&NewDecision::new("a").with_tags(["db"]), now)
            .unwrap();
        store
            .insert_decision(&NewDecision::new("b").with_tags(["ui"]), now)
            .unwrap();
        let dbs = store
            .list_decisions(&ItemFilter::new().with_any_tags(["db"]))
            .unwrap();
        assert_eq!(dbs.len(), 1);
        assert_eq!(dbs[0].summary, "a");

        let newest = store
            .list_decisions(&ItemFilter::new().with_limit(1))
            .unwrap();
        assert_eq!(newest[0].summary, "b");
    }
}
