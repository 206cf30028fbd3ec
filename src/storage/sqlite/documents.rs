//! Versioned singleton documents and their append-only history.

use super::{BACKEND, SqliteStore, from_micros, immediate_transaction, measured, sql_err, to_micros};
use crate::models::{
    ContextDocument, ContextKind, ContextUpdate, ContextVersion, DocumentContent, HistoryQuery,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::instrument;

impl SqliteStore {
    /// Reads a document, returning the implicit empty document (version 0)
    /// if it was never written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the read fails.
    #[instrument(skip(self), fields(operation = "read_document", backend = "sqlite"))]
    pub fn read_document(&self, kind: ContextKind) -> Result<ContextDocument> {
        measured(BACKEND, "read_document", || {
            let conn = self.lock();
            load_document(&conn, kind)
        })
    }

    /// Applies `update` to the document and appends a history snapshot.
    ///
    /// The read-modify-write runs inside one `IMMEDIATE` transaction while
    /// the connection lock is held, so concurrent patches to the same
    /// document never lose updates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the write fails; nothing is
    /// persisted in that case.
    #[instrument(skip(self, update), fields(operation = "update_document", backend = "sqlite", change_source = update.change_source()))]
    pub fn update_document(
        &self,
        kind: ContextKind,
        update: &ContextUpdate,
        now: DateTime<Utc>,
    ) -> Result<ContextDocument> {
        measured(BACKEND, "update_document", || {
            let conn = self.lock();
            immediate_transaction(&conn, |conn| {
                let current = load_document(conn, kind)?;
                let content = update.apply(&current.content);
                let version = current.version + 1;
                let encoded = encode_content(&content)?;
                let version_i64 = i64::try_from(version).map_err(sql_err("document_version"))?;

                conn.execute(
                    "INSERT INTO context_documents (kind, content, version, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(kind) DO UPDATE SET
                        content = excluded.content,
                        version = excluded.version,
                        updated_at = excluded.updated_at",
                    params![kind.as_str(), encoded, version_i64, to_micros(now)],
                )
                .map_err(sql_err("write_document"))?;

                conn.execute(
                    "INSERT INTO context_history (kind, version, content, timestamp, change_source)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        kind.as_str(),
                        version_i64,
                        encoded,
                        to_micros(now),
                        update.change_source()
                    ],
                )
                .map_err(sql_err("append_history"))?;

                Self::touch_marker(conn, kind.source_name(), now)?;

                Ok(ContextDocument {
                    kind,
                    content,
                    version,
                    updated_at: Some(now),
                })
            })
        })
    }

    /// Returns history snapshots, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `query.version` matches nothing, or
    /// [`Error::OperationFailed`] if the read fails.
    #[instrument(skip(self), fields(operation = "document_history", backend = "sqlite"))]
    pub fn history(&self, kind: ContextKind, query: &HistoryQuery) -> Result<Vec<ContextVersion>> {
        measured(BACKEND, "document_history", || {
            let conn = self.lock();

            let mut sql = String::from(
                "SELECT version, content, timestamp, change_source
                 FROM context_history WHERE kind = ?",
            );
            let mut args: Vec<rusqlite::types::Value> = vec![kind.as_str().to_string().into()];

            if let Some(version) = query.version {
                sql.push_str(" AND version = ?");
                let version = i64::try_from(version).map_err(sql_err("history_version"))?;
                args.push(version.into());
            }
            if let Some(before) = query.before {
                sql.push_str(" AND timestamp < ?");
                args.push(to_micros(before).into());
            }
            if let Some(after) = query.after {
                sql.push_str(" AND timestamp > ?");
                args.push(to_micros(after).into());
            }
            sql.push_str(" ORDER BY version DESC");
            if let Some(limit) = query.limit {
                sql.push_str(" LIMIT ?");
                let limit = i64::try_from(limit).unwrap_or(i64::MAX);
                args.push(limit.into());
            }

            let mut stmt = conn.prepare(&sql).map_err(sql_err("prepare_history"))?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(args), |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })
                .map_err(sql_err("query_history"))?;

            let mut versions = Vec::new();
            for row in rows {
                let (version, content, timestamp, change_source) =
                    row.map_err(sql_err("read_history_row"))?;
                versions.push(ContextVersion {
                    kind,
                    version: u64::try_from(version).unwrap_or_default(),
                    content: decode_content(&content)?,
                    timestamp: from_micros(timestamp),
                    change_source,
                });
            }

            if versions.is_empty() {
                if let Some(version) = query.version {
                    return Err(Error::not_found(
                        "context_version",
                        format!("{kind}@{version}"),
                    ));
                }
            }
            Ok(versions)
        })
    }
}

fn load_document(conn: &Connection, kind: ContextKind) -> Result<ContextDocument> {
    let row = conn
        .query_row(
            "SELECT content, version, updated_at FROM context_documents WHERE kind = ?1",
            params![kind.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )
        .optional()
        .map_err(sql_err("read_document"))?;

    match row {
        Some((content, version, updated_at)) => Ok(ContextDocument {
            kind,
            content: decode_content(&content)?,
            version: u64::try_from(version).unwrap_or_default(),
            updated_at: Some(from_micros(updated_at)),
        }),
        None => Ok(ContextDocument::empty(kind)),
    }
}

fn encode_content(content: &DocumentContent) -> Result<String> {
    serde_json::to_string(content).map_err(sql_err("serialize_document"))
}

fn decode_content(raw: &str) -> Result<DocumentContent> {
    serde_json::from_str(raw).map_err(sql_err("deserialize_document"))
}
