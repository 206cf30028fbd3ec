//! Shared connection handling for `SQLite` backends.
//!
//! Mutex poison recovery, pragma configuration, transactions, metrics and
//! timestamp conversion used by both the primary store and the FTS index.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Acquires a mutex, recovering the inner value if a previous holder panicked.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Configures a connection for concurrent access.
///
/// - **WAL mode** lets readers proceed while a writer commits
/// - **NORMAL synchronous** balances durability with performance
/// - **`busy_timeout`** waits up to 5 seconds on lock contention
///
/// Pragma results are ignored: `journal_mode` returns a row and in-memory
/// databases refuse WAL, neither of which is an error here.
pub fn configure_connection(conn: &Connection) {
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
}

/// Opens a file-backed connection, creating parent directories.
pub fn open_file(path: &Path, operation: &str) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
            operation: format!("{operation}_create_dir"),
            cause: format!("{}: {e}", parent.display()),
        })?;
    }
    let conn = Connection::open(path).map_err(|e| Error::OperationFailed {
        operation: operation.to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;
    configure_connection(&conn);
    Ok(conn)
}

/// Opens an in-memory connection.
pub fn open_memory(operation: &str) -> Result<Connection> {
    let conn = Connection::open_in_memory().map_err(|e| Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    })?;
    configure_connection(&conn);
    Ok(conn)
}

/// Returns a mapper from any displayable error to [`Error::OperationFailed`].
pub fn sql_err<E: std::fmt::Display>(operation: &'static str) -> impl FnOnce(E) -> Error {
    move |e| Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

/// Runs `f` inside `BEGIN IMMEDIATE` / `COMMIT`, rolling back on error.
///
/// `IMMEDIATE` takes the write lock up front, so a read-modify-write inside
/// `f` cannot interleave with another writer.
pub fn immediate_transaction<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    conn.execute("BEGIN IMMEDIATE", [])
        .map_err(sql_err("begin_transaction"))?;

    let result = f(conn);

    if result.is_ok() {
        conn.execute("COMMIT", []).map_err(sql_err("commit_transaction"))?;
    } else {
        let _ = conn.execute("ROLLBACK", []);
    }

    result
}

/// Records the standard storage counters and latency histogram.
pub fn record_operation_metrics(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "storage_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Runs `f`, recording metrics under `operation`.
pub fn measured<T>(
    backend: &'static str,
    operation: &'static str,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    let start = Instant::now();
    let result = f();
    let status = if result.is_ok() { "success" } else { "error" };
    record_operation_metrics(backend, operation, start, status);
    result
}

/// Converts a timestamp to microseconds since the epoch for storage.
pub fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

/// Converts stored microseconds back to a timestamp.
///
/// Out-of-range values decode as the epoch.
pub fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_lock_recovers_from_poison() {
        let mutex = std::sync::Arc::new(Mutex::new(5));
        let clone = std::sync::Arc::clone(&mutex);
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock().unwrap();
            panic!("poison");
        })
        .join();
        assert!(mutex.is_poisoned());
        assert_eq!(*acquire_lock(&mutex), 5);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let conn = open_memory("test").unwrap();
        conn.execute("CREATE TABLE t (v INTEGER)", []).unwrap();

        let result: Result<()> = immediate_transaction(&conn, |c| {
            c.execute("INSERT INTO t (v) VALUES (1)", [])
                .map_err(sql_err("insert"))?;
            Err(Error::InvalidInput("abort".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_micros_roundtrip_preserves_precision() {
        let ts = from_micros(1_700_000_000_123_456);
        assert_eq!(to_micros(ts), 1_700_000_000_123_456);
    }
}
