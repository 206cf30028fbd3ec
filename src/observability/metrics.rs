//! Metric names and helpers for index soft failures.
//!
//! Storage operation counters and latency histograms are recorded next to
//! the `SQLite` code; this module covers the synchronizer. No exporter is
//! installed here, so the calls are no-ops until the embedding application
//! installs a `metrics` recorder.

/// Counter of index writes that failed after their primary commit.
pub const INDEX_SYNC_PENDING_TOTAL: &str = "index_sync_pending_total";

/// Counter of index removals that failed after their primary delete.
pub const INDEX_CLEANUP_PENDING_TOTAL: &str = "index_cleanup_pending_total";

/// Counter of backlog entries repaired by reconciliation.
pub const INDEX_RECONCILED_TOTAL: &str = "index_reconciled_total";

/// Records a failed index write for `index` (`lexical` or `vector`).
pub fn record_sync_pending(item_type: &'static str, index: &'static str) {
    metrics::counter!(INDEX_SYNC_PENDING_TOTAL, "item_type" => item_type, "index" => index)
        .increment(1);
}

/// Records a failed index removal for `index` (`lexical` or `vector`).
pub fn record_cleanup_pending(item_type: &'static str, index: &'static str) {
    metrics::counter!(INDEX_CLEANUP_PENDING_TOTAL, "item_type" => item_type, "index" => index)
        .increment(1);
}

/// Records repaired backlog entries.
pub fn record_reconciled(count: usize) {
    metrics::counter!(INDEX_RECONCILED_TOTAL).increment(count as u64);
}
