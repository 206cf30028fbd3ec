//! Index synchronization soft-failure tests.
//!
//! A lexical index that can be switched into a failing state stands in for
//! an unavailable index. Primary writes must still succeed, report the
//! pending flag, and be repaired by reconciliation.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use contextkeep::models::{ItemRef, ItemType, NewDecision, NewProgress};
use contextkeep::storage::{BacklogOp, FlatVectorIndex, SqliteLexicalIndex};
use contextkeep::{
    ContextKeepConfig, Error, LexicalIndex, Result, SearchFilter, SearchMode, ServiceContainer,
    SqliteStore, WorkspaceId, WorkspaceStores,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Lexical index that fails writes and removals while `failing` is set.
struct FlakyLexicalIndex {
    inner: SqliteLexicalIndex,
    failing: AtomicBool,
}

impl FlakyLexicalIndex {
    fn new() -> Self {
        Self {
            inner: SqliteLexicalIndex::in_memory().unwrap(),
            failing: AtomicBool::new(true),
        }
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self, operation: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::OperationFailed {
                operation: operation.to_string(),
                cause: "lexical index unavailable".to_string(),
            });
        }
        Ok(())
    }
}

impl LexicalIndex for FlakyLexicalIndex {
    fn index(&self, item: ItemRef, text: &str, tags: &[String]) -> Result<()> {
        self.check("index")?;
        self.inner.index(item, text, tags)
    }

    fn remove(&self, item: ItemRef) -> Result<bool> {
        self.check("remove")?;
        self.inner.remove(item)
    }

    fn search(&self, query: &str, item_types: &[ItemType], limit: usize) -> Result<Vec<(ItemRef, f32)>> {
        self.inner.search(query, item_types, limit)
    }

    fn count(&self) -> Result<usize> {
        self.inner.count()
    }
}

struct Fixture {
    services: ServiceContainer,
    ws: WorkspaceId,
    lexical: Arc<FlakyLexicalIndex>,
    workspace: Arc<contextkeep::services::Workspace>,
}

fn fixture() -> Fixture {
    let config = ContextKeepConfig::in_memory();
    let dimensions = config.embedding_dimensions;
    let services = ServiceContainer::new(config).unwrap();
    let ws = WorkspaceId::new("flaky").unwrap();
    let lexical = Arc::new(FlakyLexicalIndex::new());
    let stores = WorkspaceStores::new(
        SqliteStore::in_memory().unwrap(),
        Arc::clone(&lexical) as Arc<dyn LexicalIndex>,
        Arc::new(FlatVectorIndex::in_memory(dimensions)),
    );
    let workspace = services.registry().register(ws.clone(), stores);
    Fixture {
        services,
        ws,
        lexical,
        workspace,
    }
}

fn lexical_hits(f: &Fixture, query: &str) -> usize {
    f.services
        .search()
        .search(&f.ws, query, SearchMode::Lexical, &SearchFilter::new())
        .unwrap()
        .len()
}

#[test]
fn test_failed_index_write_is_pending_not_error() {
    let f = fixture();
    let outcome = f
        .services
        .graph()
        .log_decision(&f.ws, NewDecision::new("Partition the event store"))
        .unwrap();
    assert!(outcome.index_sync_pending);

    let item_ref = ItemRef::new(ItemType::Decision, outcome.item.id);
    assert!(f.services.graph().get_item(&f.ws, item_ref).is_ok());
    assert_eq!(lexical_hits(&f, "partition"), 0);

    let backlog = f.workspace.stores().primary.backlog().unwrap();
    assert_eq!(backlog.len(), 1);
    assert_eq!(backlog[0].item, item_ref);
    assert_eq!(backlog[0].operation, BacklogOp::Upsert);
}

#[test]
fn test_reconcile_repairs_pending_writes() {
    let f = fixture();
    f.services
        .graph()
        .log_decision(&f.ws, NewDecision::new("Partition the event store"))
        .unwrap();
    f.services
        .graph()
        .log_progress(&f.ws, NewProgress::new("TODO", "Backfill partitions"))
        .unwrap();

    let still_failing = f.services.sync().reconcile(&f.workspace).unwrap();
    assert_eq!(still_failing.repaired, 0);
    assert_eq!(still_failing.still_pending, 2);

    f.lexical.set_failing(false);
    let report = f.services.sync().reconcile(&f.workspace).unwrap();
    assert_eq!(report.repaired, 2);
    assert_eq!(report.still_pending, 0);
    assert!(f.workspace.stores().primary.backlog().unwrap().is_empty());
    assert_eq!(lexical_hits(&f, "partition"), 1);
    assert_eq!(f.workspace.stores().vector.count().unwrap(), 2);
}

#[test]
fn test_failed_cleanup_is_pending_and_hidden_from_search() {
    let f = fixture();
    f.lexical.set_failing(false);
    let decision = f
        .services
        .graph()
        .log_decision(&f.ws, NewDecision::new("Shard by tenant"))
        .unwrap();
    assert!(!decision.index_sync_pending);
    assert_eq!(lexical_hits(&f, "tenant"), 1);

    f.lexical.set_failing(true);
    let outcome = f
        .services
        .graph()
        .delete(&f.ws, ItemRef::new(ItemType::Decision, decision.item.id))
        .unwrap();
    assert!(outcome.index_cleanup_pending);

    // The stale lexical entry is dropped at join-back.
    assert_eq!(f.lexical.count().unwrap(), 1);
    assert_eq!(lexical_hits(&f, "tenant"), 0);

    f.lexical.set_failing(false);
    let report = f.services.sync().reconcile(&f.workspace).unwrap();
    assert_eq!(report.repaired, 1);
    assert_eq!(f.lexical.count().unwrap(), 0);
}
