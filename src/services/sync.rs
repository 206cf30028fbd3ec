//! Index synchronization.
//!
//! Keeps the lexical and similarity indexes in step with the primary store.
//! Index work always runs after the primary write has committed, under the
//! workspace's sync guard taken before that write. A failure there is not an
//! error: it is logged, counted, recorded in the primary store's backlog and
//! reported back as a pending flag.

use super::workspace::Workspace;
use crate::embedding::Embedder;
use crate::models::{ItemRef, KnowledgeItem, ReconcileReport};
use crate::observability::{record_cleanup_pending, record_reconciled, record_sync_pending};
use crate::storage::{BacklogOp, WorkspaceStores};
use crate::{Result, current_timestamp};
use std::sync::Arc;
use tracing::instrument;

/// Index label used in metrics for the lexical index.
const LEXICAL: &str = "lexical";
/// Index label used in metrics for the similarity index.
const VECTOR: &str = "vector";

/// Projects committed items into both indexes.
pub struct IndexSynchronizer {
    embedder: Arc<dyn Embedder>,
}

impl IndexSynchronizer {
    /// Creates a synchronizer using `embedder` for similarity vectors.
    #[must_use]
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// Returns the embedder used for item and query vectors.
    #[must_use]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Writes `item` into both indexes.
    ///
    /// Returns `true` if either index write failed and the item is now
    /// pending reconciliation.
    #[instrument(skip(self, workspace, item), fields(operation = "index_item", workspace = %workspace.id(), item = %item.item_ref()))]
    pub fn index_item(&self, workspace: &Workspace, item: &KnowledgeItem) -> bool {
        let item_ref = item.item_ref();
        match self.try_index(workspace.stores(), item) {
            Ok(()) => false,
            Err((index, e)) => {
                tracing::warn!(error = %e, index, "Index write failed after commit; marking pending");
                record_sync_pending(item_ref.item_type.as_str(), index);
                record_pending(workspace, item_ref, BacklogOp::Upsert, &e.to_string());
                true
            },
        }
    }

    /// Removes `item_ref` from both indexes.
    ///
    /// Returns `true` if cleanup failed and is pending reconciliation.
    #[instrument(skip(self, workspace), fields(operation = "remove_item", workspace = %workspace.id(), item = %item_ref))]
    pub fn remove_item(&self, workspace: &Workspace, item_ref: ItemRef) -> bool {
        match try_remove(workspace.stores(), item_ref) {
            Ok(()) => false,
            Err((index, e)) => {
                tracing::warn!(error = %e, index, "Index cleanup failed after delete; marking pending");
                record_cleanup_pending(item_ref.item_type.as_str(), index);
                record_pending(workspace, item_ref, BacklogOp::Remove, &e.to_string());
                true
            },
        }
    }

    /// Replays the workspace's index backlog.
    ///
    /// Pending upserts re-read the item from the primary store; an item that
    /// has since been deleted is removed from the indexes instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the backlog or an item cannot be read from the
    /// primary store.
    #[instrument(skip(self, workspace), fields(operation = "reconcile", workspace = %workspace.id()))]
    pub fn reconcile(&self, workspace: &Workspace) -> Result<ReconcileReport> {
        let _sync = workspace.sync_guard();
        let stores = workspace.stores();
        let mut report = ReconcileReport::default();

        for entry in stores.primary.backlog()? {
            let outcome = match entry.operation {
                BacklogOp::Upsert => match stores.primary.get_item(entry.item)? {
                    Some(item) => self.try_index(stores, &item),
                    None => try_remove(stores, entry.item),
                },
                BacklogOp::Remove => try_remove(stores, entry.item),
            };

            match outcome {
                Ok(()) => {
                    stores.primary.clear_backlog(entry.item)?;
                    report.repaired += 1;
                },
                Err((index, e)) => {
                    tracing::debug!(item = %entry.item, index, error = %e, "Backlog entry still failing");
                    stores.primary.record_backlog(
                        entry.item,
                        entry.operation,
                        &e.to_string(),
                        current_timestamp(),
                    )?;
                    report.still_pending += 1;
                },
            }
        }

        record_reconciled(report.repaired);
        tracing::debug!(repaired = report.repaired, still_pending = report.still_pending, "Reconciled index backlog");
        Ok(report)
    }

    fn try_index(
        &self,
        stores: &WorkspaceStores,
        item: &KnowledgeItem,
    ) -> std::result::Result<(), (&'static str, crate::Error)> {
        let item_ref = item.item_ref();
        let text = item.index_text();
        stores
            .lexical
            .index(item_ref, &text, item.tags())
            .map_err(|e| (LEXICAL, e))?;
        let vector = self.embedder.embed(&text).map_err(|e| (VECTOR, e))?;
        stores.vector.upsert(item_ref, &vector).map_err(|e| (VECTOR, e))
    }
}

fn try_remove(
    stores: &WorkspaceStores,
    item_ref: ItemRef,
) -> std::result::Result<(), (&'static str, crate::Error)> {
    stores.lexical.remove(item_ref).map_err(|e| (LEXICAL, e))?;
    stores.vector.remove(item_ref).map_err(|e| (VECTOR, e))?;
    Ok(())
}

/// Records a backlog row; a failure here is only logged since the caller's
/// write has already committed.
fn record_pending(workspace: &Workspace, item_ref: ItemRef, operation: BacklogOp, error: &str) {
    if let Err(e) = workspace
        .stores()
        .primary
        .record_backlog(item_ref, operation, error, current_timestamp())
    {
        tracing::warn!(error = %e, item = %item_ref, "Failed to record index backlog entry");
    }
}

impl std::fmt::Debug for IndexSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSynchronizer")
            .field("dimensions", &self.embedder.dimensions())
            .finish()
    }
}
