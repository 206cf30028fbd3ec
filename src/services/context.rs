//! Versioned context document service.

use super::workspace::WorkspaceRegistry;
use crate::models::{
    ContextDocument, ContextKind, ContextUpdate, ContextVersion, HistoryQuery, WorkspaceId,
};
use crate::{Result, current_timestamp};
use std::sync::Arc;
use tracing::instrument;

/// Reads, updates and lists the history of the product and active
/// context documents.
pub struct ContextService {
    registry: Arc<WorkspaceRegistry>,
}

impl ContextService {
    /// Creates a context service.
    #[must_use]
    pub const fn new(registry: Arc<WorkspaceRegistry>) -> Self {
        Self { registry }
    }

    /// Reads a document; a document that was never written is empty with
    /// version 0.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OperationFailed`] if the store is unavailable.
    #[instrument(skip(self), fields(operation = "read_context", workspace = %workspace))]
    pub fn read(&self, workspace: &WorkspaceId, kind: ContextKind) -> Result<ContextDocument> {
        self.registry.get(workspace)?.stores().primary.read_document(kind)
    }

    /// Replaces or patches a document, bumping its version by one and
    /// appending a history snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OperationFailed`] if the write fails; the
    /// document is left unchanged.
    #[instrument(skip(self, update), fields(operation = "update_context", workspace = %workspace, change_source = update.change_source()))]
    pub fn update(
        &self,
        workspace: &WorkspaceId,
        kind: ContextKind,
        update: ContextUpdate,
    ) -> Result<ContextDocument> {
        let doc = self
            .registry
            .get(workspace)?
            .stores()
            .primary
            .update_document(kind, &update, current_timestamp())?;
        tracing::debug!(kind = %kind, version = doc.version, "Context document updated");
        Ok(doc)
    }

    /// Returns history snapshots, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] for an invalid query,
    /// [`crate::Error::NotFound`] if a requested version does not exist, or
    /// [`crate::Error::OperationFailed`] if the read fails.
    #[instrument(skip(self), fields(operation = "context_history", workspace = %workspace))]
    pub fn history(
        &self,
        workspace: &WorkspaceId,
        kind: ContextKind,
        query: &HistoryQuery,
    ) -> Result<Vec<ContextVersion>> {
        query.validate()?;
        self.registry.get(workspace)?.stores().primary.history(kind, query)
    }
}
