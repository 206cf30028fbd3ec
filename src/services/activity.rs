//! Recent activity summary.

use super::workspace::WorkspaceRegistry;
use crate::models::{
    ActivityQuery, ContextKind, HistoryQuery, ItemFilter, RecentActivity, WorkspaceId,
};
use crate::{Result, current_timestamp};
use std::sync::Arc;
use tracing::instrument;

/// Summarizes what changed in a workspace over a time window.
pub struct ActivityService {
    registry: Arc<WorkspaceRegistry>,
}

impl ActivityService {
    /// Creates an activity service.
    #[must_use]
    pub const fn new(registry: Arc<WorkspaceRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the most recent items, links and document versions written
    /// inside the query window, up to `limit_per_type` of each.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] for an invalid window, or
    /// [`crate::Error::OperationFailed`] if the store is unavailable.
    #[instrument(skip(self), fields(operation = "recent_activity", workspace = %workspace))]
    pub fn recent_activity(
        &self,
        workspace: &WorkspaceId,
        query: &ActivityQuery,
    ) -> Result<RecentActivity> {
        let until = current_timestamp();
        let since = query.window_start(until)?;
        let limit = query.limit_per_type;
        let ws = self.registry.get(workspace)?;
        let store = &ws.stores().primary;

        let items = ItemFilter::new().with_since(since).with_limit(limit);
        // History's `after` bound is exclusive; step back one microsecond so
        // a version written exactly at the window start is included.
        let versions = HistoryQuery::new()
            .with_after(since - chrono::Duration::microseconds(1))
            .with_limit(limit);

        // Patterns list by name; the summary wants the latest writes.
        let mut system_patterns = store.list_system_patterns(&ItemFilter::new().with_since(since))?;
        system_patterns.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        system_patterns.truncate(limit);

        let activity = RecentActivity {
            since,
            until,
            decisions: store.list_decisions(&items)?,
            progress: store.list_progress(&items)?,
            system_patterns,
            links: store.links_since(since, limit)?,
            product_context_updates: store.history(ContextKind::Product, &versions)?,
            active_context_updates: store.history(ContextKind::Active, &versions)?,
        };
        tracing::debug!(
            decisions = activity.decisions.len(),
            progress = activity.progress.len(),
            system_patterns = activity.system_patterns.len(),
            links = activity.links.len(),
            "Collected recent activity"
        );
        Ok(activity)
    }
}
