//! Session initialization types.

use super::{RecentActivity, WorkspaceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Look-back window for the activity snapshot taken at session start.
pub const SESSION_ACTIVITY_HOURS: i64 = 24;

/// Entries per activity type in the session-start snapshot.
pub const SESSION_ACTIVITY_LIMIT: usize = 3;

/// Everything a client needs when it starts a session on a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInit {
    /// Random identifier for the session.
    pub session_id: String,
    /// Workspace the session is bound to.
    pub workspace: WorkspaceId,
    /// Session start time.
    pub started_at: DateTime<Utc>,
    /// True if the stable prefix has any content.
    pub stable_context_ready: bool,
    /// Hash of the stable prefix at session start.
    pub stable_context_hash: String,
    /// Token estimate of the stable prefix.
    pub stable_context_tokens: usize,
    /// Recent activity snapshot.
    pub initial_activity: RecentActivity,
    /// Advice for keeping the prefix cacheable.
    pub recommendations: Vec<String>,
}
