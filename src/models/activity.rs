//! Recent activity summary types.

use super::{ContextVersion, Decision, Link, ProgressEntry, SystemPattern};
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default look-back window in hours.
pub const DEFAULT_ACTIVITY_HOURS: i64 = 24;

/// Default number of entries per activity type.
pub const DEFAULT_ACTIVITY_LIMIT: usize = 5;

/// Window and limits for a recent activity summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityQuery {
    /// Look back this many hours.
    pub hours_ago: Option<i64>,
    /// Look back to this instant.
    pub since: Option<DateTime<Utc>>,
    /// Maximum entries per activity type.
    pub limit_per_type: usize,
}

impl Default for ActivityQuery {
    fn default() -> Self {
        Self {
            hours_ago: None,
            since: None,
            limit_per_type: DEFAULT_ACTIVITY_LIMIT,
        }
    }
}

impl ActivityQuery {
    /// Creates a query for the default 24h window.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks back `hours` hours.
    #[must_use]
    pub const fn with_hours(mut self, hours: i64) -> Self {
        self.hours_ago = Some(hours);
        self
    }

    /// Looks back to `since`.
    #[must_use]
    pub const fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Sets the per-type limit.
    #[must_use]
    pub const fn with_limit_per_type(mut self, limit: usize) -> Self {
        self.limit_per_type = limit;
        self
    }

    /// Resolves the window start relative to `now`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if both bounds are given, hours is not
    /// positive, or the per-type limit is zero.
    pub fn window_start(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        if self.limit_per_type == 0 {
            return Err(Error::InvalidInput(
                "limit_per_type must be positive".to_string(),
            ));
        }
        match (self.hours_ago, self.since) {
            (Some(_), Some(_)) => Err(Error::InvalidInput(
                "hours_ago and since are mutually exclusive".to_string(),
            )),
            (Some(hours), None) if hours <= 0 => Err(Error::InvalidInput(
                "hours_ago must be positive".to_string(),
            )),
            (Some(hours), None) => Ok(now - Duration::hours(hours)),
            (None, Some(since)) => Ok(since),
            (None, None) => Ok(now - Duration::hours(DEFAULT_ACTIVITY_HOURS)),
        }
    }
}

/// Recent activity across a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentActivity {
    /// Window start.
    pub since: DateTime<Utc>,
    /// Window end (time of the query).
    pub until: DateTime<Utc>,
    /// Most recent decisions in the window.
    pub decisions: Vec<Decision>,
    /// Most recent progress entries in the window.
    pub progress: Vec<ProgressEntry>,
    /// Most recently written system patterns in the window.
    pub system_patterns: Vec<SystemPattern>,
    /// Most recent links in the window.
    pub links: Vec<Link>,
    /// Product context versions written in the window.
    pub product_context_updates: Vec<ContextVersion>,
    /// Active context versions written in the window.
    pub active_context_updates: Vec<ContextVersion>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_defaults_to_a_day() {
        let now = Utc::now();
        let start = ActivityQuery::new().window_start(now).unwrap();
        assert_eq!(now - start, Duration::hours(24));
    }

    #[test]
    fn test_window_rejects_conflicts() {
        let now = Utc::now();
        assert!(
            ActivityQuery::new()
                .with_hours(2)
                .with_since(now)
                .window_start(now)
                .is_err()
        );
        assert!(ActivityQuery::new().with_hours(0).window_start(now).is_err());
        assert!(
            ActivityQuery::new()
                .with_limit_per_type(0)
                .window_start(now)
                .is_err()
        );
    }
}
