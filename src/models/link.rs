//! Typed links between item identities.
//!
//! Link endpoints are plain `(item_type, item_id)` strings. Existence of the
//! referenced item is never checked and deleting an item leaves its links in
//! place, so a link may point at something that was never logged.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A directed, typed edge between two item identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Row id.
    pub id: i64,
    /// Type of the source item.
    pub source_item_type: String,
    /// Id or key of the source item.
    pub source_item_id: String,
    /// Type of the target item.
    pub target_item_type: String,
    /// Id or key of the target item.
    pub target_item_id: String,
    /// Nature of the link (for example `implements`).
    pub relationship_type: String,
    /// Optional free-text description.
    pub description: Option<String>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl Link {
    /// Returns the endpoint opposite to `(item_type, item_id)`.
    ///
    /// For a self-link both endpoints are the same identity.
    #[must_use]
    pub fn other_endpoint(&self, item_type: &str, item_id: &str) -> (&str, &str) {
        if self.source_item_type == item_type && self.source_item_id == item_id {
            (&self.target_item_type, &self.target_item_id)
        } else {
            (&self.source_item_type, &self.source_item_id)
        }
    }
}

/// Arguments for creating a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewLink {
    /// Type of the source item.
    pub source_item_type: String,
    /// Id or key of the source item.
    pub source_item_id: String,
    /// Type of the target item.
    pub target_item_type: String,
    /// Id or key of the target item.
    pub target_item_id: String,
    /// Nature of the link.
    pub relationship_type: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
}

impl NewLink {
    /// Creates a link between two identities.
    #[must_use]
    pub fn new(
        source: (impl Into<String>, impl Into<String>),
        target: (impl Into<String>, impl Into<String>),
        relationship_type: impl Into<String>,
    ) -> Self {
        Self {
            source_item_type: source.0.into(),
            source_item_id: source.1.into(),
            target_item_type: target.0.into(),
            target_item_id: target.1.into(),
            relationship_type: relationship_type.into(),
            description: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Validates that every identity part is non-blank.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] naming the first blank field.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("source_item_type", &self.source_item_type),
            ("source_item_id", &self.source_item_id),
            ("target_item_type", &self.target_item_type),
            ("target_item_id", &self.target_item_id),
            ("relationship_type", &self.relationship_type),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidInput(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}

/// Query for links touching one identity, in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkQuery {
    /// Type of the item to find links for.
    pub item_type: String,
    /// Id or key of the item to find links for.
    pub item_id: String,
    /// Only links with this relationship type.
    pub relationship_type: Option<String>,
    /// Only links whose other endpoint has this type.
    pub linked_item_type: Option<String>,
    /// Maximum number of links.
    pub limit: Option<usize>,
}

impl LinkQuery {
    /// Creates an unfiltered query for one identity.
    #[must_use]
    pub fn new(item_type: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            item_type: item_type.into(),
            item_id: item_id.into(),
            relationship_type: None,
            linked_item_type: None,
            limit: None,
        }
    }

    /// Filters by relationship type.
    #[must_use]
    pub fn with_relationship(mut self, relationship_type: impl Into<String>) -> Self {
        self.relationship_type = Some(relationship_type.into());
        self
    }

    /// Filters by the other endpoint's type.
    #[must_use]
    pub fn with_linked_type(mut self, item_type: impl Into<String>) -> Self {
        self.linked_item_type = Some(item_type.into());
        self
    }

    /// Limits the result count.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Validates the query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for blank identity parts or a zero limit.
    pub fn validate(&self) -> Result<()> {
        if self.item_type.trim().is_empty() || self.item_id.trim().is_empty() {
            return Err(Error::InvalidInput(
                "item_type and item_id must not be empty".to_string(),
            ));
        }
        if self.limit == Some(0) {
            return Err(Error::InvalidInput("limit must be positive".to_string()));
        }
        Ok(())
    }
}
