//! Search types and filters.

use super::item::{tags_match, validate_tag_filters};
use super::{ItemType, KnowledgeItem};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default number of search results.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Largest accepted search limit.
pub const MAX_SEARCH_LIMIT: usize = 100;

/// Search mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// FTS5 token relevance only.
    Lexical,
    /// Vector similarity only.
    Semantic,
    /// Weighted min-max fusion of both (default).
    #[default]
    Hybrid,
}

impl SearchMode {
    /// Returns the mode as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Semantic => "semantic",
            Self::Hybrid => "hybrid",
        }
    }

    /// Parses a mode, accepting the `text` / `vector` aliases.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "lexical" | "text" | "keyword" => Some(Self::Lexical),
            "semantic" | "vector" => Some(Self::Semantic),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::InvalidInput(format!("unknown search mode: {s}")))
    }
}

/// Filter criteria for search.
///
/// `item_types` is pushed down into the indexes; tag and category filters
/// are applied to ranked results before truncation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    /// Restrict to these item types (empty = all).
    pub item_types: Vec<ItemType>,
    /// Results must carry all of these tags.
    pub tags_all: Vec<String>,
    /// Results must carry at least one of these tags.
    pub tags_any: Vec<String>,
    /// Restrict to custom data in these categories.
    pub categories: Vec<String>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

impl SearchFilter {
    /// Creates an empty filter (matches all).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            item_types: Vec::new(),
            tags_all: Vec::new(),
            tags_any: Vec::new(),
            categories: Vec::new(),
            limit: None,
        }
    }

    /// Adds an item type filter.
    #[must_use]
    pub fn with_item_type(mut self, item_type: ItemType) -> Self {
        self.item_types.push(item_type);
        self
    }

    /// Requires all of `tags`.
    #[must_use]
    pub fn with_all_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags_all = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Requires any of `tags`.
    #[must_use]
    pub fn with_any_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags_any = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a custom-data category filter.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns the effective limit.
    #[must_use]
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_SEARCH_LIMIT)
    }

    /// Validates the filter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for combined tag filters, a limit
    /// outside `1..=MAX_SEARCH_LIMIT`, or a category filter with item types
    /// that exclude custom data.
    pub fn validate(&self) -> Result<()> {
        validate_tag_filters(&self.tags_all, &self.tags_any)?;
        if let Some(limit) = self.limit {
            if limit == 0 || limit > MAX_SEARCH_LIMIT {
                return Err(Error::InvalidInput(format!(
                    "limit must be between 1 and {MAX_SEARCH_LIMIT}"
                )));
            }
        }
        if !self.categories.is_empty()
            && !self.item_types.is_empty()
            && !self.item_types.contains(&ItemType::CustomData)
        {
            return Err(Error::InvalidInput(
                "category filter requires custom_data in item_types".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns true if `item_type` passes the type filter.
    #[must_use]
    pub fn accepts_type(&self, item_type: ItemType) -> bool {
        self.item_types.is_empty() || self.item_types.contains(&item_type)
    }

    /// Returns true if `item` passes every filter.
    #[must_use]
    pub fn matches(&self, item: &KnowledgeItem) -> bool {
        if !self.accepts_type(item.item_type()) {
            return false;
        }
        if !tags_match(item.tags(), &self.tags_all, &self.tags_any) {
            return false;
        }
        if self.categories.is_empty() {
            return true;
        }
        item.category()
            .is_some_and(|c| self.categories.iter().any(|wanted| wanted == c))
    }
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// The matched item, re-read from the primary store.
    pub item: KnowledgeItem,
    /// Final score used for ranking.
    pub score: f32,
    /// Raw lexical score, if the lexical index matched.
    pub lexical_score: Option<f32>,
    /// Raw similarity score, if the vector index matched.
    pub semantic_score: Option<f32>,
}
