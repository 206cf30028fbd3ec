//! Knowledge items: decisions, progress entries, system patterns, custom data.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Knowledge item variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    /// Architectural or implementation decision.
    Decision,
    /// Task or progress note.
    ProgressEntry,
    /// Named, workspace-unique system pattern.
    SystemPattern,
    /// Free-form value addressed by category and key.
    CustomData,
}

impl ItemType {
    /// Returns all item types.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Decision,
            Self::ProgressEntry,
            Self::SystemPattern,
            Self::CustomData,
        ]
    }

    /// Returns the item type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::ProgressEntry => "progress_entry",
            Self::SystemPattern => "system_pattern",
            Self::CustomData => "custom_data",
        }
    }

    /// Returns the change-marker source name for this item type.
    #[must_use]
    pub const fn source_name(&self) -> &'static str {
        match self {
            Self::Decision => "decisions",
            Self::ProgressEntry => "progress",
            Self::SystemPattern => "system_patterns",
            Self::CustomData => "custom_data",
        }
    }

    /// Parses an item type.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "decision" | "decisions" => Some(Self::Decision),
            "progress_entry" | "progress" => Some(Self::ProgressEntry),
            "system_pattern" | "system_patterns" | "pattern" => Some(Self::SystemPattern),
            "custom_data" | "custom_datum" => Some(Self::CustomData),
            _ => None,
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ItemType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::InvalidInput(format!("unknown item type: {s}")))
    }
}

/// Identity of a stored item: `(item_type, item_id)`.
///
/// The same tuple keys the primary store, the lexical index and the
/// similarity index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemRef {
    /// Variant of the item.
    pub item_type: ItemType,
    /// Row id within the variant.
    pub item_id: i64,
}

impl ItemRef {
    /// Creates a new item reference.
    #[must_use]
    pub const fn new(item_type: ItemType, item_id: i64) -> Self {
        Self { item_type, item_id }
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.item_type, self.item_id)
    }
}

/// A logged decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Row id.
    pub id: i64,
    /// Concise summary.
    pub summary: String,
    /// Reasoning behind the decision.
    pub rationale: Option<String>,
    /// How the decision is implemented.
    pub implementation_details: Option<String>,
    /// Tags for categorization.
    pub tags: Vec<String>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

/// A progress entry (task).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    /// Row id.
    pub id: i64,
    /// Status such as `TODO`, `IN_PROGRESS`, `DONE`.
    pub status: String,
    /// What the task is.
    pub description: String,
    /// Parent task, for subtasks.
    pub parent_id: Option<i64>,
    /// Creation (or last update) time.
    pub timestamp: DateTime<Utc>,
}

/// A system pattern, unique by name within a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemPattern {
    /// Row id.
    pub id: i64,
    /// Unique name.
    pub name: String,
    /// Pattern description.
    pub description: Option<String>,
    /// Tags for categorization.
    pub tags: Vec<String>,
    /// Last write time.
    pub timestamp: DateTime<Utc>,
}

/// A custom datum, unique by `(category, key)` within a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomDatum {
    /// Row id.
    pub id: i64,
    /// Category.
    pub category: String,
    /// Key within the category.
    pub key: String,
    /// Structured value.
    pub value: Value,
    /// Explicit cache hint: `Some(true)` pins the datum into the stable
    /// prefix, `Some(false)` keeps it out.
    pub cache_hint: Option<bool>,
    /// Advisory cache score (0..=100).
    pub cache_score: Option<u32>,
    /// Last write time.
    pub timestamp: DateTime<Utc>,
}

/// Any knowledge item, tagged by variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item_type", rename_all = "snake_case")]
pub enum KnowledgeItem {
    /// A decision.
    Decision(Decision),
    /// A progress entry.
    ProgressEntry(ProgressEntry),
    /// A system pattern.
    SystemPattern(SystemPattern),
    /// A custom datum.
    CustomData(CustomDatum),
}

impl KnowledgeItem {
    /// Returns the variant.
    #[must_use]
    pub const fn item_type(&self) -> ItemType {
        match self {
            Self::Decision(_) => ItemType::Decision,
            Self::ProgressEntry(_) => ItemType::ProgressEntry,
            Self::SystemPattern(_) => ItemType::SystemPattern,
            Self::CustomData(_) => ItemType::CustomData,
        }
    }

    /// Returns the item's identity.
    #[must_use]
    pub const fn item_ref(&self) -> ItemRef {
        let id = match self {
            Self::Decision(d) => d.id,
            Self::ProgressEntry(p) => p.id,
            Self::SystemPattern(s) => s.id,
            Self::CustomData(c) => c.id,
        };
        ItemRef::new(self.item_type(), id)
    }

    /// Returns the item's timestamp.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Decision(d) => d.timestamp,
            Self::ProgressEntry(p) => p.timestamp,
            Self::SystemPattern(s) => s.timestamp,
            Self::CustomData(c) => c.timestamp,
        }
    }

    /// Returns the item's tags (empty for variants without tags).
    #[must_use]
    pub fn tags(&self) -> &[String] {
        match self {
            Self::Decision(d) => &d.tags,
            Self::SystemPattern(s) => &s.tags,
            Self::ProgressEntry(_) | Self::CustomData(_) => &[],
        }
    }

    /// Returns the custom-data category, if any.
    #[must_use]
    pub fn category(&self) -> Option<&str> {
        match self {
            Self::CustomData(c) => Some(&c.category),
            _ => None,
        }
    }

    /// Renders the text projected into the lexical and similarity indexes.
    #[must_use]
    pub fn index_text(&self) -> String {
        match self {
            Self::Decision(d) => {
                let mut text = format!("Decision Summary: {}", d.summary);
                if let Some(rationale) = &d.rationale {
                    text.push_str("\nRationale: ");
                    text.push_str(rationale);
                }
                if let Some(details) = &d.implementation_details {
                    text.push_str("\nImplementation Details: ");
                    text.push_str(details);
                }
                text
            },
            Self::ProgressEntry(p) => format!("Progress: {} - {}", p.status, p.description),
            Self::SystemPattern(s) => {
                let mut text = format!("System Pattern: {}", s.name);
                if let Some(description) = &s.description {
                    text.push_str("\nDescription: ");
                    text.push_str(description);
                }
                text
            },
            Self::CustomData(c) => format!(
                "Category: {}\nKey: {}\nValue: {}",
                c.category,
                c.key,
                render_value(&c.value)
            ),
        }
    }
}

/// Renders a value for text projections: strings verbatim, everything else
/// as compact JSON.
#[must_use]
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Arguments for logging a decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewDecision {
    /// Concise summary (required).
    pub summary: String,
    /// Reasoning.
    #[serde(default)]
    pub rationale: Option<String>,
    /// Implementation details.
    #[serde(default)]
    pub implementation_details: Option<String>,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewDecision {
    /// Creates a decision with only a summary.
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Self::default()
        }
    }

    /// Sets the rationale.
    #[must_use]
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    /// Sets the implementation details.
    #[must_use]
    pub fn with_implementation_details(mut self, details: impl Into<String>) -> Self {
        self.implementation_details = Some(details.into());
        self
    }

    /// Sets the tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Validates and normalizes the arguments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the summary is blank.
    pub fn validated(mut self) -> Result<Self> {
        require_non_blank("summary", &self.summary)?;
        self.tags = normalize_tags(self.tags);
        Ok(self)
    }
}

/// Default relationship for the automatic progress link.
pub const DEFAULT_PROGRESS_RELATIONSHIP: &str = "relates_to_progress";

fn default_progress_relationship() -> String {
    DEFAULT_PROGRESS_RELATIONSHIP.to_string()
}

/// Arguments for logging a progress entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewProgress {
    /// Status (required).
    pub status: String,
    /// Description (required).
    pub description: String,
    /// Parent task id.
    #[serde(default)]
    pub parent_id: Option<i64>,
    /// Type of an item to link this entry to.
    #[serde(default)]
    pub linked_item_type: Option<String>,
    /// Id or key of the item to link this entry to.
    #[serde(default)]
    pub linked_item_id: Option<String>,
    /// Relationship for the automatic link.
    #[serde(default = "default_progress_relationship")]
    pub link_relationship_type: String,
}

impl NewProgress {
    /// Creates a progress entry with status and description.
    #[must_use]
    pub fn new(status: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            description: description.into(),
            parent_id: None,
            linked_item_type: None,
            linked_item_id: None,
            link_relationship_type: default_progress_relationship(),
        }
    }

    /// Sets the parent task.
    #[must_use]
    pub const fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Links the new entry to another item.
    #[must_use]
    pub fn linked_to(mut self, item_type: impl Into<String>, item_id: impl Into<String>) -> Self {
        self.linked_item_type = Some(item_type.into());
        self.linked_item_id = Some(item_id.into());
        self
    }

    /// Validates and normalizes the arguments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for blank fields or a half-specified link.
    pub fn validated(mut self) -> Result<Self> {
        require_non_blank("status", &self.status)?;
        require_non_blank("description", &self.description)?;
        self.status = self.status.trim().to_string();
        match (&self.linked_item_type, &self.linked_item_id) {
            (Some(t), Some(id)) => {
                require_non_blank("linked_item_type", t)?;
                require_non_blank("linked_item_id", id)?;
                require_non_blank("link_relationship_type", &self.link_relationship_type)?;
            },
            (None, None) => {},
            _ => {
                return Err(Error::InvalidInput(
                    "linked_item_type and linked_item_id must be provided together".to_string(),
                ));
            },
        }
        Ok(self)
    }
}

/// Arguments for updating a progress entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgressUpdate {
    /// New status.
    #[serde(default)]
    pub status: Option<String>,
    /// New description.
    #[serde(default)]
    pub description: Option<String>,
    /// New parent task.
    #[serde(default)]
    pub parent_id: Option<i64>,
}

impl ProgressUpdate {
    /// Validates the update.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if nothing is updated or a given field is blank.
    pub fn validate(&self) -> Result<()> {
        if self.status.is_none() && self.description.is_none() && self.parent_id.is_none() {
            return Err(Error::InvalidInput(
                "at least one of status, description, or parent_id must be provided".to_string(),
            ));
        }
        if let Some(status) = &self.status {
            require_non_blank("status", status)?;
        }
        if let Some(description) = &self.description {
            require_non_blank("description", description)?;
        }
        Ok(())
    }
}

/// Arguments for logging (or replacing) a system pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewSystemPattern {
    /// Unique name (required).
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewSystemPattern {
    /// Creates a pattern with a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Validates and normalizes the arguments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the name is blank.
    pub fn validated(mut self) -> Result<Self> {
        require_non_blank("name", &self.name)?;
        self.name = self.name.trim().to_string();
        self.tags = normalize_tags(self.tags);
        Ok(self)
    }
}

/// Arguments for logging (or replacing) a custom datum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewCustomDatum {
    /// Category (required).
    pub category: String,
    /// Key within the category (required).
    pub key: String,
    /// Value.
    pub value: Value,
    /// Explicit cache hint.
    #[serde(default)]
    pub cache_hint: Option<bool>,
}

impl NewCustomDatum {
    /// Creates a custom datum.
    #[must_use]
    pub fn new(category: impl Into<String>, key: impl Into<String>, value: Value) -> Self {
        Self {
            category: category.into(),
            key: key.into(),
            value,
            cache_hint: None,
        }
    }

    /// Sets the cache hint.
    #[must_use]
    pub const fn with_cache_hint(mut self, hint: bool) -> Self {
        self.cache_hint = Some(hint);
        self
    }

    /// Validates the arguments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if category or key is blank.
    pub fn validated(self) -> Result<Self> {
        require_non_blank("category", &self.category)?;
        require_non_blank("key", &self.key)?;
        Ok(self)
    }
}

/// Filters for listing decisions, progress entries and patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    /// Items must carry all of these tags.
    pub tags_all: Vec<String>,
    /// Items must carry at least one of these tags.
    pub tags_any: Vec<String>,
    /// Progress status filter.
    pub status: Option<String>,
    /// Progress parent filter.
    pub parent_id: Option<i64>,
    /// Only items written at or after this time.
    pub since: Option<DateTime<Utc>>,
    /// Maximum number of items.
    pub limit: Option<usize>,
}

impl ItemFilter {
    /// Creates an empty filter (matches all).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tags_all: Vec::new(),
            tags_any: Vec::new(),
            status: None,
            parent_id: None,
            since: None,
            limit: None,
        }
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

    /// Filters by status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Filters by parent task.
    #[must_use]
    pub const fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// Only items written at or after `since`.
    #[must_use]
    pub const fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Limits the result count.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Validates the filter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if both tag filters are set or the limit is zero.
    pub fn validate(&self) -> Result<()> {
        validate_tag_filters(&self.tags_all, &self.tags_any)?;
        if self.limit == Some(0) {
            return Err(Error::InvalidInput("limit must be positive".to_string()));
        }
        Ok(())
    }

    /// Returns true if `tags` satisfy the tag filters.
    #[must_use]
    pub fn matches_tags(&self, tags: &[String]) -> bool {
        tags_match(tags, &self.tags_all, &self.tags_any)
    }
}

/// Rejects combined all/any tag filters.
pub(crate) fn validate_tag_filters(tags_all: &[String], tags_any: &[String]) -> Result<()> {
    if !tags_all.is_empty() && !tags_any.is_empty() {
        return Err(Error::InvalidInput(
            "tags_all and tags_any are mutually exclusive".to_string(),
        ));
    }
    Ok(())
}

/// Applies all/any tag semantics.
pub(crate) fn tags_match(tags: &[String], tags_all: &[String], tags_any: &[String]) -> bool {
    let all = tags_all.iter().all(|t| tags.contains(t));
    let any = tags_any.is_empty() || tags_any.iter().any(|t| tags.contains(t));
    all && any
}

fn require_non_blank(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Trims tags, drops empty ones and removes duplicates, keeping first occurrence order.
fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("decision", Some(ItemType::Decision); "decision")]
    #[test_case("progress_entry", Some(ItemType::ProgressEntry); "progress")]
    #[test_case("SYSTEM_PATTERN", Some(ItemType::SystemPattern); "pattern uppercase")]
    #[test_case("custom_data", Some(ItemType::CustomData); "custom")]
    #[test_case("widget", None; "unknown")]
    fn test_item_type_parse(input: &str, expected: Option<ItemType>) {
        assert_eq!(ItemType::parse(input), expected);
    }

    #[test]
    fn test_decision_requires_summary() {
        assert!(NewDecision::new("  ").validated().is_err());
        let d = NewDecision::new("Use SQLite")
            .with_tags(["db", " db ", "", "storage"])
            .validated()
            .unwrap();
        assert_eq!(d.tags, vec!["db", "storage"]);
    }

    #[test]
    fn test_progress_link_fields_together() {
        let mut p = NewProgress::new("TODO", "write tests");
        p.linked_item_type = Some("decision".to_string());
        assert!(p.validated().is_err());
        assert!(
            NewProgress::new("TODO", "write tests")
                .linked_to("decision", "3")
                .validated()
                .is_ok()
        );
    }

    #[test]
    fn test_progress_update_requires_a_field() {
        assert!(ProgressUpdate::default().validate().is_err());
        let update = ProgressUpdate {
            status: Some("DONE".to_string()),
            ..ProgressUpdate::default()
        };
        assert!(update.validate().is_ok());
    }

    #[test]
    fn test_tag_filters_exclusive() {
        let f = ItemFilter::new().with_all_tags(["a"]).with_any_tags(["b"]);
        assert!(f.validate().is_err());
        assert!(ItemFilter::new().with_limit(0).validate().is_err());
    }

    #[test]
    fn test_tag_matching() {
        let tags = vec!["a".to_string(), "b".to_string()];
        assert!(ItemFilter::new().with_all_tags(["a", "b"]).matches_tags(&tags));
        assert!(!ItemFilter::new().with_all_tags(["a", "c"]).matches_tags(&tags));
        assert!(ItemFilter::new().with_any_tags(["c", "b"]).matches_tags(&tags));
        assert!(!ItemFilter::new().with_any_tags(["c"]).matches_tags(&tags));
        assert!(ItemFilter::new().matches_tags(&[]));
    }

    #[test]
    fn test_index_text_formats() {
        let now = Utc::now();
        let item = KnowledgeItem::Decision(Decision {
            id: 1,
            summary: "Use SQLite".to_string(),
            rationale: Some("embedded".to_string()),
            implementation_details: None,
            tags: vec![],
            timestamp: now,
        });
        assert_eq!(item.index_text(), "Decision Summary: Use SQLite\nRationale: embedded");

        let item = KnowledgeItem::CustomData(CustomDatum {
            id: 2,
            category: "Glossary".to_string(),
            key: "KV".to_string(),
            value: json!({"b": 1, "a": 2}),
            cache_hint: None,
            cache_score: None,
            timestamp: now,
        });
        assert_eq!(
            item.index_text(),
            "Category: Glossary\nKey: KV\nValue: {\"a\":2,\"b\":1}"
        );
        assert_eq!(item.item_ref().to_string(), "custom_data:2");
    }

    #[test]
    fn test_batch_args_reject_unknown_fields() {
        let parsed: std::result::Result<NewDecision, _> =
            serde_json::from_value(json!({"summary": "x", "bogus": 1}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_knowledge_item_tagged_serde() {
        let item = KnowledgeItem::ProgressEntry(ProgressEntry {
            id: 7,
            status: "TODO".to_string(),
            description: "d".to_string(),
            parent_id: None,
            timestamp: Utc::now(),
        });
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["item_type"], "progress_entry");
        assert_eq!(value["id"], 7);
    }
}
