//! Versioned singleton context documents.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Document content: string keys mapped to structured values.
///
/// `serde_json::Map` is key-ordered, so two equal mappings always serialize
/// to the same bytes.
pub type DocumentContent = Map<String, Value>;

/// The two singleton documents each workspace owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    /// Long-lived project description (goals, architecture, stack).
    Product,
    /// Session-scoped working state.
    Active,
}

impl ContextKind {
    /// Returns all document kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Product, Self::Active]
    }

    /// Returns the kind as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Product => "product",
            Self::Active => "active",
        }
    }

    /// Returns the change-marker source name for this document.
    #[must_use]
    pub const fn source_name(&self) -> &'static str {
        match self {
            Self::Product => "product_context",
            Self::Active => "active_context",
        }
    }

    /// Parses a kind, accepting both short and `*_context` spellings.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "product" | "product_context" => Some(Self::Product),
            "active" | "active_context" => Some(Self::Active),
            _ => None,
        }
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ContextKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::InvalidInput(format!("unknown context kind: {s}")))
    }
}

/// Current state of a singleton document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDocument {
    /// Which document this is.
    pub kind: ContextKind,
    /// Current content.
    pub content: DocumentContent,
    /// Monotonic version; 0 for a document that was never written.
    pub version: u64,
    /// Time of the last write, if any.
    pub updated_at: Option<DateTime<Utc>>,
}

impl ContextDocument {
    /// Returns the implicit empty document for `kind`.
    #[must_use]
    pub fn empty(kind: ContextKind) -> Self {
        Self {
            kind,
            content: DocumentContent::new(),
            version: 0,
            updated_at: None,
        }
    }
}

/// Immutable snapshot appended on every document write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextVersion {
    /// Document the snapshot belongs to.
    pub kind: ContextKind,
    /// Version produced by the write.
    pub version: u64,
    /// Content after the write.
    pub content: DocumentContent,
    /// When the write committed.
    pub timestamp: DateTime<Utc>,
    /// What produced the write (`replace` or `patch`).
    pub change_source: String,
}

/// A single key-level patch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum PatchOp {
    /// Set the key to this value.
    Set(Value),
    /// Remove the key if present.
    Delete,
}

/// Key-level patch. Keys absent from the patch are left untouched.
pub type DocumentPatch = BTreeMap<String, PatchOp>;

/// A validated document write: either a wholesale replacement or a patch.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextUpdate {
    /// Replace the whole mapping.
    Replace(DocumentContent),
    /// Apply key-level edits to a copy of the current mapping.
    Patch(DocumentPatch),
}

impl ContextUpdate {
    /// Builds an update from the optional `content` / `patch` pair.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] unless exactly one of the two is given.
    pub fn from_parts(
        content: Option<DocumentContent>,
        patch: Option<DocumentPatch>,
    ) -> Result<Self> {
        match (content, patch) {
            (Some(content), None) => Ok(Self::Replace(content)),
            (None, Some(patch)) => Ok(Self::Patch(patch)),
            (Some(_), Some(_)) => Err(Error::InvalidInput(
                "provide either content or patch, not both".to_string(),
            )),
            (None, None) => Err(Error::InvalidInput(
                "either content or patch must be provided".to_string(),
            )),
        }
    }

    /// Builds a replacement from a JSON value, which must be an object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `value` is not a JSON object.
    pub fn replace(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::Replace(map)),
            other => Err(Error::InvalidInput(format!(
                "document content must be an object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Builds a patch from `(key, op)` pairs.
    pub fn patch<K: Into<String>>(ops: impl IntoIterator<Item = (K, PatchOp)>) -> Self {
        Self::Patch(ops.into_iter().map(|(k, op)| (k.into(), op)).collect())
    }

    /// Returns the change source recorded in history.
    #[must_use]
    pub const fn change_source(&self) -> &'static str {
        match self {
            Self::Replace(_) => "replace",
            Self::Patch(_) => "patch",
        }
    }

    /// Computes the new content from the current content.
    #[must_use]
    pub fn apply(&self, current: &DocumentContent) -> DocumentContent {
        match self {
            Self::Replace(content) => content.clone(),
            Self::Patch(patch) => apply_patch(current, patch),
        }
    }
}

/// Applies `patch` to a copy of `current`.
#[must_use]
pub fn apply_patch(current: &DocumentContent, patch: &DocumentPatch) -> DocumentContent {
    let mut next = current.clone();
    for (key, op) in patch {
        match op {
            PatchOp::Set(value) => {
                next.insert(key.clone(), value.clone());
            },
            PatchOp::Delete => {
                next.remove(key);
            },
        }
    }
    next
}

/// Filters for [`crate::services::ContextService::history`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    /// Maximum number of entries (most recent first).
    pub limit: Option<usize>,
    /// Only entries strictly before this time.
    pub before: Option<DateTime<Utc>>,
    /// Only entries strictly after this time.
    pub after: Option<DateTime<Utc>>,
    /// Select exactly this version.
    pub version: Option<u64>,
}

impl HistoryQuery {
    /// Creates an unfiltered query.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            limit: None,
            before: None,
            after: None,
            version: None,
        }
    }

    /// Sets the limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the upper time bound.
    #[must_use]
    pub const fn with_before(mut self, before: DateTime<Utc>) -> Self {
        self.before = Some(before);
        self
    }

    /// Sets the lower time bound.
    #[must_use]
    pub const fn with_after(mut self, after: DateTime<Utc>) -> Self {
        self.after = Some(after);
        self
    }

    /// Selects a single version.
    #[must_use]
    pub const fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Validates the query.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a zero limit or version, or an
    /// empty time window.
    pub fn validate(&self) -> Result<()> {
        if self.limit == Some(0) {
            return Err(Error::InvalidInput("limit must be positive".to_string()));
        }
        if self.version == Some(0) {
            return Err(Error::InvalidInput("version must be positive".to_string()));
        }
        if let (Some(before), Some(after)) = (self.before, self.after) {
            if before <= after {
                return Err(Error::InvalidInput(
                    "before must be later than after".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Returns the JSON type name used in validation messages.
pub(crate) const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn content(value: Value) -> DocumentContent {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test content must be an object"),
        }
    }

    #[test]
    fn test_from_parts_requires_exactly_one() {
        assert!(ContextUpdate::from_parts(None, None).is_err());
        assert!(
            ContextUpdate::from_parts(Some(DocumentContent::new()), Some(DocumentPatch::new()))
                .is_err()
        );
        assert!(ContextUpdate::from_parts(Some(DocumentContent::new()), None).is_ok());
        assert!(ContextUpdate::from_parts(None, Some(DocumentPatch::new())).is_ok());
    }

    #[test]
    fn test_replace_rejects_non_objects() {
        assert!(ContextUpdate::replace(json!([1, 2])).is_err());
        assert!(ContextUpdate::replace(json!("x")).is_err());
        assert!(ContextUpdate::replace(json!({"a": 1})).is_ok());
    }

    #[test]
    fn test_patch_sets_and_deletes() {
        let current = content(json!({"goal": "x", "keep": 1}));
        let update = ContextUpdate::patch([
            ("feature", PatchOp::Set(json!("y"))),
            ("goal", PatchOp::Delete),
            ("missing", PatchOp::Delete),
        ]);
        let next = update.apply(&current);
        assert_eq!(Value::Object(next), json!({"feature": "y", "keep": 1}));
    }

    #[test]
    fn test_delete_is_distinct_from_sentinel_string() {
        let current = content(json!({"goal": "x"}));
        let update = ContextUpdate::patch([("goal", PatchOp::Set(json!("__DELETE__")))]);
        let next = update.apply(&current);
        assert_eq!(next.get("goal"), Some(&json!("__DELETE__")));
    }

    #[test]
    fn test_patch_op_serde_shape() {
        let set: PatchOp = serde_json::from_value(json!({"op": "set", "value": 3})).unwrap();
        assert_eq!(set, PatchOp::Set(json!(3)));
        let delete: PatchOp = serde_json::from_value(json!({"op": "delete"})).unwrap();
        assert_eq!(delete, PatchOp::Delete);
    }

    #[test]
    fn test_history_query_validation() {
        assert!(HistoryQuery::new().validate().is_ok());
        assert!(HistoryQuery::new().with_limit(0).validate().is_err());
        assert!(HistoryQuery::new().with_version(0).validate().is_err());
        let now = Utc::now();
        assert!(
            HistoryQuery::new()
                .with_before(now)
                .with_after(now)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(ContextKind::parse("product_context"), Some(ContextKind::Product));
        assert_eq!(ContextKind::parse("Active"), Some(ContextKind::Active));
        assert_eq!(ContextKind::parse("other"), None);
    }
}
