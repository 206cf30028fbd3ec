//! Stable-context cache types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority tier of a cacheable candidate. Sorts `High` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    /// Always-relevant project context.
    High,
    /// Architectural patterns and pinned data.
    Medium,
    /// Large reference data without an explicit hint.
    Low,
}

impl PriorityTier {
    /// Returns the tier as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Weight used by the aggregate cache score.
    #[must_use]
    pub const fn weight(&self) -> f64 {
        match self {
            Self::High => 3.0,
            Self::Medium => 2.0,
            Self::Low => 1.0,
        }
    }
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical source-kind order inside a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// The product document.
    Document,
    /// System patterns.
    Pattern,
    /// Custom data.
    Data,
}

/// Where a candidate came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CandidateSource {
    /// The product context document.
    ProductContext,
    /// A system pattern.
    SystemPattern {
        /// Pattern row id.
        pattern_id: i64,
        /// Pattern name.
        name: String,
    },
    /// A custom datum.
    CustomData {
        /// Custom datum row id.
        id: i64,
        /// Category.
        category: String,
        /// Key.
        key: String,
    },
}

impl CandidateSource {
    /// Returns the canonical kind used for ordering.
    #[must_use]
    pub const fn kind(&self) -> SourceKind {
        match self {
            Self::ProductContext => SourceKind::Document,
            Self::SystemPattern { .. } => SourceKind::Pattern,
            Self::CustomData { .. } => SourceKind::Data,
        }
    }

    /// Returns the change-marker name used in cache-state reports.
    #[must_use]
    pub const fn source_name(&self) -> &'static str {
        match self {
            Self::ProductContext => "product_context",
            Self::SystemPattern { .. } => "system_patterns",
            Self::CustomData { .. } => "custom_data",
        }
    }
}

/// A piece of content eligible for the stable prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheableCandidate {
    /// Origin of the content.
    pub source: CandidateSource,
    /// Priority tier.
    pub tier: PriorityTier,
    /// Deterministic token estimate of `body`.
    pub estimated_tokens: usize,
    /// Serialized body as it appears in the prefix.
    pub body: String,
    /// Last modification of the source.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Result of `get_cacheable_content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheableContent {
    /// Candidates in prefix order.
    pub candidates: Vec<CacheableCandidate>,
    /// Sum of candidate token estimates.
    pub total_estimated_tokens: usize,
    /// Advisory aggregate cache score (0..=100).
    pub cache_score: f64,
}

/// One delimited section of the stable prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixSection {
    /// Section name (`project_context`, `system_patterns`, ...).
    pub name: String,
    /// Tier shared by every candidate in the section.
    pub tier: PriorityTier,
    /// Source kind shared by every candidate in the section.
    pub source_kind: SourceKind,
    /// Rendered section including its header.
    pub content: String,
    /// Token estimate of `content`.
    pub tokens: usize,
    /// Number of candidates in the section.
    pub item_count: usize,
    /// Latest modification among the section's sources.
    pub last_modified: Option<DateTime<Utc>>,
}

/// Deterministic, hashable prefix assembled from the candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StableContextPrefix {
    /// Full normalized prefix text.
    pub prefix: String,
    /// SHA-256 hex digest of `prefix`.
    pub hash: String,
    /// Sum of section token estimates.
    pub total_tokens: usize,
    /// Sections in prefix order.
    pub sections: Vec<PrefixSection>,
    /// When this exact prefix was first assembled.
    pub generated_at: DateTime<Utc>,
}

/// Whether a cached prefix can be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheRecommendation {
    /// The caller's prefix is current.
    Reuse,
    /// The caller should rebuild its prefix.
    Refresh,
}

/// A source that changed after a previous prefix was generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedSource {
    /// Source name (`product_context`, `system_patterns`, `custom_data`).
    pub source: String,
    /// The source's last modification marker.
    pub last_modified: DateTime<Utc>,
}

/// Comparison of a caller's prefix hash with the current one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheState {
    /// True if the provided hash equals the current hash.
    pub valid: bool,
    /// Hash of the freshly assembled prefix.
    pub current_hash: String,
    /// Hash supplied by the caller.
    pub provided_hash: Option<String>,
    /// Best-effort list of sources modified since the provided hash.
    pub changed_sources: Vec<ChangedSource>,
    /// Reuse or refresh.
    pub recommendation: CacheRecommendation,
    /// Token estimate of the current prefix.
    pub stable_content_tokens: usize,
}

/// One whole section of dynamic context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicSection {
    /// Section name (`active_context`, `recent_decisions`, ...).
    pub name: String,
    /// Rendered content.
    pub content: String,
    /// Token estimate of `content`.
    pub tokens: usize,
}

/// Query-specific context packed under a token budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicContextBundle {
    /// The intent the sections were selected for.
    pub query_intent: String,
    /// Included sections, in inclusion order.
    pub sections: Vec<DynamicSection>,
    /// Tokens consumed; never exceeds `budget`.
    pub tokens_used: usize,
    /// `budget - tokens_used`.
    pub tokens_remaining: usize,
    /// Requested budget.
    pub budget: usize,
}

/// Caching advice returned when logging custom data with cache hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSuggestion {
    /// Whether caching is recommended.
    pub recommended: bool,
    /// Human-readable reason.
    pub reason: String,
    /// Token estimate of the serialized value.
    pub estimated_tokens: usize,
    /// Advisory cache score (0..=100).
    pub cache_score: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering_high_first() {
        let mut tiers = vec![PriorityTier::Low, PriorityTier::High, PriorityTier::Medium];
        tiers.sort();
        assert_eq!(
            tiers,
            vec![PriorityTier::High, PriorityTier::Medium, PriorityTier::Low]
        );
    }

    #[test]
    fn test_source_kind_canonical_order() {
        assert!(SourceKind::Document < SourceKind::Pattern);
        assert!(SourceKind::Pattern < SourceKind::Data);
        assert_eq!(
            CandidateSource::CustomData {
                id: 1,
                category: "c".to_string(),
                key: "k".to_string()
            }
            .source_name(),
            "custom_data"
        );
    }
}
