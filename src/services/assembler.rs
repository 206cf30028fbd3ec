//! Stable context prefix assembly and dynamic context packing.
//!
//! The stable prefix is the high-priority context that rarely changes:
//! the product document, a few system patterns, and pinned or large custom
//! data. It is serialized in a fixed order so identical data always yields
//! byte-identical output and the same hash.
//!
//! ```text
//! === PROJECT CONTEXT ===          high    product document
//! === SYSTEM PATTERNS ===          medium  patterns, name ascending
//! === CRITICAL SPECIFICATIONS ===  medium  custom data with cache_hint = true
//! === REFERENCE DATA ===           low     large custom data without a hint
//! ```

use super::activity::ActivityService;
use super::tokens::{aggregate_cache_score, content_size, estimate_tokens};
use super::workspace::{Workspace, WorkspaceRegistry};
use crate::config::AssemblerSettings;
use crate::models::{
    CacheRecommendation, CacheState, CacheableCandidate, CacheableContent, CandidateSource,
    ActivityQuery, ChangedSource, ContextKind, Decision, DynamicContextBundle, DynamicSection,
    ItemFilter, PrefixSection, PriorityTier, SESSION_ACTIVITY_HOURS, SESSION_ACTIVITY_LIMIT,
    SessionInit, SourceKind, StableContextPrefix, WorkspaceId, render_value,
};
use crate::{Error, Result, current_timestamp};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Sources whose change markers are reported by [`AssemblerService::get_cache_state`].
const PREFIX_SOURCES: [&str; 3] = ["product_context", "system_patterns", "custom_data"];

/// Attempts at reading the candidates without an intervening write.
const SNAPSHOT_ATTEMPTS: usize = 3;

const DECISION_TERMS: [&str; 7] = [
    "decision",
    "decide",
    "choice",
    "architecture",
    "design",
    "pattern",
    "approach",
];

const PROGRESS_TERMS: [&str; 8] = [
    "task", "progress", "todo", "work", "status", "current", "doing", "working",
];

const TECH_TERMS: [&str; 12] = [
    "react",
    "query",
    "redis",
    "database",
    "api",
    "performance",
    "optimization",
    "cache",
    "caching",
    "review",
    "best",
    "practices",
];

const SESSION_RECOMMENDATIONS: [&str; 3] = [
    "Use consistent prompt structure for optimal caching",
    "Stable context will be cached after first query",
    "Update stable context only when core project info changes",
];

const RECENT_DECISIONS_LIMIT: usize = 5;
const CURRENT_PROGRESS_LIMIT: usize = 5;
const TECH_DECISIONS_LIMIT: usize = 3;
const FALLBACK_DECISIONS_LIMIT: usize = 3;

/// Assembles cacheable prefixes and query-specific context.
pub struct AssemblerService {
    registry: Arc<WorkspaceRegistry>,
    settings: AssemblerSettings,
}

impl AssemblerService {
    /// Creates an assembler.
    #[must_use]
    pub const fn new(registry: Arc<WorkspaceRegistry>, settings: AssemblerSettings) -> Self {
        Self { registry, settings }
    }

    /// Lists the prefix candidates in prefix order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the store is unavailable.
    #[instrument(skip(self), fields(operation = "get_cacheable_content", workspace = %workspace))]
    pub fn get_cacheable_content(&self, workspace: &WorkspaceId) -> Result<CacheableContent> {
        let ws = self.registry.get(workspace)?;
        let candidates = self.snapshot_candidates(&ws)?;
        let total_estimated_tokens = candidates.iter().map(|c| c.estimated_tokens).sum();
        let cache_score = aggregate_cache_score(&candidates);
        Ok(CacheableContent {
            candidates,
            total_estimated_tokens,
            cache_score,
        })
    }

    /// Builds the stable prefix and records its hash.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the store is unavailable.
    #[instrument(skip(self), fields(operation = "build_stable_prefix", workspace = %workspace))]
    pub fn build_stable_prefix(&self, workspace: &WorkspaceId) -> Result<StableContextPrefix> {
        let start = Instant::now();
        let ws = self.registry.get(workspace)?;
        let candidates = self.snapshot_candidates(&ws)?;

        let sections = group_sections(&candidates);
        let joined = sections
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prefix = normalize_for_hash(&joined);
        let hash = content_hash(&prefix);
        let total_tokens = sections.iter().map(|s| s.tokens).sum();
        let generated_at = ws.record_hash(&hash, current_timestamp());

        metrics::histogram!("prefix_assembly_duration_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);
        tracing::debug!(
            hash = %hash,
            sections = sections.len(),
            total_tokens,
            "Built stable context prefix"
        );

        Ok(StableContextPrefix {
            prefix,
            hash,
            total_tokens,
            sections,
            generated_at,
        })
    }

    /// Compares a caller's prefix hash with the current prefix.
    ///
    /// When the hashes differ, every prefix source whose change marker is at
    /// or after the previous hash's generation time is listed as changed. A
    /// hash this process never built is treated as generated at the epoch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the store is unavailable.
    #[instrument(skip(self), fields(operation = "get_cache_state", workspace = %workspace))]
    pub fn get_cache_state(
        &self,
        workspace: &WorkspaceId,
        previous_hash: Option<&str>,
    ) -> Result<CacheState> {
        let current = self.build_stable_prefix(workspace)?;
        let ws = self.registry.get(workspace)?;

        let (valid, changed_sources) = match previous_hash {
            None => (false, Vec::new()),
            Some(previous) if previous == current.hash => (true, Vec::new()),
            Some(previous) => {
                let since = ws
                    .hash_generated_at(previous)
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
                (false, changed_since(&ws, since)?)
            },
        };

        Ok(CacheState {
            valid,
            current_hash: current.hash,
            provided_hash: previous_hash.map(ToString::to_string),
            changed_sources,
            recommendation: if valid {
                CacheRecommendation::Reuse
            } else {
                CacheRecommendation::Refresh
            },
            stable_content_tokens: current.total_tokens,
        })
    }

    /// Starts a client session: builds the stable prefix and snapshots the
    /// last day of activity, three entries per type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the store is unavailable.
    #[instrument(skip(self), fields(operation = "session_init", workspace = %workspace))]
    pub fn session_init(&self, workspace: &WorkspaceId) -> Result<SessionInit> {
        let started_at = current_timestamp();
        let prefix = self.build_stable_prefix(workspace)?;
        let activity = ActivityQuery::new()
            .with_hours(SESSION_ACTIVITY_HOURS)
            .with_limit_per_type(SESSION_ACTIVITY_LIMIT);
        let initial_activity =
            ActivityService::new(Arc::clone(&self.registry)).recent_activity(workspace, &activity)?;

        let session = SessionInit {
            session_id: uuid::Uuid::new_v4().to_string(),
            workspace: workspace.clone(),
            started_at,
            stable_context_ready: !prefix.prefix.is_empty(),
            stable_context_hash: prefix.hash,
            stable_context_tokens: prefix.total_tokens,
            initial_activity,
            recommendations: SESSION_RECOMMENDATIONS.iter().map(ToString::to_string).collect(),
        };
        tracing::info!(
            session_id = %session.session_id,
            stable_context_tokens = session.stable_context_tokens,
            "Initialized session"
        );
        Ok(session)
    }

    /// Packs whole sections of query-specific context under `budget` tokens.
    ///
    /// The active document is tried first, then decision and progress
    /// sections selected by keywords in `query_intent`. A section that does
    /// not fit is skipped entirely.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the store is unavailable.
    #[instrument(skip(self), fields(operation = "get_dynamic_context", workspace = %workspace))]
    pub fn get_dynamic_context(
        &self,
        workspace: &WorkspaceId,
        query_intent: &str,
        budget: Option<usize>,
    ) -> Result<DynamicContextBundle> {
        let budget = budget.unwrap_or(self.settings.default_dynamic_budget);
        let ws = self.registry.get(workspace)?;
        let store = &ws.stores().primary;
        let intent = query_intent.to_lowercase();
        let mut packer = Packer::new(budget);

        let active = store.read_document(ContextKind::Active)?;
        if !active.content.is_empty() {
            let lines: Vec<String> = active
                .content
                .iter()
                .map(|(key, value)| format!("{}: {}", key.to_uppercase(), render_value(value)))
                .collect();
            packer.offer("active_context", "=== ACTIVE CONTEXT ===", &lines);
        }

        if mentions_any(&intent, &DECISION_TERMS) {
            let decisions =
                store.list_decisions(&ItemFilter::new().with_limit(RECENT_DECISIONS_LIMIT))?;
            packer.offer(
                "recent_decisions",
                "=== RECENT DECISIONS ===",
                &render_decisions(&decisions),
            );
        }

        if mentions_any(&intent, &PROGRESS_TERMS) {
            let progress = store.list_progress(
                &ItemFilter::new()
                    .with_status("IN_PROGRESS")
                    .with_limit(CURRENT_PROGRESS_LIMIT),
            )?;
            let lines: Vec<String> = progress
                .iter()
                .map(|p| format!("- [{}] {}", p.status, p.description))
                .collect();
            packer.offer("current_progress", "=== CURRENT PROGRESS ===", &lines);
        }

        let terms: Vec<&str> = TECH_TERMS
            .iter()
            .copied()
            .filter(|t| intent.contains(t))
            .collect();
        if !terms.is_empty() && !packer.has("recent_decisions") {
            let decisions: Vec<Decision> = store
                .list_decisions(&ItemFilter::new())?
                .into_iter()
                .filter(|d| mentions_any(&decision_text(d), &terms))
                .take(TECH_DECISIONS_LIMIT)
                .collect();
            packer.offer(
                "tech_decisions",
                "=== RELEVANT TECHNICAL DECISIONS ===",
                &render_decisions(&decisions),
            );
        }

        if packer.sections.len() <= 1
            && !packer.has("recent_decisions")
            && !packer.has("tech_decisions")
        {
            let decisions =
                store.list_decisions(&ItemFilter::new().with_limit(FALLBACK_DECISIONS_LIMIT))?;
            packer.offer(
                "fallback_decisions",
                "=== RECENT DECISIONS ===",
                &render_decisions(&decisions),
            );
        }

        tracing::debug!(
            sections = packer.sections.len(),
            tokens_used = packer.used,
            budget,
            "Packed dynamic context"
        );
        Ok(packer.finish(query_intent))
    }

    /// Reads the candidates, retrying if a prefix source was written while
    /// they were being read.
    fn snapshot_candidates(&self, ws: &Workspace) -> Result<Vec<CacheableCandidate>> {
        let store = &ws.stores().primary;
        let mut candidates = Vec::new();
        for attempt in 1..=SNAPSHOT_ATTEMPTS {
            let before = store.change_markers()?;
            candidates = self.collect_candidates(ws)?;
            if store.change_markers()? == before {
                return Ok(candidates);
            }
            tracing::debug!(attempt, "Prefix sources changed during read; retrying");
        }
        tracing::warn!(
            attempts = SNAPSHOT_ATTEMPTS,
            "Prefix sources kept changing; using the last read"
        );
        Ok(candidates)
    }

    fn collect_candidates(&self, ws: &Workspace) -> Result<Vec<CacheableCandidate>> {
        let store = &ws.stores().primary;
        let mut candidates = Vec::new();

        let product = store.read_document(ContextKind::Product)?;
        if !product.content.is_empty() {
            candidates.push(candidate(
                CandidateSource::ProductContext,
                PriorityTier::High,
                pretty_json(&Value::Object(product.content))?,
                product.updated_at,
            ));
        }

        let patterns = store.list_system_patterns(
            &ItemFilter::new().with_limit(self.settings.prefix_pattern_limit.max(1)),
        )?;
        for pattern in patterns.into_iter().take(self.settings.prefix_pattern_limit) {
            let mut body = format!("Pattern: {}", pattern.name);
            if let Some(description) = &pattern.description {
                body.push_str("\nDescription: ");
                body.push_str(description);
            }
            candidates.push(candidate(
                CandidateSource::SystemPattern {
                    pattern_id: pattern.id,
                    name: pattern.name,
                },
                PriorityTier::Medium,
                body,
                Some(pattern.timestamp),
            ));
        }

        for datum in store.list_custom_data(None, None)? {
            let tier = match datum.cache_hint {
                Some(true) => PriorityTier::Medium,
                None if content_size(&datum.value) > self.settings.content_threshold => {
                    PriorityTier::Low
                },
                _ => continue,
            };
            let value = match &datum.value {
                Value::String(s) => s.clone(),
                other => pretty_json(other)?,
            };
            candidates.push(candidate(
                CandidateSource::CustomData {
                    id: datum.id,
                    category: datum.category.clone(),
                    key: datum.key.clone(),
                },
                tier,
                format!("[{}/{}]\n{value}", datum.category, datum.key),
                Some(datum.timestamp),
            ));
        }

        candidates.sort_by_key(|c| (c.tier, c.source.kind()));
        Ok(candidates)
    }
}

impl std::fmt::Debug for AssemblerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssemblerService")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Normalizes text before hashing.
///
/// Lines are right-trimmed and inner whitespace runs collapse to one space;
/// leading indentation is kept. Blank-line runs collapse to one blank line,
/// leading and trailing blank lines are dropped, and non-empty output ends
/// with exactly one newline.
#[must_use]
pub fn normalize_for_hash(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_blank = false;
    for line in text.lines() {
        let trimmed = line.trim_end();
        let body = trimmed.trim_start();
        if body.is_empty() {
            pending_blank = !out.is_empty();
            continue;
        }
        if pending_blank {
            out.push('\n');
            pending_blank = false;
        }
        out.push_str(&trimmed[..trimmed.len() - body.len()]);
        out.push_str(&body.split_whitespace().collect::<Vec<_>>().join(" "));
        out.push('\n');
    }
    out
}

/// SHA-256 hex digest of the normalized form of `text`.
#[must_use]
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(normalize_for_hash(text).as_bytes()))
}

fn candidate(
    source: CandidateSource,
    tier: PriorityTier,
    body: String,
    last_modified: Option<DateTime<Utc>>,
) -> CacheableCandidate {
    CacheableCandidate {
        estimated_tokens: estimate_tokens(&body),
        source,
        tier,
        body,
        last_modified,
    }
}

/// Section name and header for a `(tier, kind)` group.
const fn section_label(tier: PriorityTier, kind: SourceKind) -> (&'static str, &'static str) {
    match (tier, kind) {
        (_, SourceKind::Document) => ("project_context", "=== PROJECT CONTEXT ==="),
        (_, SourceKind::Pattern) => ("system_patterns", "=== SYSTEM PATTERNS ==="),
        (PriorityTier::Low, SourceKind::Data) => ("reference_data", "=== REFERENCE DATA ==="),
        (_, SourceKind::Data) => ("critical_specs", "=== CRITICAL SPECIFICATIONS ==="),
    }
}

/// Groups ordered candidates into one section per `(tier, kind)` run.
fn group_sections(candidates: &[CacheableCandidate]) -> Vec<PrefixSection> {
    let mut groups: BTreeMap<(PriorityTier, SourceKind), Vec<&CacheableCandidate>> =
        BTreeMap::new();
    for c in candidates {
        groups.entry((c.tier, c.source.kind())).or_default().push(c);
    }

    groups
        .into_iter()
        .map(|((tier, kind), members)| {
            let (name, header) = section_label(tier, kind);
            let mut raw = String::from(header);
            for member in &members {
                raw.push_str("\n\n");
                raw.push_str(&member.body);
            }
            let content = normalize_for_hash(&raw);
            PrefixSection {
                name: name.to_string(),
                tier,
                source_kind: kind,
                tokens: estimate_tokens(&content),
                item_count: members.len(),
                last_modified: members.iter().filter_map(|m| m.last_modified).max(),
                content,
            }
        })
        .collect()
}

fn changed_since(ws: &Workspace, since: DateTime<Utc>) -> Result<Vec<ChangedSource>> {
    let markers = ws.stores().primary.change_markers()?;
    Ok(PREFIX_SOURCES
        .iter()
        .filter_map(|source| {
            markers
                .get(*source)
                .filter(|modified| **modified >= since)
                .map(|modified| ChangedSource {
                    source: (*source).to_string(),
                    last_modified: *modified,
                })
        })
        .collect())
}

fn pretty_json(value: &Value) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| Error::OperationFailed {
        operation: "serialize_prefix_value".to_string(),
        cause: e.to_string(),
    })
}

fn mentions_any(text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| text.contains(t))
}

fn decision_text(decision: &Decision) -> String {
    let mut text = decision.summary.to_lowercase();
    if let Some(rationale) = &decision.rationale {
        text.push(' ');
        text.push_str(&rationale.to_lowercase());
    }
    text
}

fn render_decisions(decisions: &[Decision]) -> Vec<String> {
    decisions
        .iter()
        .map(|d| match &d.rationale {
            Some(rationale) => format!("- {}\n  Rationale: {rationale}", d.summary),
            None => format!("- {}", d.summary),
        })
        .collect()
}

/// Greedy whole-section packer.
struct Packer {
    budget: usize,
    used: usize,
    sections: Vec<DynamicSection>,
}

impl Packer {
    const fn new(budget: usize) -> Self {
        Self {
            budget,
            used: 0,
            sections: Vec::new(),
        }
    }

    /// Adds the section if it has lines and fits the remaining budget.
    fn offer(&mut self, name: &str, header: &str, lines: &[String]) {
        if lines.is_empty() {
            return;
        }
        let content = format!("{header}\n{}", lines.join("\n"));
        let tokens = estimate_tokens(&content);
        if self.used + tokens > self.budget {
            tracing::debug!(section = name, tokens, "Section does not fit; skipped");
            return;
        }
        self.used += tokens;
        self.sections.push(DynamicSection {
            name: name.to_string(),
            content,
            tokens,
        });
    }

    fn has(&self, name: &str) -> bool {
        self.sections.iter().any(|s| s.name == name)
    }

    fn finish(self, query_intent: &str) -> DynamicContextBundle {
        DynamicContextBundle {
            query_intent: query_intent.to_string(),
            tokens_remaining: self.budget - self.used,
            tokens_used: self.used,
            budget: self.budget,
            sections: self.sections,
        }
    }
}
