//! Lexical, semantic and hybrid search.
//!
//! Candidates come from the indexes, get scored, and are joined back to the
//! primary store. A hit whose item no longer exists is dropped, so a
//! lagging index never surfaces a deleted item.

use super::fusion::{FusedScore, FusionWeights, fuse, single_source};
use super::sync::IndexSynchronizer;
use super::workspace::WorkspaceRegistry;
use crate::config::SearchSettings;
use crate::models::{SearchFilter, SearchHit, SearchMode, WorkspaceId};
use crate::storage::WorkspaceStores;
use crate::{Error, Result};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Service for ranked retrieval over knowledge items.
pub struct SearchService {
    registry: Arc<WorkspaceRegistry>,
    sync: Arc<IndexSynchronizer>,
    settings: SearchSettings,
}

impl SearchService {
    /// Creates a search service.
    #[must_use]
    pub const fn new(
        registry: Arc<WorkspaceRegistry>,
        sync: Arc<IndexSynchronizer>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            registry,
            sync,
            settings,
        }
    }

    /// Searches `workspace` for `query`.
    ///
    /// Results are ordered by score, then most recent timestamp, then
    /// identity. Tag and category filters apply after ranking and before
    /// truncation. When fewer than `limit` candidates survive the filters,
    /// the candidate pool doubles until enough do or every consulted index
    /// is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank query or invalid filter,
    /// or [`Error::OperationFailed`] if a store is unavailable.
    #[instrument(skip(self, filter), fields(operation = "search", workspace = %workspace, mode = %mode))]
    pub fn search(
        &self,
        workspace: &WorkspaceId,
        query: &str,
        mode: SearchMode,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("query must not be empty".to_string()));
        }
        filter.validate()?;

        let start = Instant::now();
        let limit = filter.limit.unwrap_or(self.settings.default_limit);
        let stores = self.registry.get(workspace)?.stores().clone();
        let embedding = if mode == SearchMode::Lexical {
            None
        } else {
            Some(self.sync.embedder().embed(query)?)
        };

        let mut pool = self.settings.candidate_pool.max(limit);
        let (mut hits, lexical_candidates, semantic_candidates) = loop {
            let lexical = if mode == SearchMode::Semantic {
                Vec::new()
            } else {
                stores.lexical.search(query, &filter.item_types, pool)?
            };
            let semantic = match &embedding {
                Some(embedding) => stores.vector.search(embedding, &filter.item_types, pool)?,
                None => Vec::new(),
            };

            let candidates = match mode {
                SearchMode::Lexical => single_source(&lexical, true),
                SearchMode::Semantic => single_source(&semantic, false),
                SearchMode::Hybrid => fuse(&lexical, &semantic, self.weights()),
            };
            let hits = matching_hits(&stores, candidates, filter)?;

            let exhausted = lexical.len() < pool && semantic.len() < pool;
            if hits.len() >= limit || exhausted {
                break (hits, lexical.len(), semantic.len());
            }
            pool = pool.saturating_mul(2);
            tracing::debug!(matched = hits.len(), pool, "Widening candidate pool");
        };

        hits.sort_by(rank);
        hits.truncate(limit);

        metrics::histogram!("search_duration_ms", "mode" => mode.as_str())
            .record(start.elapsed().as_secs_f64() * 1000.0);
        tracing::debug!(
            lexical_candidates,
            semantic_candidates,
            results = hits.len(),
            "Search completed"
        );
        Ok(hits)
    }

    const fn weights(&self) -> FusionWeights {
        FusionWeights {
            lexical: self.settings.lexical_weight,
            semantic: self.settings.semantic_weight,
        }
    }
}

/// Joins candidates to their primary items and keeps those `filter` accepts.
fn matching_hits(
    stores: &WorkspaceStores,
    candidates: Vec<FusedScore>,
    filter: &SearchFilter,
) -> Result<Vec<SearchHit>> {
    let refs: Vec<_> = candidates.iter().map(|c| c.item).collect();
    let items = stores.primary.get_items(&refs)?;
    let dangling = refs.len() - items.len();
    if dangling > 0 {
        tracing::debug!(dangling, "Dropped index hits without a primary item");
    }

    Ok(candidates
        .into_iter()
        .filter_map(|FusedScore { item, score, lexical, semantic }| {
            items.get(&item).map(|found| SearchHit {
                item: found.clone(),
                score,
                lexical_score: lexical,
                semantic_score: semantic,
            })
        })
        .filter(|hit| filter.matches(&hit.item))
        .collect())
}

/// Score descending, then newest first, then identity ascending.
fn rank(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.item.timestamp().cmp(&a.item.timestamp()))
        .then_with(|| a.item.item_ref().cmp(&b.item.item_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ContextKeepConfig;
    use crate::embedding::HashEmbedder;
    use crate::models::{ItemType, NewDecision, NewSystemPattern};
    use crate::services::GraphService;

    fn services() -> (GraphService, SearchService, WorkspaceId) {
        let config = ContextKeepConfig::in_memory();
        let registry = Arc::new(WorkspaceRegistry::new(&config));
        let sync = Arc::new(IndexSynchronizer::new(Arc::new(HashEmbedder::default())));
        (
            GraphService::new(Arc::clone(&registry), Arc::clone(&sync), 1500),
            SearchService::new(registry, sync, config.search),
            WorkspaceId::new("search").unwrap(),
        )
    }

    #[test]
    fn test_lexical_search_finds_term() {
        let (graph, search, ws) = services();
        graph
            .log_decision(&ws, NewDecision::new("Use Redis for caching"))
            .unwrap();
        graph
            .log_decision(&ws, NewDecision::new("Render with React"))
            .unwrap();

        let hits = search
            .search(&ws, "redis", SearchMode::Lexical, &SearchFilter::new())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].lexical_score.is_some());
        assert!(hits[0].semantic_score.is_none());
    }

    #[test]
    fn test_type_filter_and_limit() {
        let (graph, search, ws) = services();
        for i in 0..5 {
            graph
                .log_decision(&ws, NewDecision::new(format!("storage decision {i}")))
                .unwrap();
        }
        graph
            .log_system_pattern(&ws, NewSystemPattern::new("storage pattern"))
            .unwrap();

        let filter = SearchFilter::new()
            .with_item_type(ItemType::SystemPattern)
            .with_limit(3);
        let hits = search.search(&ws, "storage", SearchMode::Hybrid, &filter).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item.item_type(), ItemType::SystemPattern);

        let hits = search
            .search(&ws, "storage", SearchMode::Hybrid, &SearchFilter::new().with_limit(3))
            .unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_blank_query_rejected() {
        let (_, search, ws) = services();
        let err = search
            .search(&ws, "  ", SearchMode::Hybrid, &SearchFilter::new())
            .unwrap_err();
        assert!(err.is_invalid_input());
    }
}
