//! Knowledge graph service.
//!
//! Logs, lists, updates and deletes knowledge items and manages the links
//! between item identities. Every committed write is handed to the
//! [`IndexSynchronizer`]; an index failure becomes a pending flag on the
//! result, never an error. Item writes and deletes hold the workspace's
//! sync guard until the indexes are updated, so concurrent writers on the
//! same item leave the indexes matching the last commit.

use super::sync::IndexSynchronizer;
use super::tokens::{content_size, custom_data_cache_score, estimate_tokens};
use super::workspace::{Workspace, WorkspaceRegistry};
use crate::models::{
    BatchItemResult, BatchReport, CacheSuggestion, CustomDatum, Decision, DeleteOutcome,
    ItemFilter, ItemRef, ItemType, KnowledgeItem, Link, LinkQuery, LoggedCustomData,
    LoggedProgress, NewCustomDatum, NewDecision, NewLink, NewProgress, NewSystemPattern,
    ProgressEntry, ProgressUpdate, SystemPattern, WorkspaceId, WriteOutcome, render_value,
};
use crate::{Error, Result, current_timestamp};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

/// Cache score at which explicitly requested advice recommends caching.
const RECOMMEND_SCORE: u32 = 50;

/// Service for knowledge items and links.
pub struct GraphService {
    registry: Arc<WorkspaceRegistry>,
    sync: Arc<IndexSynchronizer>,
    content_threshold: usize,
}

impl GraphService {
    /// Creates a graph service.
    #[must_use]
    pub const fn new(
        registry: Arc<WorkspaceRegistry>,
        sync: Arc<IndexSynchronizer>,
        content_threshold: usize,
    ) -> Self {
        Self {
            registry,
            sync,
            content_threshold,
        }
    }

    /// Logs a decision.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank summary, or
    /// [`Error::OperationFailed`] if the primary write fails.
    #[instrument(skip(self, args), fields(operation = "log_decision", workspace = %workspace))]
    pub fn log_decision(
        &self,
        workspace: &WorkspaceId,
        args: NewDecision,
    ) -> Result<WriteOutcome<Decision>> {
        let args = args.validated()?;
        let ws = self.registry.get(workspace)?;
        let _sync = ws.sync_guard();
        let decision = ws.stores().primary.insert_decision(&args, current_timestamp())?;
        Ok(self.synced(&ws, decision, KnowledgeItem::Decision))
    }

    /// Logs a progress entry, linking it to another item if one is named.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for blank fields or a half-specified
    /// link, or [`Error::OperationFailed`] if the primary write fails.
    #[instrument(skip(self, args), fields(operation = "log_progress", workspace = %workspace))]
    pub fn log_progress(
        &self,
        workspace: &WorkspaceId,
        args: NewProgress,
    ) -> Result<WriteOutcome<LoggedProgress>> {
        let args = args.validated()?;
        let ws = self.registry.get(workspace)?;
        let _sync = ws.sync_guard();
        let (entry, link) = ws
            .stores()
            .primary
            .insert_progress_with_link(&args, current_timestamp())?;
        let index_sync_pending = self
            .sync
            .index_item(&ws, &KnowledgeItem::ProgressEntry(entry.clone()));
        Ok(WriteOutcome {
            item: LoggedProgress { entry, link },
            index_sync_pending,
        })
    }

    /// Updates a progress entry and re-indexes it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty update,
    /// [`Error::NotFound`] for an unknown id, or [`Error::OperationFailed`]
    /// if the primary write fails.
    #[instrument(skip(self, update), fields(operation = "update_progress", workspace = %workspace))]
    pub fn update_progress(
        &self,
        workspace: &WorkspaceId,
        id: i64,
        update: &ProgressUpdate,
    ) -> Result<WriteOutcome<ProgressEntry>> {
        update.validate()?;
        let ws = self.registry.get(workspace)?;
        let _sync = ws.sync_guard();
        let entry = ws.stores().primary.update_progress(id, update, current_timestamp())?;
        Ok(self.synced(&ws, entry, KnowledgeItem::ProgressEntry))
    }

    /// Logs a system pattern, replacing any pattern with the same name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank name, or
    /// [`Error::OperationFailed`] if the primary write fails.
    #[instrument(skip(self, args), fields(operation = "log_system_pattern", workspace = %workspace))]
    pub fn log_system_pattern(
        &self,
        workspace: &WorkspaceId,
        args: NewSystemPattern,
    ) -> Result<WriteOutcome<SystemPattern>> {
        let args = args.validated()?;
        let ws = self.registry.get(workspace)?;
        let _sync = ws.sync_guard();
        let pattern = ws
            .stores()
            .primary
            .upsert_system_pattern(&args, current_timestamp())?;
        Ok(self.synced(&ws, pattern, KnowledgeItem::SystemPattern))
    }

    /// Logs a custom datum, replacing any datum with the same category and key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank category or key, or
    /// [`Error::OperationFailed`] if the primary write fails.
    #[instrument(skip(self, args), fields(operation = "log_custom_data", workspace = %workspace))]
    pub fn log_custom_data(
        &self,
        workspace: &WorkspaceId,
        args: NewCustomDatum,
    ) -> Result<WriteOutcome<CustomDatum>> {
        let args = args.validated()?;
        let ws = self.registry.get(workspace)?;
        self.store_custom_data(&ws, &args, None)
    }

    /// Logs a custom datum with a computed cache score and optional caching
    /// advice.
    ///
    /// Advice is returned automatically for values larger than the content
    /// threshold when no hint was given, and always when `suggest_caching`
    /// is `Some(true)`. `Some(false)` suppresses it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank category or key, or
    /// [`Error::OperationFailed`] if the primary write fails.
    #[instrument(skip(self, args), fields(operation = "log_custom_data_with_cache_hint", workspace = %workspace))]
    pub fn log_custom_data_with_cache_hint(
        &self,
        workspace: &WorkspaceId,
        args: NewCustomDatum,
        suggest_caching: Option<bool>,
    ) -> Result<WriteOutcome<LoggedCustomData>> {
        let args = args.validated()?;
        let ws = self.registry.get(workspace)?;

        let size = content_size(&args.value);
        let score = custom_data_cache_score(&args.value, &args.category, &args.key, args.cache_hint);
        let suggestion = self.cache_suggestion(&args, size, score, suggest_caching);

        Ok(self
            .store_custom_data(&ws, &args, Some(score))?
            .map(|datum| LoggedCustomData {
                datum,
                cache_suggestion: suggestion,
            }))
    }

    fn cache_suggestion(
        &self,
        args: &NewCustomDatum,
        size: usize,
        score: u32,
        suggest_caching: Option<bool>,
    ) -> Option<CacheSuggestion> {
        let large = size > self.content_threshold;
        let auto = large && args.cache_hint.is_none() && suggest_caching.is_none();
        if !auto && suggest_caching != Some(true) {
            return None;
        }

        let (recommended, reason) = if large {
            (true, format!("Large content ({size} chars) suitable for caching"))
        } else if args.cache_hint == Some(true) {
            (true, "Explicit cache hint set".to_string())
        } else if score >= RECOMMEND_SCORE {
            (true, format!("High-value category or key (score {score})"))
        } else {
            (false, format!("Small content ({size} chars) gains little from caching"))
        };

        Some(CacheSuggestion {
            recommended,
            reason,
            estimated_tokens: estimate_tokens(&render_value(&args.value)),
            cache_score: score,
        })
    }

    fn store_custom_data(
        &self,
        ws: &Workspace,
        args: &NewCustomDatum,
        cache_score: Option<u32>,
    ) -> Result<WriteOutcome<CustomDatum>> {
        let _sync = ws.sync_guard();
        let datum = ws
            .stores()
            .primary
            .upsert_custom_data(args, cache_score, current_timestamp())?;
        Ok(self.synced(ws, datum, KnowledgeItem::CustomData))
    }

    /// Indexes a committed record and wraps it with the pending flag.
    fn synced<T: Clone>(
        &self,
        ws: &Workspace,
        record: T,
        as_item: fn(T) -> KnowledgeItem,
    ) -> WriteOutcome<T> {
        let index_sync_pending = self.sync.index_item(ws, &as_item(record.clone()));
        WriteOutcome {
            item: record,
            index_sync_pending,
        }
    }

    /// Lists decisions, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an invalid filter, or
    /// [`Error::OperationFailed`] if the read fails.
    #[instrument(skip(self, filter), fields(operation = "get_decisions", workspace = %workspace))]
    pub fn get_decisions(
        &self,
        workspace: &WorkspaceId,
        filter: &ItemFilter,
    ) -> Result<Vec<Decision>> {
        filter.validate()?;
        self.registry.get(workspace)?.stores().primary.list_decisions(filter)
    }

    /// Lists progress entries, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an invalid filter, or
    /// [`Error::OperationFailed`] if the read fails.
    #[instrument(skip(self, filter), fields(operation = "get_progress", workspace = %workspace))]
    pub fn get_progress(
        &self,
        workspace: &WorkspaceId,
        filter: &ItemFilter,
    ) -> Result<Vec<ProgressEntry>> {
        filter.validate()?;
        self.registry.get(workspace)?.stores().primary.list_progress(filter)
    }

    /// Lists system patterns by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an invalid filter, or
    /// [`Error::OperationFailed`] if the read fails.
    #[instrument(skip(self, filter), fields(operation = "get_system_patterns", workspace = %workspace))]
    pub fn get_system_patterns(
        &self,
        workspace: &WorkspaceId,
        filter: &ItemFilter,
    ) -> Result<Vec<SystemPattern>> {
        filter.validate()?;
        self.registry
            .get(workspace)?
            .stores()
            .primary
            .list_system_patterns(filter)
    }

    /// Lists custom data by category and key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `key` is given without `category`,
    /// [`Error::NotFound`] if a specific category and key does not exist, or
    /// [`Error::OperationFailed`] if the read fails.
    #[instrument(skip(self), fields(operation = "get_custom_data", workspace = %workspace))]
    pub fn get_custom_data(
        &self,
        workspace: &WorkspaceId,
        category: Option<&str>,
        key: Option<&str>,
    ) -> Result<Vec<CustomDatum>> {
        if key.is_some() && category.is_none() {
            return Err(Error::InvalidInput(
                "key cannot be given without category".to_string(),
            ));
        }
        let data = self
            .registry
            .get(workspace)?
            .stores()
            .primary
            .list_custom_data(category, key)?;
        if let (Some(category), Some(key), true) = (category, key, data.is_empty()) {
            return Err(Error::not_found("custom_data", format!("{category}/{key}")));
        }
        Ok(data)
    }

    /// Reads one item by identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the item does not exist.
    pub fn get_item(&self, workspace: &WorkspaceId, item: ItemRef) -> Result<KnowledgeItem> {
        self.registry
            .get(workspace)?
            .stores()
            .primary
            .get_item(item)?
            .ok_or_else(|| Error::not_found(item.item_type.as_str(), item.item_id))
    }

    /// Deletes an item and removes it from both indexes.
    ///
    /// Links referencing the item are kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the item does not exist, or
    /// [`Error::OperationFailed`] if the primary delete fails.
    #[instrument(skip(self), fields(operation = "delete_item", workspace = %workspace, item = %item))]
    pub fn delete(&self, workspace: &WorkspaceId, item: ItemRef) -> Result<DeleteOutcome> {
        let ws = self.registry.get(workspace)?;
        let _sync = ws.sync_guard();
        ws.stores().primary.delete_item(item, current_timestamp())?;
        let index_cleanup_pending = self.sync.remove_item(&ws, item);
        Ok(DeleteOutcome {
            deleted: item,
            index_cleanup_pending,
        })
    }

    /// Logs each element of `items` independently as `item_type`.
    ///
    /// A malformed or failing element is reported in its slot and does not
    /// stop the others.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an unknown item type or an empty
    /// list.
    #[instrument(skip(self, items), fields(operation = "batch_log", workspace = %workspace, count = items.len()))]
    pub fn batch_log(
        &self,
        workspace: &WorkspaceId,
        item_type: &str,
        items: Vec<Value>,
    ) -> Result<BatchReport> {
        let item_type: ItemType = item_type.parse()?;
        if items.is_empty() {
            return Err(Error::InvalidInput("items must not be empty".to_string()));
        }

        let results = items
            .into_iter()
            .enumerate()
            .map(|(index, value)| match self.log_value(workspace, item_type, value) {
                Ok((item, index_sync_pending)) => BatchItemResult::Logged {
                    index,
                    item,
                    index_sync_pending,
                },
                Err(e) => {
                    tracing::debug!(index, error = %e, "Batch element failed");
                    BatchItemResult::Failed {
                        index,
                        error: e.to_string(),
                    }
                },
            })
            .collect();
        Ok(BatchReport { results })
    }

    fn log_value(
        &self,
        workspace: &WorkspaceId,
        item_type: ItemType,
        value: Value,
    ) -> Result<(KnowledgeItem, bool)> {
        let outcome = match item_type {
            ItemType::Decision => self
                .log_decision(workspace, parse_args(value)?)?
                .map(KnowledgeItem::Decision),
            ItemType::ProgressEntry => self
                .log_progress(workspace, parse_args(value)?)?
                .map(|logged| KnowledgeItem::ProgressEntry(logged.entry)),
            ItemType::SystemPattern => self
                .log_system_pattern(workspace, parse_args(value)?)?
                .map(KnowledgeItem::SystemPattern),
            ItemType::CustomData => self
                .log_custom_data(workspace, parse_args(value)?)?
                .map(KnowledgeItem::CustomData),
        };
        Ok((outcome.item, outcome.index_sync_pending))
    }

    /// Creates a link. Endpoints are not required to exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank identity part or
    /// relationship, or [`Error::OperationFailed`] if the write fails.
    #[instrument(skip(self, link), fields(operation = "link", workspace = %workspace))]
    pub fn link(&self, workspace: &WorkspaceId, link: &NewLink) -> Result<Link> {
        link.validate()?;
        self.registry
            .get(workspace)?
            .stores()
            .primary
            .insert_link(link, current_timestamp())
    }

    /// Returns links where the identity is either source or target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an invalid query, or
    /// [`Error::OperationFailed`] if the read fails.
    #[instrument(skip(self, query), fields(operation = "get_linked_items", workspace = %workspace))]
    pub fn get_linked_items(
        &self,
        workspace: &WorkspaceId,
        query: &LinkQuery,
    ) -> Result<Vec<Link>> {
        query.validate()?;
        self.registry.get(workspace)?.stores().primary.links_for(query)
    }

    /// Deletes a single link.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no link has this id.
    #[instrument(skip(self), fields(operation = "delete_link", workspace = %workspace))]
    pub fn delete_link(&self, workspace: &WorkspaceId, id: i64) -> Result<()> {
        self.registry.get(workspace)?.stores().primary.delete_link(id)
    }
}

fn parse_args<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| Error::InvalidInput(e.to_string()))
}
