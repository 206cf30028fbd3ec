//! Business logic services.
//!
//! Services orchestrate the per-workspace stores and provide the
//! high-level operations. Every operation takes an explicit
//! [`WorkspaceId`](crate::models::WorkspaceId); there is no current
//! workspace.

mod activity;
mod assembler;
mod context;
mod fusion;
mod graph;
mod search;
mod sync;
mod tokens;
mod workspace;

pub use activity::ActivityService;
pub use assembler::{AssemblerService, content_hash, normalize_for_hash};
pub use context::ContextService;
pub use fusion::{FusedScore, FusionWeights, fuse, min_max_normalize};
pub use graph::GraphService;
pub use search::SearchService;
pub use sync::IndexSynchronizer;
pub use tokens::{aggregate_cache_score, content_size, custom_data_cache_score, estimate_tokens};
pub use workspace::{Workspace, WorkspaceRegistry};

use crate::config::ContextKeepConfig;
use crate::embedding::{Embedder, HashEmbedder};
use crate::{Error, Result};
use std::sync::Arc;

/// Wires the services together over one shared workspace registry.
pub struct ServiceContainer {
    config: ContextKeepConfig,
    registry: Arc<WorkspaceRegistry>,
    sync: Arc<IndexSynchronizer>,
    context: ContextService,
    graph: GraphService,
    search: SearchService,
    assembler: AssemblerService,
    activity: ActivityService,
}

impl ServiceContainer {
    /// Creates the services with the built-in hash embedder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the configuration is invalid.
    pub fn new(config: ContextKeepConfig) -> Result<Self> {
        let embedder = Arc::new(HashEmbedder::new(config.embedding_dimensions));
        Self::with_embedder(config, embedder)
    }

    /// Creates the services with a custom embedder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the configuration is invalid or the
    /// embedder's dimensions differ from the configured ones.
    pub fn with_embedder(config: ContextKeepConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate()?;
        if embedder.dimensions() != config.embedding_dimensions {
            return Err(Error::InvalidInput(format!(
                "embedder produces {} dimensions, configuration expects {}",
                embedder.dimensions(),
                config.embedding_dimensions
            )));
        }

        let registry = Arc::new(WorkspaceRegistry::new(&config));
        let sync = Arc::new(IndexSynchronizer::new(embedder));
        tracing::debug!(storage = ?config.storage, data_dir = %config.data_dir.display(), "Creating services");

        Ok(Self {
            context: ContextService::new(Arc::clone(&registry)),
            graph: GraphService::new(
                Arc::clone(&registry),
                Arc::clone(&sync),
                config.assembler.content_threshold,
            ),
            search: SearchService::new(
                Arc::clone(&registry),
                Arc::clone(&sync),
                config.search.clone(),
            ),
            assembler: AssemblerService::new(Arc::clone(&registry), config.assembler.clone()),
            activity: ActivityService::new(Arc::clone(&registry)),
            registry,
            sync,
            config,
        })
    }

    /// Returns the configuration the services were built from.
    #[must_use]
    pub const fn config(&self) -> &ContextKeepConfig {
        &self.config
    }

    /// Returns the shared workspace registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<WorkspaceRegistry> {
        &self.registry
    }

    /// Returns the index synchronizer.
    #[must_use]
    pub const fn sync(&self) -> &Arc<IndexSynchronizer> {
        &self.sync
    }

    /// Returns the document service.
    #[must_use]
    pub const fn context(&self) -> &ContextService {
        &self.context
    }

    /// Returns the knowledge graph service.
    #[must_use]
    pub const fn graph(&self) -> &GraphService {
        &self.graph
    }

    /// Returns the search service.
    #[must_use]
    pub const fn search(&self) -> &SearchService {
        &self.search
    }

    /// Returns the stable-context assembler.
    #[must_use]
    pub const fn assembler(&self) -> &AssemblerService {
        &self.assembler
    }

    /// Returns the activity service.
    #[must_use]
    pub const fn activity(&self) -> &ActivityService {
        &self.activity
    }
}

impl std::fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
