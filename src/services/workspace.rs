//! Per-workspace store registry.
//!
//! Every operation names its workspace explicitly. The registry opens the
//! workspace's stores on first use and hands out the cached handle after
//! that.

use crate::config::{ContextKeepConfig, StorageMode};
use crate::models::WorkspaceId;
use crate::storage::WorkspaceStores;
use crate::storage::sqlite::acquire_lock;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::instrument;

/// Sub-directory of the data dir holding one directory per workspace.
const WORKSPACES_DIR: &str = "workspaces";

/// An open workspace: its stores plus the prefix hash ledger.
pub struct Workspace {
    id: WorkspaceId,
    stores: WorkspaceStores,
    index_sync: Mutex<()>,
    hash_ledger: Mutex<LruCache<String, DateTime<Utc>>>,
}

impl Workspace {
    fn new(id: WorkspaceId, stores: WorkspaceStores, ledger_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(ledger_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            id,
            stores,
            index_sync: Mutex::new(()),
            hash_ledger: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the workspace id.
    #[must_use]
    pub const fn id(&self) -> &WorkspaceId {
        &self.id
    }

    /// Returns the workspace stores.
    #[must_use]
    pub const fn stores(&self) -> &WorkspaceStores {
        &self.stores
    }

    /// Serializes item writes with their index updates.
    ///
    /// Hold the guard from the primary write until both indexes reflect it.
    /// Acquire it before any store connection lock.
    #[must_use]
    pub fn sync_guard(&self) -> MutexGuard<'_, ()> {
        acquire_lock(&self.index_sync)
    }

    /// Records that `hash` was generated at `generated_at`.
    ///
    /// Returns the first recorded generation time for this hash.
    pub fn record_hash(&self, hash: &str, generated_at: DateTime<Utc>) -> DateTime<Utc> {
        let mut ledger = acquire_lock(&self.hash_ledger);
        if let Some(first) = ledger.get(hash) {
            return *first;
        }
        ledger.put(hash.to_string(), generated_at);
        generated_at
    }

    /// Returns when `hash` was first generated, if it is still remembered.
    #[must_use]
    pub fn hash_generated_at(&self, hash: &str) -> Option<DateTime<Utc>> {
        acquire_lock(&self.hash_ledger).get(hash).copied()
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("id", &self.id)
            .field("stores", &self.stores)
            .finish_non_exhaustive()
    }
}

/// Lazily-opened, cached workspaces.
pub struct WorkspaceRegistry {
    storage: StorageMode,
    data_dir: PathBuf,
    dimensions: usize,
    ledger_capacity: usize,
    workspaces: Mutex<HashMap<WorkspaceId, Arc<Workspace>>>,
}

impl WorkspaceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: &ContextKeepConfig) -> Self {
        Self {
            storage: config.storage,
            data_dir: config.data_dir.clone(),
            dimensions: config.embedding_dimensions,
            ledger_capacity: config.assembler.hash_ledger_capacity,
            workspaces: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the on-disk directory for `id`.
    #[must_use]
    pub fn workspace_dir(&self, id: &WorkspaceId) -> PathBuf {
        self.data_dir.join(WORKSPACES_DIR).join(id.storage_key())
    }

    /// Returns the open workspace for `id`, opening it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the stores cannot be opened.
    #[instrument(skip(self), fields(operation = "open_workspace", workspace = %id))]
    pub fn get(&self, id: &WorkspaceId) -> Result<Arc<Workspace>> {
        let mut workspaces = acquire_lock(&self.workspaces);
        if let Some(workspace) = workspaces.get(id) {
            return Ok(Arc::clone(workspace));
        }

        let stores = match self.storage {
            StorageMode::Memory => WorkspaceStores::in_memory(self.dimensions)?,
            StorageMode::Disk => {
                let dir = self.workspace_dir(id);
                std::fs::create_dir_all(&dir).map_err(|e| Error::OperationFailed {
                    operation: "create_workspace_dir".to_string(),
                    cause: format!("{}: {e}", dir.display()),
                })?;
                WorkspaceStores::open(&dir, self.dimensions)?
            },
        };
        tracing::debug!(storage = ?self.storage, "Opened workspace stores");

        let workspace = Arc::new(Workspace::new(id.clone(), stores, self.ledger_capacity));
        workspaces.insert(id.clone(), Arc::clone(&workspace));
        Ok(workspace)
    }

    /// Installs `stores` for `id`, replacing any cached workspace.
    pub fn register(&self, id: WorkspaceId, stores: WorkspaceStores) -> Arc<Workspace> {
        let workspace = Arc::new(Workspace::new(id.clone(), stores, self.ledger_capacity));
        acquire_lock(&self.workspaces).insert(id, Arc::clone(&workspace));
        workspace
    }

    /// Returns the ids of every open workspace, sorted.
    #[must_use]
    pub fn open_workspaces(&self) -> Vec<WorkspaceId> {
        let mut ids: Vec<_> = acquire_lock(&self.workspaces).keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for WorkspaceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceRegistry")
            .field("storage", &self.storage)
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}
