//! Brute-force similarity index persisted as JSON.
//!
//! Search is O(n) over every stored embedding, which is fine for the few
//! thousand items a workspace holds. When a path is set the whole index is
//! rewritten after every mutation, via a temporary file and a rename.

use crate::models::{ItemRef, ItemType};
use crate::storage::traits::VectorIndex;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::instrument;

/// Default embedding dimensions.
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Index data for serialization. Keys are `item_type:item_id`.
#[derive(Default, Serialize, Deserialize)]
struct IndexData {
    dimensions: usize,
    vectors: HashMap<String, Vec<f32>>,
}

/// In-memory vector index with optional JSON persistence.
pub struct FlatVectorIndex {
    index_path: Option<PathBuf>,
    dimensions: usize,
    vectors: RwLock<HashMap<ItemRef, Vec<f32>>>,
}

impl FlatVectorIndex {
    /// Opens an index persisted at `index_path`, loading it if the file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or was written
    /// with different dimensions.
    pub fn open(index_path: impl Into<PathBuf>, dimensions: usize) -> Result<Self> {
        let index_path = index_path.into();
        let vectors = load(&index_path, dimensions)?;
        Ok(Self {
            index_path: Some(index_path),
            dimensions,
            vectors: RwLock::new(vectors),
        })
    }

    /// Creates an in-memory index (no file persistence).
    #[must_use]
    pub fn in_memory(dimensions: usize) -> Self {
        Self {
            index_path: None,
            dimensions,
            vectors: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the index path (None for in-memory).
    #[must_use]
    pub fn index_path(&self) -> Option<&Path> {
        self.index_path.as_deref()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ItemRef, Vec<f32>>> {
        self.vectors.read().unwrap_or_else(|poisoned| {
            tracing::warn!("Vector index lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ItemRef, Vec<f32>>> {
        self.vectors.write().unwrap_or_else(|poisoned| {
            tracing::warn!("Vector index lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn save(&self, vectors: &HashMap<ItemRef, Vec<f32>>) -> Result<()> {
        let Some(path) = &self.index_path else {
            return Ok(());
        };

        let data = IndexData {
            dimensions: self.dimensions,
            vectors: vectors
                .iter()
                .map(|(item, embedding)| (item.to_string(), embedding.clone()))
                .collect(),
        };
        let content = serde_json::to_string(&data).map_err(|e| Error::OperationFailed {
            operation: "serialize_vector_index".to_string(),
            cause: e.to_string(),
        })?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
                operation: "create_vector_index_dir".to_string(),
                cause: e.to_string(),
            })?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| Error::OperationFailed {
            operation: "write_vector_index".to_string(),
            cause: e.to_string(),
        })?;
        fs::rename(&tmp, path).map_err(|e| Error::OperationFailed {
            operation: "replace_vector_index".to_string(),
            cause: e.to_string(),
        })
    }

    fn validate_embedding(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimensions {
            return Err(Error::InvalidInput(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimensions,
                embedding.len()
            )));
        }
        Ok(())
    }
}

fn load(path: &Path, dimensions: usize) -> Result<HashMap<ItemRef, Vec<f32>>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let content = fs::read_to_string(path).map_err(|e| Error::OperationFailed {
        operation: "load_vector_index".to_string(),
        cause: e.to_string(),
    })?;
    let data: IndexData = serde_json::from_str(&content).map_err(|e| Error::OperationFailed {
        operation: "parse_vector_index".to_string(),
        cause: e.to_string(),
    })?;

    if data.dimensions != dimensions {
        return Err(Error::InvalidInput(format!(
            "Index dimensions mismatch: expected {dimensions}, got {}",
            data.dimensions
        )));
    }

    let mut vectors = HashMap::with_capacity(data.vectors.len());
    for (key, embedding) in data.vectors {
        match parse_key(&key) {
            Some(item) => {
                vectors.insert(item, embedding);
            },
            None => tracing::warn!(key = %key, "Skipping vector with malformed key"),
        }
    }
    Ok(vectors)
}

fn parse_key(key: &str) -> Option<ItemRef> {
    let (item_type, item_id) = key.split_once(':')?;
    Some(ItemRef::new(ItemType::parse(item_type)?, item_id.parse().ok()?))
}

/// Cosine similarity mapped from `[-1, 1]` to `[0, 1]`.
///
/// Mismatched lengths and zero vectors score 0.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    f32::midpoint(dot_product / (norm_a * norm_b), 1.0).clamp(0.0, 1.0)
}

impl VectorIndex for FlatVectorIndex {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, embedding), fields(operation = "upsert", backend = "flat_vector", item = %item))]
    fn upsert(&self, item: ItemRef, embedding: &[f32]) -> Result<()> {
        self.validate_embedding(embedding)?;
        let mut vectors = self.write();
        let previous = vectors.insert(item, embedding.to_vec());
        if let Err(e) = self.save(&vectors) {
            match previous {
                Some(old) => vectors.insert(item, old),
                None => vectors.remove(&item),
            };
            return Err(e);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(operation = "remove", backend = "flat_vector", item = %item))]
    fn remove(&self, item: ItemRef) -> Result<bool> {
        let mut vectors = self.write();
        let Some(old) = vectors.remove(&item) else {
            return Ok(false);
        };
        if let Err(e) = self.save(&vectors) {
            vectors.insert(item, old);
            return Err(e);
        }
        Ok(true)
    }

    fn search(
        &self,
        query_embedding: &[f32],
        item_types: &[ItemType],
        limit: usize,
    ) -> Result<Vec<(ItemRef, f32)>> {
        self.validate_embedding(query_embedding)?;

        let vectors = self.read();
        let mut scores: Vec<(ItemRef, f32)> = vectors
            .iter()
            .filter(|(item, _)| item_types.is_empty() || item_types.contains(&item.item_type))
            .map(|(item, embedding)| (*item, cosine_similarity(query_embedding, embedding)))
            .collect();

        scores.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scores.truncate(limit);
        Ok(scores)
    }

    fn count(&self) -> Result<usize> {
        Ok(self.read().len())
    }
}
