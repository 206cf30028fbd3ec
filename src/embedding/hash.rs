//! Hashed bag-of-words embedder.

use super::Embedder;
use crate::storage::vector::DEFAULT_DIMENSIONS;
use crate::{Error, Result};
use sha2::{Digest, Sha256};

/// Upper bound on words hashed per text.
const MAX_WORDS: usize = 1000;

/// Deterministic pseudo-embedder.
///
/// Each lowercased alphanumeric word is hashed with SHA-256 and spread over
/// eight dimensions; the sum is L2-normalized. Texts sharing words land
/// close together, which is all the similarity index needs. The output is
/// stable across platforms and toolchains.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    /// Creates an embedder with the given dimensions.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn word_hash(word: &str) -> u64 {
        let digest = Sha256::digest(word.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(bytes)
    }

    fn distribute_hash(embedding: &mut [f32], hash: u64) {
        let dimensions = embedding.len();
        for j in 0..8 {
            let idx = (hash >> (j * 8)) as usize % dimensions;
            let value = ((hash >> (j * 4)) & 0xFF) as f32 / 255.0 - 0.5;
            embedding[idx] += value;
        }
    }

    fn normalize_embedding(embedding: &mut [f32]) {
        let norm_sq: f32 = embedding.iter().map(|x| x * x).sum();
        if norm_sq <= 0.0 {
            return;
        }
        let inv_norm = norm_sq.sqrt().recip();
        for v in embedding.iter_mut() {
            *v *= inv_norm;
        }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.dimensions == 0 {
            return Err(Error::InvalidInput(
                "embedding dimensions must be positive".to_string(),
            ));
        }

        let mut embedding = vec![0.0f32; self.dimensions];
        let words = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .take(MAX_WORDS);
        for word in words {
            Self::distribute_hash(&mut embedding, Self::word_hash(&word.to_lowercase()));
        }
        Self::normalize_embedding(&mut embedding);
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::vector::cosine_similarity;

    #[test]
    fn test_embedding_is_deterministic_and_normalized() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("Use SQLite for storage").unwrap();
        let b = embedder.embed("use sqlite, for storage!").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_shared_words_score_higher() {
        let embedder = HashEmbedder::default();
        let query = embedder.embed("caching strategy").unwrap();
        let related = embedder.embed("Decision Summary: caching strategy with redis").unwrap();
        let unrelated = embedder.embed("Progress: TODO - paint the office walls").unwrap();
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedding = HashEmbedder::new(16).embed("  ").unwrap();
        assert!(embedding.iter().all(|v| *v == 0.0));
        assert!(HashEmbedder::new(0).embed("x").is_err());
    }

    #[test]
    fn test_batch_matches_single() {
        let embedder = HashEmbedder::new(32);
        let batch = embedder.embed_batch(&["a b", "c"]).unwrap();
        assert_eq!(batch[1], embedder.embed("c").unwrap());
    }
}
