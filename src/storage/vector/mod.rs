//! Similarity index implementations.

mod flat;

pub use flat::{DEFAULT_DIMENSIONS, FlatVectorIndex, cosine_similarity};
