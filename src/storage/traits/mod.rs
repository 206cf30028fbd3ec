//! Index backend traits.

mod index;
mod vector;

pub use index::LexicalIndex;
pub use vector::VectorIndex;
