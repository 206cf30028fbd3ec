//! Lexical index implementations.

mod sqlite;

pub use sqlite::{SqliteLexicalIndex, build_fts_query};
