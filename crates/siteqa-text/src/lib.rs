//! siteqa-text
//!
//! Lexical side of hybrid retrieval: a tantivy analysis pipeline feeding an
//! in-memory BM25+ index over the chunk store.
pub mod tantivy_utils;
pub mod bm25;

pub use bm25::Bm25PlusIndex;
