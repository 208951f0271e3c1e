//! siteqa-vector
//!
//! Dense side of hybrid retrieval: chunk embeddings in a LanceDB table, one
//! table per build generation, selected by a JSON manifest.
pub mod index_build;
pub mod manifest;
mod runtime;
pub mod schema;
pub mod search;
pub mod store;
pub mod writer;

pub use manifest::Manifest;
pub use search::LanceDenseIndex;
pub use store::LanceStore;
