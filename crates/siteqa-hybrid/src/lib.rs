//! siteqa-hybrid
//!
//! Hybrid retrieval: dense and BM25+ candidates fused by content, reranked,
//! and served from an atomically swappable index snapshot.

pub mod context;
pub mod fusion;
pub mod retriever;
pub mod snapshot;

pub use context::{build_context, format_sources, not_found_reply, Language, NO_RESULTS_MESSAGE};
pub use fusion::fuse;
pub use retriever::{EmptyReason, HybridRetriever, Retrieval};
pub use snapshot::IndexSnapshot;
