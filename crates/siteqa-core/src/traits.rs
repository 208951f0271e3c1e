use crate::types::Chunk;

/// Deterministic `text -> vector` function.
pub trait Embedder: Send + Sync {
    /// Stable identity of the model; a persisted index built under another id is rejected.
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Pairwise `(query, passage) -> relevance` model. One score per pair, same order.
pub trait Scorer: Send + Sync {
    fn score_batch(&self, pairs: &[(String, String)]) -> anyhow::Result<Vec<f32>>;
}

/// Upstream producer of the chunk set (scraper + pdf extraction + chunking).
pub trait ChunkSource: Send + Sync {
    fn load_all_chunks(&self) -> anyhow::Result<Vec<Chunk>>;
}

/// Nearest-neighbour search over normalized chunk embeddings.
pub trait DenseIndex: Send + Sync {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Up to `k` chunks, descending cosine similarity.
    fn search_vec(&self, query_vec: &[f32], k: usize) -> anyhow::Result<Vec<Chunk>>;
}

/// Lexical search over the same chunk set as the dense index.
pub trait SparseIndex: Send + Sync {
    /// Corpus version the statistics were computed from.
    fn version(&self) -> &str;
    /// Up to `k` chunks, descending lexical score.
    fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<Chunk>>;
}
