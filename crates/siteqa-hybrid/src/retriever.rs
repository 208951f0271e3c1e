//! The retrieval service: owns both indexes and the reranker, builds them
//! lazily, and turns a query into a ranked, relevance-filtered chunk list.
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use siteqa_core::config::{Bm25Settings, Config, Settings};
use siteqa_core::data_processor::DirectoryCorpus;
use siteqa_core::error::Error;
use siteqa_core::traits::{ChunkSource, Embedder, SparseIndex};
use siteqa_core::types::{Chunk, ChunkStore, ScoredChunk};
use siteqa_embed::get_default_embedder;
use siteqa_rerank::{default_reranker, Reranker};
use siteqa_text::Bm25PlusIndex;
use siteqa_vector::{LanceDenseIndex, LanceStore};

use crate::fusion::fuse;
use crate::snapshot::IndexSnapshot;

/// Why a retrieval produced nothing. Callers see the same empty list for
/// every reason; the reason exists for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EmptyReason {
    EmptyQuery,
    EmptyCorpus,
    NoCandidates,
    BelowThreshold,
    /// A stage failed; details went to the log.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Retrieval {
    Found(Vec<ScoredChunk>),
    Empty(EmptyReason),
}

impl Retrieval {
    pub fn into_chunks(self) -> Vec<Chunk> {
        match self {
            Retrieval::Found(scored) => scored.into_iter().map(|s| s.chunk).collect(),
            Retrieval::Empty(_) => Vec::new(),
        }
    }

    pub fn empty_reason(&self) -> Option<EmptyReason> {
        match self {
            Retrieval::Found(_) => None,
            Retrieval::Empty(reason) => Some(*reason),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Retrieval::Found(scored) => scored.len(),
            Retrieval::Empty(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct HybridRetriever {
    source: Box<dyn ChunkSource>,
    embedder: Arc<dyn Embedder>,
    dense_store: LanceStore,
    reranker: Reranker,
    bm25: Bm25Settings,
    candidate_multiplier: usize,
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,
    build_lock: Mutex<()>,
}

impl HybridRetriever {
    pub fn new(
        source: Box<dyn ChunkSource>,
        embedder: Arc<dyn Embedder>,
        dense_store: LanceStore,
        reranker: Reranker,
        settings: &Settings,
    ) -> Self {
        Self {
            source,
            embedder,
            dense_store,
            reranker,
            bm25: settings.sparse,
            candidate_multiplier: settings.retrieval.candidate_multiplier.max(1),
            snapshot: RwLock::new(None),
            build_lock: Mutex::new(()),
        }
    }

    /// Wire the production components from configuration. Nothing is loaded
    /// or built until the first retrieval or rebuild.
    pub fn from_config(config: &Config) -> Result<Self> {
        let settings = config.settings()?;
        let base = config.base_dir();
        Self::from_settings(&settings, base)
    }

    pub fn from_settings(settings: &Settings, base: &Path) -> Result<Self> {
        let source = Box::new(DirectoryCorpus::from_settings(settings, base));
        let embedder: Arc<dyn Embedder> = Arc::from(get_default_embedder(&settings.embedding, base)?);
        let dense_store = LanceStore::from_settings(settings, base)?;
        let reranker = default_reranker(&settings.rerank, base);
        Ok(Self::new(source, embedder, dense_store, reranker, settings))
    }

    /// At most `top_n` chunks, most relevant first. Never fails: every error
    /// is logged and yields an empty list.
    pub fn retrieve(&self, query: &str, top_n: usize) -> Vec<Chunk> {
        self.retrieve_scored(query, top_n).into_chunks()
    }

    #[instrument(skip(self), fields(query_len = query.len()))]
    pub fn retrieve_scored(&self, query: &str, top_n: usize) -> Retrieval {
        if query.trim().is_empty() {
            return Retrieval::Empty(EmptyReason::EmptyQuery);
        }
        if top_n == 0 {
            return Retrieval::Empty(EmptyReason::NoCandidates);
        }
        match catch_unwind(AssertUnwindSafe(|| self.run(query, top_n))) {
            Ok(Ok(retrieval)) => retrieval,
            Ok(Err(e)) => {
                error!(error = %format!("{e:#}"), "retrieval failed; returning empty result");
                Retrieval::Empty(EmptyReason::Degraded)
            }
            Err(_) => {
                error!("retrieval panicked; returning empty result");
                Retrieval::Empty(EmptyReason::Degraded)
            }
        }
    }

    fn run(&self, query: &str, top_n: usize) -> Result<Retrieval> {
        let snapshot = self.current_snapshot()?;
        if snapshot.is_empty() {
            return Ok(Retrieval::Empty(EmptyReason::EmptyCorpus));
        }
        let width = top_n.saturating_mul(self.candidate_multiplier);

        let dense = match self.dense_candidates(&snapshot, query, width) {
            Ok(chunks) => Some(chunks),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "dense retrieval failed; continuing with sparse only");
                None
            }
        };
        let sparse = match snapshot.sparse().search(query, width) {
            Ok(chunks) => Some(chunks),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "sparse retrieval failed; continuing with dense only");
                None
            }
        };
        if dense.is_none() && sparse.is_none() {
            return Err(anyhow!("both retrieval paths failed"));
        }
        let degraded = dense.is_none() || sparse.is_none();
        debug!(
            dense = dense.as_ref().map_or(0, Vec::len),
            sparse = sparse.as_ref().map_or(0, Vec::len),
            "candidates"
        );

        let fused = fuse(dense.unwrap_or_default(), sparse.unwrap_or_default());
        if fused.is_empty() {
            let reason = if degraded { EmptyReason::Degraded } else { EmptyReason::NoCandidates };
            return Ok(Retrieval::Empty(reason));
        }

        let ranked = self.reranker.rerank(query, &fused, top_n)?;
        if ranked.is_empty() {
            return Ok(Retrieval::Empty(EmptyReason::BelowThreshold));
        }
        Ok(Retrieval::Found(ranked))
    }

    fn dense_candidates(&self, snapshot: &IndexSnapshot, query: &str, width: usize) -> Result<Vec<Chunk>> {
        let query_vec = self
            .embedder
            .embed_batch(&[query.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("no vector for query".into()))?;
        snapshot.dense().search_vec(&query_vec, width)
    }

    fn loaded_snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn install(&self, snapshot: Arc<IndexSnapshot>) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }

    /// Replace the serving snapshot. In-flight retrievals finish on the old one.
    pub fn install_snapshot(&self, snapshot: IndexSnapshot) {
        let _guard = self.build_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.install(Arc::new(snapshot));
    }

    /// Corpus version of the serving snapshot, if one is loaded.
    pub fn snapshot_version(&self) -> Option<String> {
        self.loaded_snapshot().map(|s| s.version().to_string())
    }

    fn current_snapshot(&self) -> Result<Arc<IndexSnapshot>> {
        if let Some(snapshot) = self.loaded_snapshot() {
            return Ok(snapshot);
        }
        let _guard = self.build_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(snapshot) = self.loaded_snapshot() {
            return Ok(snapshot);
        }
        let snapshot = Arc::new(self.initial_snapshot()?);
        self.install(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// The persisted index when it is usable, else a full build from the source.
    fn initial_snapshot(&self) -> Result<IndexSnapshot> {
        match self.dense_store.open_active(self.embedder.as_ref()) {
            Ok(dense) => Ok(self.snapshot_from_dense(dense, None)),
            Err(e) => {
                log_unavailable(&e);
                let store = ChunkStore::new(self.source.load_all_chunks()?);
                self.build_snapshot(&store, None)
            }
        }
    }

    fn build_snapshot(&self, store: &ChunkStore, previous: Option<&IndexSnapshot>) -> Result<IndexSnapshot> {
        info!(chunks = store.len(), version = %store.version(), "building indexes");
        let dense = self.dense_store.build(store, self.embedder.as_ref())?;
        Ok(self.snapshot_from_dense(dense, previous))
    }

    /// Sparse statistics come from the dense generation's own chunks, so both
    /// indexes always cover the same set.
    fn snapshot_from_dense(&self, dense: LanceDenseIndex, previous: Option<&IndexSnapshot>) -> IndexSnapshot {
        let version = dense.manifest().corpus_version.clone();
        let sparse: Arc<dyn SparseIndex> = match previous {
            Some(prev) if prev.sparse().version() == version => {
                debug!(version = %version, "reusing sparse index");
                prev.sparse_shared()
            }
            _ => Arc::new(Bm25PlusIndex::from_shared(dense.chunks(), version.as_str(), self.bm25)),
        };
        let len = dense.chunks().len();
        IndexSnapshot::new(Arc::new(dense), sparse, version, len)
    }

    /// Re-read the corpus and swap in fresh indexes.
    ///
    /// Without `force`, an unchanged corpus keeps the serving snapshot, and a
    /// persisted index matching the corpus is reused instead of re-embedding.
    #[instrument(skip(self))]
    pub fn rebuild_index(&self, force: bool) -> Result<()> {
        let _guard = self.build_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.loaded_snapshot();
        let store = ChunkStore::new(self.source.load_all_chunks()?);

        if !force {
            if let Some(cur) = current.as_deref().filter(|c| c.version() == store.version()) {
                info!(version = %cur.version(), "corpus unchanged; keeping current index");
                return Ok(());
            }
            match self.dense_store.open_active(self.embedder.as_ref()) {
                Ok(dense) if dense.manifest().corpus_version == store.version() => {
                    info!(version = %store.version(), "persisted index matches corpus; loading it");
                    self.install(Arc::new(self.snapshot_from_dense(dense, current.as_deref())));
                    return Ok(());
                }
                Ok(_) => debug!("persisted index is stale"),
                Err(e) => log_unavailable(&e),
            }
        }

        let snapshot = self.build_snapshot(&store, current.as_deref())?;
        self.install(Arc::new(snapshot));
        info!(version = %store.version(), chunks = store.len(), "index rebuilt");
        Ok(())
    }
}

fn log_unavailable(e: &anyhow::Error) {
    match e.downcast_ref::<Error>() {
        Some(Error::IndexUnavailable { reason, detail }) => {
            info!(%reason, %detail, "persisted index unavailable; rebuilding");
        }
        _ => warn!(error = %format!("{e:#}"), "failed to open persisted index; rebuilding"),
    }
}
