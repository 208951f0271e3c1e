use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use siteqa_core::config::{RerankSettings, RetrievalSettings, Settings};
use siteqa_core::traits::{ChunkSource, DenseIndex, Embedder, Scorer, SparseIndex};
use siteqa_core::types::{Chunk, ChunkStore};
use siteqa_embed::HashEmbedder;
use siteqa_hybrid::{EmptyReason, HybridRetriever, IndexSnapshot, Retrieval};
use siteqa_rerank::{LexicalScorer, Reranker};
use siteqa_vector::LanceStore;

/// In-memory corpus that can be swapped between builds and counts loads.
#[derive(Clone, Default)]
struct VecSource {
    chunks: Arc<Mutex<Vec<Chunk>>>,
    loads: Arc<AtomicUsize>,
}

impl VecSource {
    fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks: Arc::new(Mutex::new(chunks)), loads: Arc::default() }
    }

    fn replace(&self, chunks: Vec<Chunk>) {
        *self.chunks.lock().unwrap() = chunks;
    }

    fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ChunkSource for VecSource {
    fn load_all_chunks(&self) -> anyhow::Result<Vec<Chunk>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.chunks.lock().unwrap().clone())
    }
}

/// Hash embedder that can be made to fail after the index is built.
struct SwitchableEmbedder {
    inner: HashEmbedder,
    fail: AtomicBool,
}

impl Embedder for SwitchableEmbedder {
    fn model_id(&self) -> &str { self.inner.model_id() }
    fn dim(&self) -> usize { self.inner.dim() }
    fn max_len(&self) -> usize { self.inner.max_len() }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("embedding service down");
        }
        self.inner.embed_batch(texts)
    }
}

#[derive(Default)]
struct CountingScorer {
    calls: AtomicUsize,
}

impl Scorer for CountingScorer {
    fn score_batch(&self, pairs: &[(String, String)]) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        LexicalScorer.score_batch(pairs)
    }
}

struct FailingScorer;

impl Scorer for FailingScorer {
    fn score_batch(&self, _pairs: &[(String, String)]) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("reranker weights corrupt")
    }
}

struct PanickingScorer;

impl Scorer for PanickingScorer {
    fn score_batch(&self, _pairs: &[(String, String)]) -> anyhow::Result<Vec<f32>> {
        panic!("tensor shape mismatch")
    }
}

/// Scores by the first number found in the passage.
struct NumberScorer;

impl Scorer for NumberScorer {
    fn score_batch(&self, pairs: &[(String, String)]) -> anyhow::Result<Vec<f32>> {
        Ok(pairs
            .iter()
            .map(|(_, p)| p.split_whitespace().find_map(|w| w.parse::<f32>().ok()).unwrap_or(0.0))
            .collect())
    }
}

struct FailingSparse;

impl SparseIndex for FailingSparse {
    fn version(&self) -> &str { "broken" }
    fn search(&self, _query: &str, _k: usize) -> anyhow::Result<Vec<Chunk>> {
        anyhow::bail!("sparse index unreadable")
    }
}

struct FailingDense;

impl DenseIndex for FailingDense {
    fn len(&self) -> usize { 1 }
    fn search_vec(&self, _query_vec: &[f32], _k: usize) -> anyhow::Result<Vec<Chunk>> {
        anyhow::bail!("dense index unreadable")
    }
}

const DIM: usize = 64;

fn practice_corpus() -> Vec<Chunk> {
    vec![
        Chunk::web("www.functiomed.ch_kontakt", "Our practice is located in Zurich near the main station."),
        Chunk::web("www.functiomed.ch_zeiten", "Opening hours Monday to Friday 8am-6pm."),
        Chunk::pdf("flyer", 0, "Physiotherapy and osteopathy for patients of all ages."),
    ]
}

fn retriever_with(
    root: &Path,
    source: VecSource,
    embedder: Arc<dyn Embedder>,
    scorer: Arc<dyn Scorer>,
) -> anyhow::Result<HybridRetriever> {
    let settings = Settings::default();
    let store = LanceStore::new(root, "chunks", settings.dense.ann_min_rows)?;
    let reranker = Reranker::new(scorer, &settings.rerank);
    Ok(HybridRetriever::new(Box::new(source), embedder, store, reranker, &settings))
}

fn retriever(root: &Path, source: VecSource) -> anyhow::Result<HybridRetriever> {
    retriever_with(root, source, Arc::new(HashEmbedder::new(DIM)), Arc::new(LexicalScorer))
}

fn contents(chunks: &[Chunk]) -> Vec<&str> {
    chunks.iter().map(|c| c.content.as_str()).collect()
}

#[test]
fn opening_hours_question_finds_the_opening_hours_chunk() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let r = retriever(tmp.path(), VecSource::new(practice_corpus()))?;
    let out = r.retrieve("What are your opening hours?", 1);
    assert_eq!(contents(&out), vec!["Opening hours Monday to Friday 8am-6pm."]);
    Ok(())
}

#[test]
fn result_never_exceeds_top_n_or_candidate_count() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let r = retriever(tmp.path(), VecSource::new(practice_corpus()))?;
    for top_n in [1, 2, 5, 50] {
        let out = r.retrieve("practice opening hours physiotherapy", top_n);
        assert!(out.len() <= top_n);
        assert!(out.len() <= practice_corpus().len());
    }
    Ok(())
}

#[test]
fn blank_queries_return_nothing_without_scoring() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let scorer = Arc::new(CountingScorer::default());
    let r = retriever_with(tmp.path(), VecSource::new(practice_corpus()), Arc::new(HashEmbedder::new(DIM)), scorer.clone())?;

    assert!(r.retrieve("", 5).is_empty());
    assert_eq!(r.retrieve_scored("   ", 5), Retrieval::Empty(EmptyReason::EmptyQuery));
    assert_eq!(scorer.calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[test]
fn empty_corpus_returns_nothing() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let r = retriever(tmp.path(), VecSource::new(Vec::new()))?;
    assert!(r.retrieve("anything", 5).is_empty());
    assert_eq!(r.retrieve_scored("anything", 5).empty_reason(), Some(EmptyReason::EmptyCorpus));
    Ok(())
}

#[test]
fn zero_top_n_returns_nothing() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let r = retriever(tmp.path(), VecSource::new(practice_corpus()))?;
    assert!(r.retrieve("opening hours", 0).is_empty());
    Ok(())
}

#[test]
fn repeated_calls_are_identical() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let r = retriever(tmp.path(), VecSource::new(practice_corpus()))?;
    let first = r.retrieve_scored("physiotherapy in Zurich", 3);
    let second = r.retrieve_scored("physiotherapy in Zurich", 3);
    assert!(!first.is_empty());
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn near_duplicates_return_exactly_top_n_in_score_order() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let corpus: Vec<Chunk> = (0..10)
        .map(|i| Chunk::web(format!("massage_{i}"), format!("Massage therapy session number {i} available")))
        .collect();
    // wide enough that every chunk reaches the reranker
    let settings = Settings {
        retrieval: RetrievalSettings { candidate_multiplier: 4, ..RetrievalSettings::default() },
        ..Settings::default()
    };
    let store = LanceStore::new(tmp.path(), "chunks", settings.dense.ann_min_rows)?;
    let reranker = Reranker::new(Arc::new(NumberScorer), &settings.rerank);
    let r = HybridRetriever::new(Box::new(VecSource::new(corpus)), Arc::new(HashEmbedder::new(DIM)), store, reranker, &settings);

    let Retrieval::Found(scored) = r.retrieve_scored("massage therapy session", 3) else {
        panic!("expected results");
    };
    assert_eq!(scored.len(), 3);
    for pair in scored.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    let got: Vec<&str> = scored.iter().map(|s| s.chunk.content.as_str()).collect();
    assert_eq!(
        got,
        vec![
            "Massage therapy session number 9 available",
            "Massage therapy session number 8 available",
            "Massage therapy session number 7 available",
        ]
    );
    assert_eq!(scored.iter().map(|s| s.score).collect::<Vec<_>>(), vec![9.0, 8.0, 7.0]);
    Ok(())
}

#[test]
fn reranker_failure_degrades_to_empty() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let r = retriever_with(tmp.path(), VecSource::new(practice_corpus()), Arc::new(HashEmbedder::new(DIM)), Arc::new(FailingScorer))?;
    assert!(r.retrieve("opening hours", 3).is_empty());
    assert_eq!(r.retrieve_scored("opening hours", 3), Retrieval::Empty(EmptyReason::Degraded));
    Ok(())
}

#[test]
fn reranker_panic_degrades_to_empty() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let r = retriever_with(tmp.path(), VecSource::new(practice_corpus()), Arc::new(HashEmbedder::new(DIM)), Arc::new(PanickingScorer))?;
    assert_eq!(r.retrieve_scored("opening hours", 3), Retrieval::Empty(EmptyReason::Degraded));
    // the retriever stays usable afterwards
    assert_eq!(r.retrieve_scored("", 3), Retrieval::Empty(EmptyReason::EmptyQuery));
    Ok(())
}

#[test]
fn threshold_can_filter_everything() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let settings = Settings {
        rerank: RerankSettings { relevance_threshold: Some(0.9), ..RerankSettings::default() },
        ..Settings::default()
    };
    let store = LanceStore::new(tmp.path(), "chunks", settings.dense.ann_min_rows)?;
    let reranker = Reranker::new(Arc::new(LexicalScorer), &settings.rerank);
    let r = HybridRetriever::new(
        Box::new(VecSource::new(practice_corpus())),
        Arc::new(HashEmbedder::new(DIM)),
        store,
        reranker,
        &settings,
    );
    assert_eq!(
        r.retrieve_scored("opening hours for the sauna", 3),
        Retrieval::Empty(EmptyReason::BelowThreshold)
    );
    Ok(())
}

#[test]
fn failing_embedder_falls_back_to_sparse_results() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let embedder = Arc::new(SwitchableEmbedder { inner: HashEmbedder::new(DIM), fail: AtomicBool::new(false) });
    let r = retriever_with(tmp.path(), VecSource::new(practice_corpus()), embedder.clone(), Arc::new(LexicalScorer))?;
    r.rebuild_index(true)?;

    embedder.fail.store(true, Ordering::SeqCst);
    let out = r.retrieve("opening hours", 1);
    assert_eq!(contents(&out), vec!["Opening hours Monday to Friday 8am-6pm."]);
    Ok(())
}

#[test]
fn failing_sparse_index_falls_back_to_dense_results() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let embedder = HashEmbedder::new(DIM);
    let store = ChunkStore::new(practice_corpus());
    let dense = LanceStore::new(tmp.path().join("side"), "chunks", 5000)?.build(&store, &embedder)?;

    let r = retriever(&tmp.path().join("main"), VecSource::new(Vec::new()))?;
    r.install_snapshot(IndexSnapshot::new(Arc::new(dense), Arc::new(FailingSparse), store.version(), store.len()));
    let out = r.retrieve("physiotherapy osteopathy", 1);
    assert_eq!(contents(&out), vec!["Physiotherapy and osteopathy for patients of all ages."]);
    Ok(())
}

#[test]
fn both_paths_failing_degrades_to_empty() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let r = retriever(tmp.path(), VecSource::new(Vec::new()))?;
    r.install_snapshot(IndexSnapshot::new(Arc::new(FailingDense), Arc::new(FailingSparse), "v", 1));
    assert_eq!(r.retrieve_scored("opening hours", 3), Retrieval::Empty(EmptyReason::Degraded));
    Ok(())
}

#[test]
fn persisted_index_is_served_without_reloading_the_corpus() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    retriever(tmp.path(), VecSource::new(practice_corpus()))?.rebuild_index(true)?;

    let source = VecSource::new(Vec::new());
    let r = retriever(tmp.path(), source.clone())?;
    assert!(r.snapshot_version().is_none(), "nothing loads before first use");
    let out = r.retrieve("opening hours", 1);
    assert_eq!(contents(&out), vec!["Opening hours Monday to Friday 8am-6pm."]);
    assert_eq!(source.loads(), 0);
    Ok(())
}

#[test]
fn other_embedder_triggers_rebuild_from_source() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    retriever(tmp.path(), VecSource::new(vec![Chunk::web("old", "stale content only")]))?.rebuild_index(true)?;

    let source = VecSource::new(practice_corpus());
    let r = retriever_with(tmp.path(), source.clone(), Arc::new(HashEmbedder::new(DIM * 2)), Arc::new(LexicalScorer))?;
    let out = r.retrieve("opening hours", 1);
    assert_eq!(contents(&out), vec!["Opening hours Monday to Friday 8am-6pm."]);
    assert_eq!(source.loads(), 1);
    Ok(())
}

#[test]
fn rebuild_swaps_in_the_new_corpus() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let source = VecSource::new(practice_corpus());
    let r = retriever(tmp.path(), source.clone())?;
    assert!(!r.retrieve("opening hours", 3).is_empty());
    let before = r.snapshot_version();

    source.replace(vec![Chunk::web("sauna", "The sauna opens on Saturdays.")]);
    assert!(
        r.retrieve("sauna saturdays", 3).iter().all(|c| !c.content.contains("sauna")),
        "the serving snapshot is kept until a rebuild"
    );

    r.rebuild_index(false)?;
    assert_ne!(r.snapshot_version(), before);
    assert_eq!(contents(&r.retrieve("sauna saturdays", 3)), vec!["The sauna opens on Saturdays."]);
    assert!(r.retrieve("physiotherapy osteopathy", 3).iter().all(|c| !c.content.contains("osteopathy")));
    Ok(())
}

#[test]
fn unforced_rebuild_of_unchanged_corpus_keeps_the_generation() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let r = retriever(tmp.path(), VecSource::new(practice_corpus()))?;
    let inspect = LanceStore::new(tmp.path(), "chunks", 5000)?;

    r.rebuild_index(true)?;
    let first = inspect.generations();
    assert_eq!(first.len(), 1);

    r.rebuild_index(false)?;
    assert_eq!(inspect.generations(), first);

    r.rebuild_index(true)?;
    r.rebuild_index(true)?;
    let after = inspect.generations();
    assert_eq!(after.len(), 2, "current and previous generation are kept");
    assert!(!after.contains(&first[0]));
    Ok(())
}

#[test]
fn concurrent_first_use_builds_once() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let source = VecSource::new(practice_corpus());
    let r = Arc::new(retriever(tmp.path(), source.clone())?);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let r = Arc::clone(&r);
            std::thread::spawn(move || r.retrieve("What are your opening hours?", 2))
        })
        .collect();
    let results: Vec<Vec<Chunk>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(source.loads(), 1);
    for out in &results {
        assert_eq!(out, &results[0]);
    }
    assert_eq!(results[0][0].content, "Opening hours Monday to Friday 8am-6pm.");
    Ok(())
}

#[test]
fn from_settings_wires_the_directory_corpus() -> anyhow::Result<()> {
    std::env::set_var("APP_USE_FAKE_EMBEDDINGS", "1");
    std::env::set_var("APP_USE_FAKE_RERANKER", "1");
    let tmp = tempfile::tempdir()?;
    let text_dir = tmp.path().join("data/clean_text");
    std::fs::create_dir_all(&text_dir)?;
    std::fs::write(text_dir.join("www.functiomed.ch_zeiten.txt"), "Opening hours Monday to Friday 8am-6pm.")?;
    std::fs::write(text_dir.join("pdf__preise.txt"), "Massage 60 minutes 120 CHF.\x0cGift vouchers available.")?;

    let r = HybridRetriever::from_settings(&Settings::default(), tmp.path())?;
    let out = r.retrieve("massage price", 1);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].content, "Massage 60 minutes 120 CHF.");
    assert_eq!(out[0].source_name(), Some("preise"));
    assert!(tmp.path().join("data/lance_index/manifest.json").exists());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn retrieval_works_from_inside_an_async_handler() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let r = retriever(tmp.path(), VecSource::new(practice_corpus()))?;
    let Retrieval::Found(scored) = r.retrieve_scored("What are your opening hours?", 1) else {
        panic!("expected results");
    };
    assert_eq!(scored[0].chunk.content, "Opening hours Monday to Friday 8am-6pm.");
    Ok(())
}

#[test]
fn current_thread_runtime_falls_back_to_sparse_results() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let r = retriever(tmp.path(), VecSource::new(practice_corpus()))?;
    r.rebuild_index(true)?;

    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let out = rt.block_on(async { r.retrieve_scored("What are your opening hours?", 1) });
    assert_eq!(contents(&out.into_chunks()), vec!["Opening hours Monday to Friday 8am-6pm."]);
    Ok(())
}
