use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use siteqa_core::error::Error;
use siteqa_core::traits::Scorer;
use tracing::info;

pub type ScorerLoader = Box<dyn Fn() -> anyhow::Result<Arc<dyn Scorer>> + Send + Sync>;

/// Loads the wrapped scorer on first use, at most once. A failed load is not
/// remembered; the next call tries again.
pub struct LazyScorer {
    loader: ScorerLoader,
    cell: OnceLock<Arc<dyn Scorer>>,
    init: Mutex<()>,
}

impl LazyScorer {
    pub fn new(loader: ScorerLoader) -> Self {
        Self { loader, cell: OnceLock::new(), init: Mutex::new(()) }
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn get(&self) -> anyhow::Result<Arc<dyn Scorer>> {
        if let Some(scorer) = self.cell.get() {
            return Ok(Arc::clone(scorer));
        }
        let _guard = self.init.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(scorer) = self.cell.get() {
            return Ok(Arc::clone(scorer));
        }
        let scorer = (self.loader)().map_err(|e| Error::Scoring(format!("loading reranker: {e:#}")))?;
        info!("reranker model ready");
        Ok(Arc::clone(self.cell.get_or_init(|| scorer)))
    }
}

impl Scorer for LazyScorer {
    fn score_batch(&self, pairs: &[(String, String)]) -> anyhow::Result<Vec<f32>> {
        self.get()?.score_batch(pairs)
    }
}
