//! siteqa-rerank
//!
//! Second-stage ranking of fused candidates with a pairwise relevance model.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use siteqa_core::config::{resolve_with_base, RerankSettings};
use siteqa_core::traits::Scorer;

pub mod cross_encoder;
pub mod lazy;
pub mod lexical;
pub mod reranker;

pub use cross_encoder::CrossEncoder;
pub use lazy::{LazyScorer, ScorerLoader};
pub use lexical::LexicalScorer;
pub use reranker::Reranker;

pub const DEFAULT_MODEL_DIR: &str = "models/mmarco-mMiniLMv2-L12-H384-v1";

pub fn use_fake_reranker() -> bool {
    std::env::var("APP_USE_FAKE_RERANKER").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// Loader for the configured scorer: the lexical scorer when
/// `APP_USE_FAKE_RERANKER` is set, else the cross-encoder with its fallback.
pub fn get_default_scorer_loader(settings: &RerankSettings, base_dir: &Path) -> ScorerLoader {
    if use_fake_reranker() {
        return Box::new(|| {
            info!("using lexical scorer");
            Ok(Arc::new(LexicalScorer) as Arc<dyn Scorer>)
        });
    }
    let primary: PathBuf = resolve_with_base(base_dir, settings.model_dir.as_deref().unwrap_or(DEFAULT_MODEL_DIR));
    let fallback: Option<PathBuf> = settings.fallback_model_dir.as_deref().map(|d| resolve_with_base(base_dir, d));
    Box::new(move || Ok(Arc::new(CrossEncoder::load_with_fallback(&primary, fallback.as_deref())?) as Arc<dyn Scorer>))
}

/// A reranker whose model loads on the first non-empty rerank call.
pub fn default_reranker(settings: &RerankSettings, base_dir: &Path) -> Reranker {
    let lazy = LazyScorer::new(get_default_scorer_loader(settings, base_dir));
    Reranker::new(Arc::new(lazy), settings)
}
