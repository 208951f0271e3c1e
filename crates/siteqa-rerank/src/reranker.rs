use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, instrument};

use siteqa_core::config::RerankSettings;
use siteqa_core::error::Error;
use siteqa_core::traits::Scorer;
use siteqa_core::types::{Candidate, ScoredChunk};

/// Reorders fused candidates by pairwise relevance to the query.
pub struct Reranker {
    scorer: Arc<dyn Scorer>,
    batch_size: usize,
    max_content_chars: usize,
    threshold: Option<f32>,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn Scorer>, settings: &RerankSettings) -> Self {
        Self {
            scorer,
            batch_size: settings.batch_size.max(1),
            max_content_chars: settings.max_content_chars.max(1),
            threshold: settings.relevance_threshold,
        }
    }

    pub fn threshold(&self) -> Option<f32> {
        self.threshold
    }

    /// Score every candidate, keep the best `top_n` (ties keep candidate
    /// order), then drop those under the threshold. Scores are computed on
    /// truncated text; returned chunks carry their full content.
    ///
    /// An empty candidate list returns without touching the scorer.
    #[instrument(skip_all, fields(candidates = candidates.len(), top_n))]
    pub fn rerank(&self, query: &str, candidates: &[Candidate], top_n: usize) -> Result<Vec<ScoredChunk>> {
        if candidates.is_empty() || top_n == 0 {
            return Ok(Vec::new());
        }
        let pairs: Vec<(String, String)> = candidates
            .iter()
            .map(|c| (query.to_string(), truncate_chars(&c.chunk.content, self.max_content_chars).to_string()))
            .collect();

        let mut scores = Vec::with_capacity(pairs.len());
        for batch in pairs.chunks(self.batch_size) {
            let batch_scores = self.scorer.score_batch(batch)?;
            if batch_scores.len() != batch.len() {
                return Err(Error::Scoring(format!("scorer returned {} scores for {} pairs", batch_scores.len(), batch.len())).into());
            }
            scores.extend(batch_scores);
        }

        let mut ranked: Vec<(usize, f32)> = scores
            .into_iter()
            .map(|s| if s.is_nan() { f32::NEG_INFINITY } else { s })
            .enumerate()
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(top_n);

        let kept: Vec<ScoredChunk> = ranked
            .into_iter()
            .filter(|(_, s)| self.threshold.map_or(true, |t| *s >= t))
            .map(|(i, score)| ScoredChunk { chunk: candidates[i].chunk.clone(), score })
            .collect();
        debug!(kept = kept.len(), "reranked");
        Ok(kept)
    }
}

/// The first `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
