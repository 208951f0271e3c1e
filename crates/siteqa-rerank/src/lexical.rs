use std::collections::HashSet;

use siteqa_core::traits::Scorer;

/// Share of the query's distinct terms that occur in the passage, in `[0, 1]`.
/// Deterministic and model-free.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalScorer;

fn terms(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

impl LexicalScorer {
    pub fn score(query: &str, passage: &str) -> f32 {
        let q = terms(query);
        if q.is_empty() {
            return 0.0;
        }
        let p = terms(passage);
        q.iter().filter(|t| p.contains(*t)).count() as f32 / q.len() as f32
    }
}

impl Scorer for LexicalScorer {
    fn score_batch(&self, pairs: &[(String, String)]) -> anyhow::Result<Vec<f32>> {
        Ok(pairs.iter().map(|(q, p)| Self::score(q, p)).collect())
    }
}
