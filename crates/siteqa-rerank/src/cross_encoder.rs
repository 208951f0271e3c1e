//! XLM-RoBERTa cross-encoder: `(query, passage)` in one sequence, one logit out.
use anyhow::{anyhow, Result};
use candle_core::{Device, D};
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaForSequenceClassification};
use std::path::Path;
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use siteqa_core::traits::Scorer;
use siteqa_embed::{device, tokenize, weights};

/// Token cap for a `(query, passage)` pair.
pub const MAX_PAIR_TOKENS: usize = 512;

pub struct CrossEncoder {
    model: XLMRobertaForSequenceClassification,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
    /// Column of the logits holding the relevance score.
    relevant_label: usize,
}

impl CrossEncoder {
    pub fn load(model_dir: &Path) -> Result<Self> {
        let device = device::select_device();
        info!(dir = %model_dir.display(), "loading cross-encoder");
        let tokenizer = tokenize::load_tokenizer(model_dir)?;
        let raw_config = weights::read_model_config(model_dir)?;
        let num_labels = num_labels(&raw_config);
        let max_positions = raw_config
            .get("max_position_embeddings")
            .and_then(serde_json::Value::as_u64)
            .map_or(MAX_PAIR_TOKENS, |n| (n as usize).saturating_sub(2).max(1));
        let config: XLMRobertaConfig = serde_json::from_value(raw_config)?;
        let vb = weights::load_var_builder(model_dir, &device)?;
        let model = XLMRobertaForSequenceClassification::new(num_labels, &config, vb)?;
        // two-way heads put "relevant" at index 1; single-logit heads score directly
        let relevant_label = if num_labels >= 2 { 1 } else { 0 };
        info!(num_labels, "cross-encoder loaded");
        Ok(Self { model, tokenizer, device, max_len: MAX_PAIR_TOKENS.min(max_positions), relevant_label })
    }

    /// Try `primary`, then `fallback`. The error names both failures.
    pub fn load_with_fallback(primary: &Path, fallback: Option<&Path>) -> Result<Self> {
        match Self::load(primary) {
            Ok(model) => Ok(model),
            Err(primary_err) => {
                let Some(fallback) = fallback else { return Err(primary_err) };
                warn!(dir = %primary.display(), error = %primary_err, "primary cross-encoder failed to load; trying fallback");
                Self::load(fallback).map_err(|fallback_err| {
                    anyhow!("cross-encoder unavailable: primary: {primary_err:#}; fallback: {fallback_err:#}")
                })
            }
        }
    }
}

fn num_labels(raw: &serde_json::Value) -> usize {
    raw.get("id2label")
        .and_then(serde_json::Value::as_object)
        .map(|m| m.len())
        .or_else(|| raw.get("num_labels").and_then(serde_json::Value::as_u64).map(|n| n as usize))
        .unwrap_or(1)
        .max(1)
}

impl Scorer for CrossEncoder {
    fn score_batch(&self, pairs: &[(String, String)]) -> Result<Vec<f32>> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        let inputs = tokenize::tokenize_pairs(&self.tokenizer, pairs, self.max_len, &self.device)?;
        let logits = self.model.forward(&inputs.input_ids, &inputs.attention_mask, &inputs.token_type_ids)?;
        let column = logits.narrow(D::Minus1, self.relevant_label, 1)?.squeeze(D::Minus1)?;
        let scores: Vec<f32> = column.to_device(&Device::Cpu)?.to_vec1()?;
        debug!(pairs = pairs.len(), "scored batch");
        Ok(scores)
    }
}
