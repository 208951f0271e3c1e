use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{Device, Tensor};
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use siteqa_core::config::{resolve_with_base, EmbeddingSettings};
use siteqa_core::error::Error;
use siteqa_core::traits::Embedder;

pub mod device;
pub mod pool;
pub mod tokenize;
pub mod weights;

pub use pool::masked_mean_l2;

/// Sentence encoder: XLM-RoBERTa hidden states, masked mean pooling, L2 norm.
pub struct EmbeddingModel {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    dim: usize,
    max_len: usize,
    batch_size: usize,
}

impl EmbeddingModel {
    pub fn load(model_dir: &Path, settings: &EmbeddingSettings) -> Result<Self> {
        let device = device::select_device();
        info!(model = %settings.model_id, dir = %model_dir.display(), "loading embedding model");
        let tokenizer = tokenize::load_tokenizer(model_dir)?;
        let raw_config = weights::read_model_config(model_dir)?;
        let dim = raw_config
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| anyhow!("config.json has no hidden_size"))? as usize;
        let config: XLMRobertaConfig = serde_json::from_value(raw_config)?;
        let vb = weights::load_var_builder(model_dir, &device)?;
        // sentence-transformers exports drop the `roberta.` prefix; full checkpoints keep it
        let vb = if vb.contains_tensor("roberta.embeddings.word_embeddings.weight") { vb.pp("roberta") } else { vb };
        let model = XLMRobertaModel::new(&config, vb)?;
        info!(model = %settings.model_id, dim, "embedding model loaded");
        Ok(Self {
            model,
            tokenizer,
            device,
            model_id: settings.model_id.clone(),
            dim,
            max_len: settings.max_len,
            batch_size: settings.batch_size.max(1),
        })
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inputs = tokenize::tokenize_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let hidden = self.model.forward(&inputs.input_ids, &inputs.attention_mask, &inputs.token_type_ids, None, None, None)?;
        let pooled: Tensor = masked_mean_l2(&hidden, &inputs.attention_mask)?;
        let rows: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        Ok(rows)
    }
}

impl Embedder for EmbeddingModel {
    fn model_id(&self) -> &str { &self.model_id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let rows = self.embed_chunk(chunk).map_err(|e| Error::Embedding(e.to_string()))?;
            out.extend(rows);
        }
        debug!(texts = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "embedded batch");
        Ok(out)
    }
}

/// Deterministic bag-of-words embedder: each lowercased alphanumeric token is
/// hashed into one of `dim` buckets. No model files needed.
pub struct HashEmbedder {
    dim: usize,
    model_id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1), model_id: format!("hash-embedder-{dim}") }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        let lowered = text.to_lowercase();
        for token in lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            v[idx] += 0.5 + (((h >> 32) as u32) as f32) / (u32::MAX as f32);
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str { &self.model_id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

pub const FAKE_EMBEDDING_DIM: usize = 384;

pub fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

pub fn get_default_embedder(settings: &EmbeddingSettings, base_dir: &Path) -> Result<Box<dyn Embedder>> {
    if use_fake_embeddings() {
        info!(dim = FAKE_EMBEDDING_DIM, "using hash embedder");
        return Ok(Box::new(HashEmbedder::new(FAKE_EMBEDDING_DIM)));
    }
    let model_dir = resolve_model_dir(settings, base_dir)?;
    Ok(Box::new(EmbeddingModel::load(&model_dir, settings)?))
}

/// Configured `embedding.model_dir`, then `APP_MODEL_DIR`, then `models/<model_id>`.
pub fn resolve_model_dir(settings: &EmbeddingSettings, base_dir: &Path) -> Result<PathBuf> {
    if let Some(dir) = &settings.model_dir {
        let p = resolve_with_base(base_dir, dir);
        if p.exists() { return Ok(p); }
        warn!(dir = %p.display(), "configured embedding model_dir does not exist");
    }
    if let Ok(dir) = std::env::var("APP_MODEL_DIR") {
        let p = PathBuf::from(&dir);
        if p.exists() { return Ok(p); }
    }
    let default = base_dir.join("models").join(&settings.model_id);
    if default.exists() { return Ok(default); }
    Err(anyhow!("Could not locate embedding model directory for {}", settings.model_id))
}
