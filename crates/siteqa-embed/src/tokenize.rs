use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use std::path::Path;
use tokenizers::{Encoding, Tokenizer};

/// `<pad>` in the XLM-RoBERTa vocabulary.
pub const PAD_ID: u32 = 1;

/// Model inputs for one padded batch, each `[B, T]`.
pub struct BatchInputs {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub token_type_ids: Tensor,
}

pub fn load_tokenizer(model_dir: &Path) -> Result<Tokenizer> {
    let tokenizer_path = model_dir.join("tokenizer.json");
    Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))
}

pub fn tokenize_batch(tokenizer: &Tokenizer, texts: &[String], max_len: usize, device: &Device) -> Result<BatchInputs> {
    let encodings = tokenizer
        .encode_batch(texts.to_vec(), true)
        .map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    to_inputs(&encodings, max_len, device)
}

/// Encode `(query, passage)` pairs as one sequence each, with the tokenizer's pair template.
pub fn tokenize_pairs(tokenizer: &Tokenizer, pairs: &[(String, String)], max_len: usize, device: &Device) -> Result<BatchInputs> {
    let encodings = tokenizer
        .encode_batch(pairs.to_vec(), true)
        .map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    to_inputs(&encodings, max_len, device)
}

fn to_inputs(encodings: &[Encoding], max_len: usize, device: &Device) -> Result<BatchInputs> {
    let rows: Vec<&[u32]> = encodings.iter().map(|e| e.get_ids()).collect();
    let (ids, mask, width) = pad_to_longest(&rows, max_len);
    let batch = rows.len();
    let input_ids = Tensor::from_vec(ids, (batch, width), device)?;
    let attention_mask = Tensor::from_vec(mask, (batch, width), device)?;
    let token_type_ids = input_ids.zeros_like()?;
    Ok(BatchInputs { input_ids, attention_mask, token_type_ids })
}

/// Row-major ids and mask padded to the longest row, capped at `max_len`.
/// Returns `(ids, mask, width)`.
pub fn pad_to_longest(rows: &[&[u32]], max_len: usize) -> (Vec<u32>, Vec<u32>, usize) {
    let width = rows.iter().map(|r| r.len()).max().unwrap_or(0).min(max_len).max(1);
    let mut ids = Vec::with_capacity(rows.len() * width);
    let mut mask = Vec::with_capacity(rows.len() * width);
    for row in rows {
        let len = row.len().min(width);
        ids.extend_from_slice(&row[..len]);
        mask.extend(std::iter::repeat(1).take(len));
        ids.extend(std::iter::repeat(PAD_ID).take(width - len));
        mask.extend(std::iter::repeat(0).take(width - len));
    }
    (ids, mask, width)
}
