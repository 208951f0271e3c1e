use anyhow::Result;
use arrow_array::{FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::{Connection, Table};
use std::sync::Arc;
use tracing::info;

use siteqa_core::error::Error;
use siteqa_core::traits::Embedder;
use siteqa_core::types::Chunk;

use crate::schema::build_arrow_schema;

const EMBED_BATCH: usize = 64;

/// Embed every chunk, checking count and dimensionality of what comes back.
pub fn embed_chunks(chunks: &[Chunk], embedder: &dyn Embedder) -> Result<Vec<Vec<f32>>> {
	let dim = embedder.dim();
	let pb = ProgressBar::new(chunks.len() as u64);
	pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")?.progress_chars("#>-"));
	let mut embeddings = Vec::with_capacity(chunks.len());
	for batch in chunks.chunks(EMBED_BATCH) {
		let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
		let vecs = embedder.embed_batch(&texts)?;
		if vecs.len() != texts.len() {
			return Err(Error::Embedding(format!("embedder returned {} vectors for {} texts", vecs.len(), texts.len())).into());
		}
		if let Some(bad) = vecs.iter().find(|v| v.len() != dim) {
			return Err(Error::Embedding(format!("embedder returned dim {} (expected {dim})", bad.len())).into());
		}
		embeddings.extend(vecs);
		pb.inc(batch.len() as u64);
	}
	pb.finish_and_clear();
	Ok(embeddings)
}

fn chunks_to_record_batch(chunks: &[Chunk], embeddings: &[Vec<f32>], dim: i32) -> Result<RecordBatch> {
	let schema = build_arrow_schema(dim);
	let mut ordinals = Vec::with_capacity(chunks.len());
	let mut contents = Vec::with_capacity(chunks.len());
	let mut metadata = Vec::with_capacity(chunks.len());
	let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(chunks.len());
	for (i, (chunk, embedding)) in chunks.iter().zip(embeddings).enumerate() {
		ordinals.push(i as i32);
		contents.push(chunk.content.clone());
		metadata.push(serde_json::to_string(&chunk.metadata)?);
		vectors.push(Some(embedding.iter().map(|&x| Some(x)).collect()));
	}
	let record_batch = RecordBatch::try_new(schema, vec![
		Arc::new(Int32Array::from(ordinals)),
		Arc::new(StringArray::from(contents)),
		Arc::new(StringArray::from(metadata)),
		Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim)),
	])?;
	Ok(record_batch)
}

/// Create `table_name` in `conn` holding every chunk with its embedding.
pub async fn write_table(conn: &Connection, table_name: &str, chunks: &[Chunk], embeddings: &[Vec<f32>], dim: usize) -> Result<Table> {
	if chunks.len() != embeddings.len() {
		return Err(Error::Operation(format!("{} chunks but {} embeddings", chunks.len(), embeddings.len())).into());
	}
	let record_batch = chunks_to_record_batch(chunks, embeddings, dim as i32)?;
	let schema = record_batch.schema();
	let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), schema));
	let table = conn.create_table(table_name, reader).execute().await?;
	info!(table = table_name, rows = chunks.len(), "wrote dense table");
	Ok(table)
}
