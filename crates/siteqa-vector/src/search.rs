use anyhow::{anyhow, Result};
use arrow_array::{Array, Float32Array, Int32Array, RecordBatch, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{DistanceType, Table};
use std::sync::Arc;

use siteqa_core::traits::DenseIndex;
use siteqa_core::types::{Chunk, Meta};

use crate::manifest::Manifest;
use crate::runtime::LanceRuntime;
use crate::schema::{COL_CONTENT, COL_METADATA, COL_ORDINAL};

/// One serving generation of the dense index. `table` is `None` for an empty corpus.
pub struct LanceDenseIndex {
	pub(crate) runtime: Arc<LanceRuntime>,
	pub(crate) table: Option<Table>,
	pub(crate) chunks: Arc<[Chunk]>,
	pub(crate) manifest: Manifest,
}

impl LanceDenseIndex {
	pub fn manifest(&self) -> &Manifest { &self.manifest }

	/// The chunk set this generation was built from, in corpus order.
	pub fn chunks(&self) -> Arc<[Chunk]> { Arc::clone(&self.chunks) }

	/// `(chunk position, cosine similarity)` for the nearest `k` rows.
	pub fn search_scored(&self, query_vec: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
		let Some(table) = &self.table else { return Ok(Vec::new()) };
		if k == 0 { return Ok(Vec::new()); }
		if query_vec.len() != self.manifest.dim {
			return Err(anyhow!("query vector has dim {} but index has dim {}", query_vec.len(), self.manifest.dim));
		}
		self.runtime.block_on(async {
			let mut stream = table
				.vector_search(query_vec.to_vec())?
				.distance_type(DistanceType::Cosine)
				.select(Select::columns(&[COL_ORDINAL]))
				.limit(k)
				.execute()
				.await?;
			let mut hits = Vec::new();
			while let Some(batch) = stream.try_next().await? {
				let ordinals = int_column(&batch, COL_ORDINAL)?;
				let distances = batch
					.column_by_name("_distance")
					.and_then(|c| c.as_any().downcast_ref::<Float32Array>())
					.ok_or_else(|| anyhow!("_distance column missing"))?;
				for i in 0..batch.num_rows() {
					let pos = usize::try_from(ordinals.value(i))?;
					if pos >= self.chunks.len() { return Err(anyhow!("ordinal {pos} out of range")); }
					hits.push((pos, 1.0 - distances.value(i)));
				}
			}
			hits.sort_by(|a, b| b.1.total_cmp(&a.1));
			hits.truncate(k);
			Ok::<_, anyhow::Error>(hits)
		})
	}
}

impl DenseIndex for LanceDenseIndex {
	fn len(&self) -> usize { self.chunks.len() }

	fn search_vec(&self, query_vec: &[f32], k: usize) -> Result<Vec<Chunk>> {
		Ok(self.search_scored(query_vec, k)?.into_iter().map(|(i, _)| self.chunks[i].clone()).collect())
	}
}

fn int_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int32Array> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<Int32Array>()).ok_or_else(|| anyhow!("{name} column missing"))
}

fn str_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch.column_by_name(name).and_then(|c| c.as_any().downcast_ref::<StringArray>()).ok_or_else(|| anyhow!("{name} column missing"))
}

/// Every row of `table` as chunks, ordered by ordinal.
pub(crate) async fn read_chunks(table: &Table, expected: usize) -> Result<Vec<Chunk>> {
	let mut stream = table
		.query()
		.select(Select::columns(&[COL_ORDINAL, COL_CONTENT, COL_METADATA]))
		.limit(expected.max(1))
		.execute()
		.await?;
	let mut rows: Vec<(i32, Chunk)> = Vec::with_capacity(expected);
	while let Some(batch) = stream.try_next().await? {
		let ordinals = int_column(&batch, COL_ORDINAL)?;
		let contents = str_column(&batch, COL_CONTENT)?;
		let metadata = str_column(&batch, COL_METADATA)?;
		for i in 0..batch.num_rows() {
			if ordinals.is_null(i) || contents.is_null(i) { return Err(anyhow!("null cell in row {i}")); }
			let meta: Meta = serde_json::from_str(metadata.value(i))?;
			rows.push((ordinals.value(i), Chunk { content: contents.value(i).to_string(), metadata: meta }));
		}
	}
	rows.sort_by_key(|(ord, _)| *ord);
	Ok(rows.into_iter().map(|(_, c)| c).collect())
}
