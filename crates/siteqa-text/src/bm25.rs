//! In-memory BM25+ over a chunk store.
//!
//! Per query term `q` and chunk `d`:
//!
//! ```text
//! idf(q) * (delta + tf * (k1 + 1) / (tf + k1 * (1 - b + b * |d| / avgdl)))
//! idf(q) = ln((N + 1) / df(q))
//! ```
//!
//! The `delta` floor means every chunk collects `idf(q) * delta` for each known
//! query term; only chunks sharing at least one term with the query are
//! returned.
use std::collections::HashMap;
use std::sync::Arc;

use tantivy::tokenizer::TextAnalyzer;
use tracing::debug;

use siteqa_core::config::Bm25Settings;
use siteqa_core::traits::SparseIndex;
use siteqa_core::types::{Chunk, ChunkStore};

use crate::tantivy_utils::{analyze, build_analyzer};

struct Posting {
	doc: u32,
	tf: u32,
}

pub struct Bm25PlusIndex {
	chunks: Arc<[Chunk]>,
	version: String,
	params: Bm25Settings,
	analyzer: TextAnalyzer,
	postings: HashMap<String, Vec<Posting>>,
	doc_lens: Vec<u32>,
	avgdl: f32,
}

impl Bm25PlusIndex {
	pub fn build(store: &ChunkStore, params: Bm25Settings) -> Self {
		Self::from_shared(store.shared(), store.version(), params)
	}

	/// Index an already shared chunk set whose corpus version is known.
	pub fn from_shared(chunks: Arc<[Chunk]>, version: impl Into<String>, params: Bm25Settings) -> Self {
		let analyzer = build_analyzer();
		let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
		let mut doc_lens = Vec::with_capacity(chunks.len());
		for (doc, chunk) in chunks.iter().enumerate() {
			let terms = analyze(&analyzer, &chunk.content);
			doc_lens.push(terms.len() as u32);
			let mut tfs: HashMap<String, u32> = HashMap::new();
			for t in terms { *tfs.entry(t).or_insert(0) += 1; }
			for (term, tf) in tfs {
				postings.entry(term).or_default().push(Posting { doc: doc as u32, tf });
			}
		}
		let total: u64 = doc_lens.iter().map(|&l| u64::from(l)).sum();
		let avgdl = if doc_lens.is_empty() { 0.0 } else { total as f32 / doc_lens.len() as f32 };
		debug!(chunks = chunks.len(), terms = postings.len(), avgdl, "built bm25+ index");
		Self { chunks, version: version.into(), params, analyzer, postings, doc_lens, avgdl }
	}

	pub fn len(&self) -> usize { self.chunks.len() }

	pub fn is_empty(&self) -> bool { self.chunks.is_empty() }

	fn idf(&self, df: usize) -> f32 {
		((self.chunks.len() as f32 + 1.0) / df as f32).ln()
	}

	/// `(chunk position, score)` for the top `k` matching chunks, descending
	/// score; ties keep corpus order.
	pub fn search_scored(&self, query: &str, k: usize) -> Vec<(usize, f32)> {
		if k == 0 || self.chunks.is_empty() { return Vec::new(); }
		let terms = analyze(&self.analyzer, query);
		if terms.is_empty() { return Vec::new(); }

		let Bm25Settings { k1, b, delta } = self.params;
		let mut floor = 0.0f32;
		let mut acc: HashMap<u32, f32> = HashMap::new();
		for term in &terms {
			let Some(list) = self.postings.get(term) else { continue };
			let idf = self.idf(list.len());
			floor += idf * delta;
			for p in list {
				let tf = p.tf as f32;
				let dl = self.doc_lens[p.doc as usize] as f32;
				let norm = if self.avgdl > 0.0 { 1.0 - b + b * dl / self.avgdl } else { 1.0 };
				*acc.entry(p.doc).or_insert(0.0) += idf * tf * (k1 + 1.0) / (tf + k1 * norm);
			}
		}

		let mut hits: Vec<(usize, f32)> = acc.into_iter().map(|(doc, s)| (doc as usize, s + floor)).collect();
		hits.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
		hits.truncate(k);
		hits
	}
}

impl SparseIndex for Bm25PlusIndex {
	fn version(&self) -> &str { &self.version }

	fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<Chunk>> {
		Ok(self.search_scored(query, k).into_iter().map(|(i, _)| self.chunks[i].clone()).collect())
	}
}
