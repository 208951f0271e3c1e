//! Generation lifecycle of the persisted dense index.
//!
//! Layout under the index root:
//!
//! ```text
//! manifest.json        -> names the serving generation
//! gen-<millis>/        -> one LanceDB database per build
//! ```
//!
//! A build writes a fresh generation, then swaps the manifest. The previous
//! generation is kept for readers still holding it; older ones are removed.
use anyhow::Result;
use lancedb::{connect, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use siteqa_core::config::{resolve_with_base, Settings};
use siteqa_core::error::{Error, IndexUnavailable};
use siteqa_core::traits::Embedder;
use siteqa_core::types::{corpus_version, ChunkStore};

use crate::index_build::{build_ivfpq_index, compute_ivfpq_params};
use crate::manifest::{read_manifest, write_manifest, Manifest};
use crate::runtime::LanceRuntime;
use crate::search::{read_chunks, LanceDenseIndex};
use crate::writer::{embed_chunks, write_table};

const GENERATION_PREFIX: &str = "gen-";

pub struct LanceStore {
	root: PathBuf,
	table_name: String,
	ann_min_rows: usize,
	runtime: Arc<LanceRuntime>,
}

impl LanceStore {
	pub fn new(root: impl Into<PathBuf>, table_name: impl Into<String>, ann_min_rows: usize) -> Result<Self> {
		let runtime = LanceRuntime::new()?;
		Ok(Self { root: root.into(), table_name: table_name.into(), ann_min_rows, runtime: Arc::new(runtime) })
	}

	pub fn from_settings(settings: &Settings, base_dir: &Path) -> Result<Self> {
		Self::new(resolve_with_base(base_dir, &settings.data.index_dir), settings.data.table.clone(), settings.dense.ann_min_rows)
	}

	pub fn root(&self) -> &Path { &self.root }

	/// The serving manifest, if one exists and parses.
	pub fn manifest(&self) -> Result<Manifest> { read_manifest(&self.root) }

	async fn connect_generation(&self, generation: &str) -> Result<Connection> {
		let dir = self.root.join(generation);
		Ok(connect(dir.to_string_lossy().as_ref()).execute().await?)
	}

	/// Open the serving generation for `embedder`. Every failure is an
	/// [`Error::IndexUnavailable`] naming why a rebuild is needed.
	#[instrument(skip_all, fields(root = %self.root.display()))]
	pub fn open_active(&self, embedder: &dyn Embedder) -> Result<LanceDenseIndex> {
		let manifest = self.manifest()?;
		if manifest.embedder_id != embedder.model_id() || manifest.dim != embedder.dim() {
			return Err(Error::index_unavailable(
				IndexUnavailable::Incompatible,
				format!("index built with {} (dim {}), embedder is {} (dim {})", manifest.embedder_id, manifest.dim, embedder.model_id(), embedder.dim()),
			)
			.into());
		}
		let corrupt = |e: anyhow::Error| -> anyhow::Error {
			Error::index_unavailable(IndexUnavailable::Corrupt, format!("{e:#}")).into()
		};

		if manifest.chunk_count == 0 {
			return Ok(LanceDenseIndex { runtime: Arc::clone(&self.runtime), table: None, chunks: Vec::new().into(), manifest });
		}
		if !self.root.join(&manifest.generation).is_dir() {
			return Err(corrupt(anyhow::anyhow!("generation {} missing", manifest.generation)));
		}

		let (table, chunks) = self
			.runtime
			.block_on(async {
				let conn = self.connect_generation(&manifest.generation).await?;
				let table = conn.open_table(&self.table_name).execute().await?;
				let rows = table.count_rows(None).await?;
				if rows != manifest.chunk_count {
					anyhow::bail!("table has {rows} rows, manifest says {}", manifest.chunk_count);
				}
				let chunks = read_chunks(&table, rows).await?;
				Ok::<_, anyhow::Error>((table, chunks))
			})
			.map_err(corrupt)?;
		if chunks.len() != manifest.chunk_count || corpus_version(&chunks) != manifest.corpus_version {
			return Err(corrupt(anyhow::anyhow!("stored chunks do not match corpus version {}", manifest.corpus_version)));
		}
		info!(generation = %manifest.generation, chunks = chunks.len(), "opened dense index");
		Ok(LanceDenseIndex { runtime: Arc::clone(&self.runtime), table: Some(table), chunks: chunks.into(), manifest })
	}

	/// Embed `store`, write it as a new generation and make it the serving one.
	#[instrument(skip_all, fields(root = %self.root.display(), chunks = store.len()))]
	pub fn build(&self, store: &ChunkStore, embedder: &dyn Embedder) -> Result<LanceDenseIndex> {
		fs::create_dir_all(&self.root)?;
		let previous = self.manifest().ok().map(|m| m.generation);
		let generation = self.next_generation_name();
		let dim = embedder.dim();

		let table = if store.is_empty() {
			None
		} else {
			let embeddings = embed_chunks(store.chunks(), embedder)?;
			let table = self.runtime.block_on(async {
				let conn = self.connect_generation(&generation).await?;
				let table = write_table(&conn, &self.table_name, store.chunks(), &embeddings, dim).await?;
				if store.len() >= self.ann_min_rows {
					build_ivfpq_index(&table, &compute_ivfpq_params(store.len(), dim)).await?;
				}
				Ok::<_, anyhow::Error>(table)
			})?;
			Some(table)
		};

		let manifest = Manifest {
			generation: generation.clone(),
			embedder_id: embedder.model_id().to_string(),
			dim,
			corpus_version: store.version().to_string(),
			chunk_count: store.len(),
			created_at: chrono::Utc::now().to_rfc3339(),
		};
		write_manifest(&self.root, &manifest)?;
		info!(generation = %generation, chunks = store.len(), "dense index generation active");
		self.prune(&generation, previous.as_deref());
		Ok(LanceDenseIndex { runtime: Arc::clone(&self.runtime), table, chunks: store.shared(), manifest })
	}

	fn next_generation_name(&self) -> String {
		let base = format!("{GENERATION_PREFIX}{}", chrono::Utc::now().timestamp_millis());
		let mut name = base.clone();
		let mut n = 1;
		while self.root.join(&name).exists() {
			name = format!("{base}-{n}");
			n += 1;
		}
		name
	}

	fn prune(&self, current: &str, previous: Option<&str>) {
		let Ok(entries) = fs::read_dir(&self.root) else { return };
		for entry in entries.filter_map(|e| e.ok()) {
			let name = entry.file_name().to_string_lossy().to_string();
			if !name.starts_with(GENERATION_PREFIX) || name == current || Some(name.as_str()) == previous {
				continue;
			}
			if let Err(e) = fs::remove_dir_all(entry.path()) {
				warn!(generation = %name, error = %e, "failed to prune old generation");
			}
		}
	}

	/// Generation directories currently on disk, sorted.
	pub fn generations(&self) -> Vec<String> {
		let mut names: Vec<String> = fs::read_dir(&self.root)
			.into_iter()
			.flatten()
			.filter_map(|e| e.ok())
			.map(|e| e.file_name().to_string_lossy().to_string())
			.filter(|n| n.starts_with(GENERATION_PREFIX))
			.collect();
		names.sort();
		names
	}
}
