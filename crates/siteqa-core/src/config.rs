//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars.
//! Nested keys are addressed with a double underscore in env vars, e.g.
//! `APP_RETRIEVAL__CANDIDATE_MULTIPLIER=4`. Every setting has a default, so an
//! empty environment yields a working configuration.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Load from the config files in `dir`. Relative data paths resolve against `dir`.
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, base_dir: dir.to_path_buf() };
        config.settings()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment, base_dir: &Path) -> Self {
        Self { figment, base_dir: base_dir.to_path_buf() }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The full typed configuration, validated.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalSettings,
    pub rerank: RerankSettings,
    pub embedding: EmbeddingSettings,
    pub sparse: Bm25Settings,
    pub dense: DenseSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<(), Error> {
        let c = &self.chunking;
        if c.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunking.chunk_size must be > 0".into()));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunking.chunk_overlap ({}) must be < chunking.chunk_size ({})",
                c.chunk_overlap, c.chunk_size
            )));
        }
        if self.retrieval.candidate_multiplier == 0 {
            return Err(Error::InvalidConfig("retrieval.candidate_multiplier must be >= 1".into()));
        }
        if self.rerank.batch_size == 0 || self.embedding.batch_size == 0 {
            return Err(Error::InvalidConfig("batch sizes must be >= 1".into()));
        }
        if self.rerank.max_content_chars == 0 {
            return Err(Error::InvalidConfig("rerank.max_content_chars must be >= 1".into()));
        }
        if self.retrieval.context_top_n < self.retrieval.default_top_n {
            tracing::warn!(
                context_top_n = self.retrieval.context_top_n,
                default_top_n = self.retrieval.default_top_n,
                "context_top_n is below default_top_n; answer context will be narrower than /retrieve results"
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Directory the scraper and PDF extractor write plain text into.
    pub clean_text_dir: String,
    /// File-name prefix marking PDF-derived text files.
    pub pdf_prefix: String,
    /// Root directory of persisted dense index generations.
    pub index_dir: String,
    pub table: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            clean_text_dir: "data/clean_text".into(),
            pdf_prefix: "pdf__".into(),
            index_dir: "data/lance_index".into(),
            table: "chunks".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters of trailing context repeated at the start of the next chunk.
    pub chunk_overlap: usize,
    /// Tried in order; the empty separator splits between characters.
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
            separators: vec!["\n\n".into(), "\n".into(), " ".into(), String::new()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Each index is asked for `top_n * candidate_multiplier` candidates.
    pub candidate_multiplier: usize,
    pub default_top_n: usize,
    /// Chunks handed to answer composition.
    pub context_top_n: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { candidate_multiplier: 3, default_top_n: 6, context_top_n: 20 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankSettings {
    pub batch_size: usize,
    /// Passages are cut to this many characters before scoring.
    pub max_content_chars: usize,
    /// Minimum raw score kept, if set.
    pub relevance_threshold: Option<f32>,
    pub model_dir: Option<String>,
    pub fallback_model_dir: Option<String>,
}

impl Default for RerankSettings {
    fn default() -> Self {
        Self {
            batch_size: 16,
            max_content_chars: 512,
            relevance_threshold: None,
            model_dir: None,
            fallback_model_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_id: String,
    pub model_dir: Option<String>,
    /// Token cap per input.
    pub max_len: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model_id: "paraphrase-multilingual-mpnet-base-v2".into(),
            model_dir: None,
            max_len: 256,
            batch_size: 32,
        }
    }
}

/// BM25+ parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Settings {
    pub k1: f32,
    pub b: f32,
    pub delta: f32,
}

impl Default for Bm25Settings {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75, delta: 1.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DenseSettings {
    /// Corpora at least this large get an IVF-PQ index; smaller ones are scanned exactly.
    pub ann_min_rows: usize,
}

impl Default for DenseSettings {
    fn default() -> Self {
        Self { ann_min_rows: 5000 }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
