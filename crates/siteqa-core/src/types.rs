//! Domain types shared by the dense, sparse and rerank stages.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A metadata value attached to a chunk. Only strings and integers occur.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Int(i64),
    Text(String),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            MetaValue::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetaValue::Int(n) => Some(*n),
            MetaValue::Text(_) => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Int(n) => write!(f, "{n}"),
            MetaValue::Text(s) => f.write_str(s),
        }
    }
}

/// Ordered so serialised metadata is byte-stable across builds.
pub type Meta = BTreeMap<String, MetaValue>;

pub const META_SOURCE_TYPE: &str = "source_type";
pub const META_PAGE_NAME: &str = "page_name";
pub const META_SOURCE_PDF: &str = "source_pdf";
pub const META_PAGE: &str = "page";

/// Where a chunk's text came from upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Web,
    Pdf,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Web => "web",
            SourceType::Pdf => "pdf",
        }
    }
}

/// The atomic retrievable unit.
///
/// - `content`: the chunk text, never empty
/// - `metadata`: at least `source_type`, plus `page_name` (web) or
///   `source_pdf` + `page` (pdf)
///
/// Two chunks with identical `content` are the same candidate during fusion,
/// whatever their metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: Meta,
}

impl Chunk {
    pub fn web(page_name: impl Into<String>, content: impl Into<String>) -> Self {
        let mut metadata = Meta::new();
        metadata.insert(META_SOURCE_TYPE.into(), MetaValue::Text(SourceType::Web.as_str().into()));
        metadata.insert(META_PAGE_NAME.into(), MetaValue::Text(page_name.into()));
        Self { content: content.into(), metadata }
    }

    pub fn pdf(source_pdf: impl Into<String>, page: i64, content: impl Into<String>) -> Self {
        let mut metadata = Meta::new();
        metadata.insert(META_SOURCE_TYPE.into(), MetaValue::Text(SourceType::Pdf.as_str().into()));
        metadata.insert(META_SOURCE_PDF.into(), MetaValue::Text(source_pdf.into()));
        metadata.insert(META_PAGE.into(), MetaValue::Int(page));
        Self { content: content.into(), metadata }
    }

    pub fn source_type(&self) -> Option<SourceType> {
        match self.metadata.get(META_SOURCE_TYPE).and_then(MetaValue::as_str) {
            Some("web") => Some(SourceType::Web),
            Some("pdf") => Some(SourceType::Pdf),
            _ => None,
        }
    }

    /// Human-facing source identifier: page name for web, file name for pdf.
    pub fn source_name(&self) -> Option<&str> {
        let key = match self.source_type()? {
            SourceType::Web => META_PAGE_NAME,
            SourceType::Pdf => META_SOURCE_PDF,
        };
        self.metadata.get(key).and_then(MetaValue::as_str)
    }
}

/// Which retrieval path produced a candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Vector,
    Text,
    Both,
}

/// A chunk travelling through one retrieval call. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub chunk: Chunk,
    pub source: SourceKind,
}

/// A chunk with its reranker relevance score (unbounded, higher is better).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Immutable snapshot of the corpus an index was built from.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    chunks: Arc<[Chunk]>,
    version: String,
}

impl ChunkStore {
    pub fn new(chunks: Vec<Chunk>) -> Self {
        let version = corpus_version(&chunks);
        Self { chunks: chunks.into(), version }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn shared(&self) -> Arc<[Chunk]> {
        Arc::clone(&self.chunks)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// blake3 over every chunk's content and metadata, in corpus order.
pub fn corpus_version(chunks: &[Chunk]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(chunks.len() as u64).to_le_bytes());
    for c in chunks {
        hasher.update(&(c.content.len() as u64).to_le_bytes());
        hasher.update(c.content.as_bytes());
        for (k, v) in &c.metadata {
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(v.to_string().as_bytes());
            hasher.update(b";");
        }
    }
    hasher.finalize().to_hex().to_string()
}
