//! Corpus loading and recursive character chunking.
//!
//! The scraper writes one cleaned `.txt` per web page into the clean-text
//! directory; the PDF extractor writes one `.txt` per PDF there too, named with
//! the configured prefix and with pages separated by form feeds.

use anyhow::Result;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{resolve_with_base, ChunkingConfig, Settings};
use crate::traits::ChunkSource;
use crate::types::Chunk;

const PAGE_BREAK: char = '\x0c';

/// Splits text into windows of at most `chunk_size` characters, trying coarse
/// separators first and falling back to finer ones for oversized pieces.
/// Consecutive windows share up to `chunk_overlap` characters.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            chunk_overlap: config.chunk_overlap.min(config.chunk_size.saturating_sub(1)),
            separators: config.separators.clone(),
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map_or("", String::as_str);
        let mut finer: &[String] = &[];
        for (i, s) in separators.iter().enumerate() {
            if s.is_empty() {
                separator = "";
                break;
            }
            if text.contains(s.as_str()) {
                separator = s;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut out = Vec::new();
        let mut small: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                small.push(piece);
                continue;
            }
            if !small.is_empty() {
                out.extend(self.merge(&small));
                small.clear();
            }
            if finer.is_empty() {
                out.push(piece.to_string());
            } else {
                out.extend(self.split_with(piece, finer));
            }
        }
        if !small.is_empty() {
            out.extend(self.merge(&small));
        }
        out
    }

    /// Greedily packs pieces into windows, then drops leading pieces until the
    /// carried-over tail fits within the overlap budget.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut windows = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;
        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !current.is_empty() {
                push_joined(&current, &mut windows);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    match current.pop_front() {
                        Some(first) => total -= char_len(first),
                        None => break,
                    }
                }
            }
            current.push_back(piece);
            total += len;
        }
        push_joined(&current, &mut windows);
        windows
    }
}

fn push_joined(pieces: &VecDeque<&str>, out: &mut Vec<String>) {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split on `separator`, keeping it at the start of the following piece.
/// An empty separator splits between characters. Empty pieces are dropped.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Loads every cleaned page and PDF text file from one directory and chunks it.
#[derive(Debug, Clone)]
pub struct DirectoryCorpus {
    dir: PathBuf,
    pdf_prefix: String,
    splitter: RecursiveSplitter,
}

impl DirectoryCorpus {
    pub fn new(dir: impl Into<PathBuf>, pdf_prefix: impl Into<String>, chunking: &ChunkingConfig) -> Self {
        Self { dir: dir.into(), pdf_prefix: pdf_prefix.into(), splitter: RecursiveSplitter::new(chunking) }
    }

    pub fn from_settings(settings: &Settings, base: &Path) -> Self {
        Self::new(
            resolve_with_base(base, &settings.data.clean_text_dir),
            settings.data.pdf_prefix.clone(),
            &settings.chunking,
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn list_txt_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("txt"))
            .collect();
        files.sort();
        files
    }

    fn chunk_file(&self, path: &Path) -> Result<Vec<Chunk>> {
        let text = read_file_content(path)?;
        if text.trim().is_empty() {
            debug!(path = %path.display(), "skipping empty file");
            return Ok(Vec::new());
        }
        let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        let chunks = match stem.strip_prefix(&self.pdf_prefix) {
            Some(source_pdf) if !self.pdf_prefix.is_empty() => text
                .split(PAGE_BREAK)
                .enumerate()
                .filter(|(_, page)| !page.trim().is_empty())
                .flat_map(|(page, body)| {
                    self.splitter
                        .split(body)
                        .into_iter()
                        .map(move |content| Chunk::pdf(source_pdf, page as i64, content))
                })
                .collect(),
            _ => self.splitter.split(&text).into_iter().map(|content| Chunk::web(&stem, content)).collect(),
        };
        Ok(chunks)
    }
}

impl ChunkSource for DirectoryCorpus {
    fn load_all_chunks(&self) -> Result<Vec<Chunk>> {
        if !self.dir.is_dir() {
            warn!(dir = %self.dir.display(), "clean-text directory missing; corpus is empty");
            return Ok(Vec::new());
        }
        let files = self.list_txt_files();
        let mut all_chunks = Vec::new();
        for file in &files {
            all_chunks.extend(self.chunk_file(file)?);
        }
        info!(files = files.len(), chunks = all_chunks.len(), dir = %self.dir.display(), "loaded corpus");
        Ok(all_chunks)
    }
}

fn read_file_content(file_path: &Path) -> Result<String> {
    match fs::read_to_string(file_path) {
        Ok(content) => Ok(content),
        Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
    }
}
