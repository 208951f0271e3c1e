//! `manifest.json`: the pointer to the serving generation.
//!
//! Replaced by write-to-temp + rename, so readers see either the old or the
//! new manifest, never a partial one.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use siteqa_core::error::{Error, IndexUnavailable};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Generation directory name under the index root.
    pub generation: String,
    pub embedder_id: String,
    pub dim: usize,
    pub corpus_version: String,
    pub chunk_count: usize,
    /// RFC 3339.
    pub created_at: String,
}

/// `Missing` when there is no manifest, `Corrupt` when it does not parse.
pub fn read_manifest(root: &Path) -> Result<Manifest> {
    let path = root.join(MANIFEST_FILE);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::index_unavailable(IndexUnavailable::Missing, format!("no {}", path.display())).into());
        }
        Err(e) => return Err(Error::from(e).into()),
    };
    serde_json::from_str(&raw)
        .map_err(|e| Error::index_unavailable(IndexUnavailable::Corrupt, format!("{}: {e}", path.display())).into())
}

pub fn write_manifest(root: &Path, manifest: &Manifest) -> Result<()> {
    fs::create_dir_all(root)?;
    let tmp = root.join(format!("{MANIFEST_FILE}.tmp"));
    fs::write(&tmp, serde_json::to_vec_pretty(manifest)?)?;
    fs::rename(&tmp, root.join(MANIFEST_FILE))?;
    Ok(())
}
