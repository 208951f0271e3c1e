use std::sync::Arc;

use siteqa_core::traits::{DenseIndex, SparseIndex};

/// The dense and sparse indexes over one chunk set. Immutable; a rebuild
/// produces a new snapshot and swaps it in whole.
pub struct IndexSnapshot {
    dense: Arc<dyn DenseIndex>,
    sparse: Arc<dyn SparseIndex>,
    version: String,
    len: usize,
}

impl IndexSnapshot {
    pub fn new(dense: Arc<dyn DenseIndex>, sparse: Arc<dyn SparseIndex>, version: impl Into<String>, len: usize) -> Self {
        Self { dense, sparse, version: version.into(), len }
    }

    pub fn dense(&self) -> &dyn DenseIndex { self.dense.as_ref() }
    pub fn sparse(&self) -> &dyn SparseIndex { self.sparse.as_ref() }
    pub(crate) fn sparse_shared(&self) -> Arc<dyn SparseIndex> { Arc::clone(&self.sparse) }

    /// Corpus version both indexes were built from.
    pub fn version(&self) -> &str { &self.version }
    pub fn len(&self) -> usize { self.len }
    pub fn is_empty(&self) -> bool { self.len == 0 }
}
