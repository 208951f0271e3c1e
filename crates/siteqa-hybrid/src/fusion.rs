use std::collections::HashMap;

use siteqa_core::types::{Candidate, Chunk, SourceKind};

/// Merge dense then sparse results into one candidate list, deduplicated by
/// exact content. The first occurrence keeps its position; a chunk found by
/// both paths is tagged [`SourceKind::Both`].
pub fn fuse(dense: Vec<Chunk>, sparse: Vec<Chunk>) -> Vec<Candidate> {
    let mut fused: Vec<Candidate> = Vec::with_capacity(dense.len() + sparse.len());
    let mut seen: HashMap<String, usize> = HashMap::new();
    let tagged = dense
        .into_iter()
        .map(|c| (c, SourceKind::Vector))
        .chain(sparse.into_iter().map(|c| (c, SourceKind::Text)));
    for (chunk, source) in tagged {
        match seen.get(&chunk.content) {
            Some(&pos) => {
                if fused[pos].source != source {
                    fused[pos].source = SourceKind::Both;
                }
            }
            None => {
                seen.insert(chunk.content.clone(), fused.len());
                fused.push(Candidate { chunk, source });
            }
        }
    }
    fused
}
