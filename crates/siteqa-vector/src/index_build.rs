//! IVF-PQ index construction for large generations. Small tables are scanned
//! exactly and never reach this module.
use anyhow::Result;
use lancedb::index::{vector::IvfPqIndexBuilder, Index};
use lancedb::{DistanceType, Table};
use tracing::info;

use crate::schema::COL_VECTOR;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfPqParams {
    pub nlist: usize,
    pub m: usize,
}

/// Partitions near `sqrt(rows)`; sub-vectors the largest of 32/16/8/4/2/1
/// dividing `dim`.
pub fn compute_ivfpq_params(rows: usize, dim: usize) -> IvfPqParams {
    let sqrt_n = (rows as f64).sqrt() as usize;
    let mut nlist = sqrt_n.clamp(1, 65536);
    // Clamp nlist to be less than rows for tiny tables
    if rows > 1 {
        nlist = nlist.min(rows - 1);
    } else {
        nlist = 1;
    }
    let m = [32, 16, 8, 4, 2].into_iter().find(|m| dim >= *m && dim % m == 0).unwrap_or(1);
    IvfPqParams { nlist, m }
}

pub async fn build_ivfpq_index(table: &Table, params: &IvfPqParams) -> Result<()> {
    info!(nlist = params.nlist, m = params.m, "building IVF-PQ index");
    table
        .create_index(
            &[COL_VECTOR],
            Index::IvfPq(
                IvfPqIndexBuilder::default()
                    .distance_type(DistanceType::Cosine)
                    .num_partitions(params.nlist as u32)
                    .num_sub_vectors(params.m as u32),
            ),
        )
        .execute()
        .await?;
    Ok(())
}
