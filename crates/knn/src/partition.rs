//! Round-robin partitioning of the rating matrix.

use crate::types::Chunk;
use data_loader::RatingMatrix;
use std::collections::HashMap;
use tracing::debug;

/// Split the matrix into `parts` disjoint chunks whose union is every user.
///
/// Users are dealt round-robin in the map's traversal order, which is not
/// stable between runs. The merge only relies on coverage, so that is fine.
/// Returns no chunks when `parts` is zero.
pub fn partition(matrix: &RatingMatrix, parts: usize) -> Vec<Chunk<'_>> {
    if parts == 0 {
        return Vec::new();
    }

    let per_chunk = matrix.len() / parts + 1;
    let mut chunks: Vec<Chunk<'_>> = (0..parts)
        .map(|_| HashMap::with_capacity(per_chunk))
        .collect();

    for (i, (&user_id, ratings)) in matrix.iter().enumerate() {
        chunks[i % parts].insert(user_id, ratings);
    }

    debug!(
        users = matrix.len(),
        parts,
        "Partitioned rating matrix"
    );
    chunks
}
