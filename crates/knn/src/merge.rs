//! Global top-K merge of the partial neighbor lists.

use crate::types::{rank_neighbors, NeighborResult};

/// Concatenate every node's partial list and keep the `k` best neighbors.
///
/// Ordered by similarity descending with user id ascending as tie-break.
/// When fewer than `k` candidates exist all of them are returned.
pub fn merge_top_k<I>(partials: I, k: usize) -> Vec<NeighborResult>
where
    I: IntoIterator<Item = Vec<NeighborResult>>,
{
    let mut all: Vec<NeighborResult> = partials.into_iter().flatten().collect();
    all.sort_unstable_by(rank_neighbors);
    all.truncate(k);
    all
}
