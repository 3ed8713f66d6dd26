//! Worker similarity engine.
//!
//! Scores every user of a chunk against the target user, restricted to the
//! movies both have rated. This is the code the worker nodes run; the
//! coordinator never calls it directly in distributed mode.
//!
//! ## Metrics
//! - **Cosine** (default): `Σ a·b / (‖a‖·‖b‖)` over the co-rated movies. The
//!   rating scale is positive, so scores land in (0, 1] and every neighbor
//!   contributes to the weighted prediction.
//! - **Pearson**: correlation of the co-rated sub-vectors. Can be negative;
//!   a vector with zero variance has no defined score.
//!
//! Candidates with fewer than [`MIN_CO_RATED`] co-rated movies are left out
//! of the result entirely.

use crate::types::{rank_neighbors, NeighborResult, SimilarityMetric, MIN_CO_RATED};
use data_loader::{UserId, UserRatings};
use rayon::prelude::*;
use std::borrow::Borrow;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Pairs of ratings for the movies both users rated, ordered by movie id so
/// the floating-point sums do not depend on hash map iteration order
fn co_rated(a: &UserRatings, b: &UserRatings) -> Vec<(f64, f64)> {
    // Walk the smaller vector, probe the larger one
    let (small, large, swapped) = if a.len() <= b.len() {
        (a, b, false)
    } else {
        (b, a, true)
    };

    let mut shared: Vec<_> = small
        .iter()
        .filter_map(|(&movie, &x)| large.get(&movie).map(|&y| (movie, x, y)))
        .collect();
    shared.sort_unstable_by_key(|&(movie, _, _)| movie);

    shared
        .into_iter()
        .map(|(_, x, y)| {
            if swapped {
                (y as f64, x as f64)
            } else {
                (x as f64, y as f64)
            }
        })
        .collect()
}

fn cosine(pairs: &[(f64, f64)]) -> Option<f64> {
    let (mut dot, mut norm_a, mut norm_b) = (0.0, 0.0, 0.0);
    for &(a, b) in pairs {
        dot += a * b;
        norm_a += a * a;
        norm_b += b * b;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    (denom > 0.0).then(|| dot / denom)
}

fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for &(a, b) in pairs {
        let (da, db) = (a - mean_a, b - mean_b);
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    let denom = (var_a * var_b).sqrt();
    (denom > 0.0).then(|| cov / denom)
}

/// Similarity between two rating vectors, or `None` when it is undefined
/// (too few co-rated movies, zero norm or zero variance).
pub fn similarity(metric: SimilarityMetric, a: &UserRatings, b: &UserRatings) -> Option<f64> {
    let pairs = co_rated(a, b);
    if pairs.len() < MIN_CO_RATED {
        return None;
    }

    let score = match metric {
        SimilarityMetric::Cosine => cosine(&pairs),
        SimilarityMetric::Pearson => pearson(&pairs),
    }?;
    score.is_finite().then_some(score)
}

/// Score every candidate in `chunk` against the target.
///
/// The target itself is skipped if it is part of the chunk. When `local_k`
/// is non-zero the result is cut to the `local_k` best entries using the
/// same order as the global merge, so it must be at least the global K.
/// The returned order is otherwise unspecified.
#[instrument(skip(target_ratings, chunk), fields(candidates = chunk.len()))]
pub fn find_neighbors<R>(
    target_user: UserId,
    target_ratings: &UserRatings,
    chunk: &HashMap<UserId, R>,
    metric: SimilarityMetric,
    local_k: usize,
) -> Vec<NeighborResult>
where
    R: Borrow<UserRatings> + Sync,
{
    let mut neighbors: Vec<NeighborResult> = chunk
        .par_iter()
        .filter(|(user_id, _)| **user_id != target_user)
        .filter_map(|(&user_id, ratings)| {
            similarity(metric, target_ratings, ratings.borrow())
                .map(|similarity| NeighborResult { user_id, similarity })
        })
        .collect();

    let scored = neighbors.len();
    if local_k > 0 && neighbors.len() > local_k {
        neighbors.sort_unstable_by(rank_neighbors);
        neighbors.truncate(local_k);
    }

    debug!(
        scored,
        returned = neighbors.len(),
        "Computed neighbor similarities"
    );
    neighbors
}
