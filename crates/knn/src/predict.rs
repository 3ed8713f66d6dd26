//! Rating prediction and top-N selection.

use crate::types::{rank_predictions, NeighborResult, PredictedRating};
use data_loader::{MovieId, RatingMatrix, UserRatings};
use std::collections::HashMap;

/// Predict ratings for every movie the neighbors rated and the target did not.
///
/// `predicted(m) = Σ sim(n)·rating(n, m) / Σ sim(n)` over neighbors that rated
/// `m`. Only neighbors with a positive similarity take part, so every
/// prediction is a convex combination of existing ratings. Movies without a
/// contributing neighbor are left out. Output order is unspecified.
pub fn predict_ratings(
    target_ratings: &UserRatings,
    neighbors: &[NeighborResult],
    matrix: &RatingMatrix,
) -> Vec<PredictedRating> {
    // movie -> (weighted sum, total weight)
    let mut sums: HashMap<MovieId, (f64, f64)> = HashMap::new();

    for neighbor in neighbors {
        if !(neighbor.similarity > 0.0 && neighbor.similarity.is_finite()) {
            continue;
        }
        let Some(ratings) = matrix.get(&neighbor.user_id) else {
            continue;
        };

        for (&movie_id, &rating) in ratings {
            if target_ratings.contains_key(&movie_id) {
                continue;
            }
            let entry = sums.entry(movie_id).or_insert((0.0, 0.0));
            entry.0 += neighbor.similarity * rating as f64;
            entry.1 += neighbor.similarity;
        }
    }

    sums.into_iter()
        .filter(|(_, (_, weight))| *weight > 0.0)
        .map(|(movie_id, (weighted, weight))| PredictedRating {
            movie_id,
            predicted: weighted / weight,
        })
        .collect()
}

/// Keep the `n` best predictions: predicted descending, movie id ascending.
pub fn top_n(mut predictions: Vec<PredictedRating>, n: usize) -> Vec<PredictedRating> {
    predictions.sort_unstable_by(rank_predictions);
    predictions.truncate(n);
    predictions
}
