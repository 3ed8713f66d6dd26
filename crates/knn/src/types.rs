//! Shared types for the neighborhood search.

use data_loader::{MovieId, UserId, UserRatings};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A slice of the rating matrix assigned to one worker node.
///
/// Borrows from the coordinator's matrix; it only lives for one request.
pub type Chunk<'a> = HashMap<UserId, &'a UserRatings>;

/// Minimum number of co-rated movies for a similarity to be defined
pub const MIN_CO_RATED: usize = 2;

/// One candidate neighbor and its similarity to the target user
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeighborResult {
    pub user_id: UserId,
    pub similarity: f64,
}

/// A predicted rating for a movie the target has not rated
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictedRating {
    pub movie_id: MovieId,
    pub predicted: f64,
}

/// Ranking order for neighbors: similarity descending, then user id
/// ascending. Total, so sorting is reproducible.
pub fn rank_neighbors(a: &NeighborResult, b: &NeighborResult) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| a.user_id.cmp(&b.user_id))
}

/// Ranking order for predictions: predicted descending, then movie id
/// ascending.
pub fn rank_predictions(a: &PredictedRating, b: &PredictedRating) -> Ordering {
    b.predicted
        .total_cmp(&a.predicted)
        .then_with(|| a.movie_id.cmp(&b.movie_id))
}

/// How two users' rating vectors are compared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    /// Cosine of the co-rated sub-vectors
    #[default]
    Cosine,
    /// Pearson correlation over the co-rated movies
    Pearson,
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityMetric::Cosine => f.write_str("cosine"),
            SimilarityMetric::Pearson => f.write_str("pearson"),
        }
    }
}

impl FromStr for SimilarityMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(SimilarityMetric::Cosine),
            "pearson" => Ok(SimilarityMetric::Pearson),
            other => Err(format!("unknown similarity metric: {}", other)),
        }
    }
}
