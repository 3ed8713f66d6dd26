//! # KNN Crate
//!
//! The pure algorithmic half of the distributed recommender:
//!
//! 1. **partition**: deal the rating matrix round-robin into one chunk per node
//! 2. **similarity**: the worker engine, scoring a chunk against the target
//! 3. **merge**: reduce all partial neighbor lists to the global top-K
//! 4. **predict**: similarity-weighted rating prediction and top-N selection
//!
//! Nothing in here does I/O. The coordinator and the worker nodes wrap these
//! functions with the network protocol.
//!
//! ```ignore
//! let chunks = knn::partition(index.matrix(), nodes.len());
//! let partials: Vec<_> = chunks
//!     .iter()
//!     .map(|c| knn::find_neighbors(user, target, c, SimilarityMetric::Cosine, 50))
//!     .collect();
//! let neighbors = knn::merge_top_k(partials, 50);
//! let recs = knn::top_n(knn::predict_ratings(target, &neighbors, index.matrix()), 10);
//! ```

pub mod merge;
pub mod partition;
pub mod predict;
pub mod similarity;
pub mod types;

pub use merge::merge_top_k;
pub use partition::partition;
pub use predict::{predict_ratings, top_n};
pub use similarity::{find_neighbors, similarity};
pub use types::{
    rank_neighbors, rank_predictions, Chunk, NeighborResult, PredictedRating, SimilarityMetric,
    MIN_CO_RATED,
};
