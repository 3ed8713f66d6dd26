//! Protobuf messages exchanged between the coordinator and worker nodes.
//!
//! Declared with prost's derive macros instead of a `.proto` build step; the
//! tags below are the wire contract and must not be renumbered.

use std::collections::HashMap;

use data_loader::{UserId, UserRatings};
use knn::{Chunk, NeighborResult, SimilarityMetric};

use crate::error::{ProtocolError, Result};

/// One user's ratings (`movie -> rating`)
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RatingVector {
    #[prost(map = "uint32, float", tag = "1")]
    pub ratings: HashMap<u32, f32>,
}

/// Similarity metric on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Metric {
    Cosine = 0,
    Pearson = 1,
}

/// Work item for one node: score `chunk` against `target_user`
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskRequest {
    #[prost(uint32, tag = "1")]
    pub target_user: u32,
    /// The target's own ratings; it is usually not part of the chunk
    #[prost(message, optional, tag = "2")]
    pub target_ratings: Option<RatingVector>,
    #[prost(map = "uint32, message", tag = "3")]
    pub chunk: HashMap<u32, RatingVector>,
    /// Local truncation threshold, the coordinator sends its global K
    #[prost(uint32, tag = "4")]
    pub k: u32,
    #[prost(enumeration = "Metric", tag = "5")]
    pub metric: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Neighbor {
    #[prost(uint32, tag = "1")]
    pub user_id: u32,
    #[prost(double, tag = "2")]
    pub similarity: f64,
}

/// A node's answer: its partial neighbor list, or an error description
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskResponse {
    #[prost(message, repeated, tag = "1")]
    pub partial_neighbors: Vec<Neighbor>,
    #[prost(string, optional, tag = "2")]
    pub error: Option<String>,
}

impl From<SimilarityMetric> for Metric {
    fn from(metric: SimilarityMetric) -> Self {
        match metric {
            SimilarityMetric::Cosine => Metric::Cosine,
            SimilarityMetric::Pearson => Metric::Pearson,
        }
    }
}

impl From<Metric> for SimilarityMetric {
    fn from(metric: Metric) -> Self {
        match metric {
            Metric::Cosine => SimilarityMetric::Cosine,
            Metric::Pearson => SimilarityMetric::Pearson,
        }
    }
}

impl From<&UserRatings> for RatingVector {
    fn from(ratings: &UserRatings) -> Self {
        RatingVector {
            ratings: ratings.clone(),
        }
    }
}

impl From<NeighborResult> for Neighbor {
    fn from(n: NeighborResult) -> Self {
        Neighbor {
            user_id: n.user_id,
            similarity: n.similarity,
        }
    }
}

impl From<Neighbor> for NeighborResult {
    fn from(n: Neighbor) -> Self {
        NeighborResult {
            user_id: n.user_id,
            similarity: n.similarity,
        }
    }
}

impl TaskRequest {
    /// Build the request for one node from a borrowed chunk
    pub fn for_chunk(
        target_user: UserId,
        target_ratings: &UserRatings,
        chunk: &Chunk<'_>,
        k: usize,
        metric: SimilarityMetric,
    ) -> Self {
        TaskRequest {
            target_user,
            target_ratings: Some(RatingVector::from(target_ratings)),
            chunk: chunk
                .iter()
                .map(|(&user_id, &ratings)| (user_id, RatingVector::from(ratings)))
                .collect(),
            k: u32::try_from(k).unwrap_or(u32::MAX),
            metric: Metric::from(metric) as i32,
        }
    }

    /// The requested metric; unknown values are rejected rather than guessed
    pub fn similarity_metric(&self) -> Result<SimilarityMetric> {
        Metric::try_from(self.metric)
            .map(SimilarityMetric::from)
            .map_err(|_| ProtocolError::InvalidTask(format!("unknown metric {}", self.metric)))
    }
}

impl TaskResponse {
    pub fn from_neighbors(neighbors: Vec<NeighborResult>) -> Self {
        TaskResponse {
            partial_neighbors: neighbors.into_iter().map(Neighbor::from).collect(),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        TaskResponse {
            partial_neighbors: Vec::new(),
            error: Some(message.into()),
        }
    }

    pub fn into_neighbors(self) -> Vec<NeighborResult> {
        self.partial_neighbors
            .into_iter()
            .map(NeighborResult::from)
            .collect()
    }
}
