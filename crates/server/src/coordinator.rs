//! # Recommendation Coordinator
//!
//! Computes one user's recommendations from scratch:
//! 1. Partition the rating matrix, one chunk per node
//! 2. Ship every chunk to its node and collect the partial neighbor lists
//! 3. Merge the partials into the global top-K neighborhood
//! 4. Predict ratings for movies the user has not seen
//! 5. Keep the top N
//!
//! Any node failure aborts the computation; no partial answer is produced.

use std::sync::Arc;
use std::time::Instant;

use data_loader::{DataIndex, MovieId, UserId};
use knn::{NeighborResult, PredictedRating, SimilarityMetric};
use node_protocol::{NodeClient, TaskRequest};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

use crate::config::{DispatchMode, ServiceConfig};
use crate::error::{RecommendError, Result};

/// One recommended movie as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendedItem {
    pub movie_id: MovieId,
    pub predicted: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Fans a request out to the worker nodes and folds the answers together
#[derive(Clone)]
pub struct Coordinator {
    data_index: Arc<DataIndex>,
    nodes: Vec<NodeClient>,
    k: usize,
    top_n: usize,
    metric: SimilarityMetric,
    dispatch: DispatchMode,
}

impl Coordinator {
    pub fn new(data_index: Arc<DataIndex>, config: &ServiceConfig) -> Self {
        let nodes = config
            .nodes
            .iter()
            .map(|addr| {
                NodeClient::new(addr.clone())
                    .with_timeout(config.node_timeout)
                    .with_max_frame_len(config.max_frame_len)
            })
            .collect();
        Self {
            data_index,
            nodes,
            k: config.k,
            top_n: config.top_n,
            metric: config.metric,
            dispatch: config.dispatch,
        }
    }

    pub fn data_index(&self) -> &Arc<DataIndex> {
        &self.data_index
    }

    /// Main entry point: compute the top-N recommendations for a user
    #[instrument(skip(self), fields(nodes = self.nodes.len(), dispatch = %self.dispatch))]
    pub async fn recommend(&self, user_id: UserId) -> Result<Vec<RecommendedItem>> {
        let start_time = Instant::now();

        if !self.data_index.contains_user(user_id) {
            return Err(RecommendError::UnknownUser(user_id));
        }

        let requests = self.build_requests(user_id).await?;
        debug!("Built {} node tasks", requests.len());

        let partials = match self.dispatch {
            DispatchMode::Concurrent => self.dispatch_concurrent(requests).await?,
            DispatchMode::Sequential => self.dispatch_sequential(requests).await?,
        };
        let candidates: usize = partials.iter().map(Vec::len).sum();
        info!("Collected {} candidate neighbors from {} nodes", candidates, partials.len());

        let neighbors = knn::merge_top_k(partials, self.k);
        let predictions = self.predict(user_id, &neighbors);
        info!(
            "Predicted {} unseen movies from {} neighbors",
            predictions.len(),
            neighbors.len()
        );

        let recommendations = self.rank_and_select(predictions);
        info!(
            "Computed {} recommendations for user {} in {:.2?}",
            recommendations.len(),
            user_id,
            start_time.elapsed()
        );
        Ok(recommendations)
    }

    /// Partition the matrix and encode one task per node
    async fn build_requests(&self, user_id: UserId) -> Result<Vec<TaskRequest>> {
        let data_index = Arc::clone(&self.data_index);
        let parts = self.nodes.len();
        let k = self.k;
        let metric = self.metric;

        let requests: Vec<TaskRequest> = tokio::task::spawn_blocking(move || {
            let Some(target) = data_index.user_vector(user_id) else {
                return Vec::new();
            };
            knn::partition(data_index.matrix(), parts)
                .iter()
                .map(|chunk| TaskRequest::for_chunk(user_id, target, chunk, k, metric))
                .collect()
        })
        .await?;
        Ok(requests)
    }

    /// Every node at once; the first failure cancels the rest
    async fn dispatch_concurrent(
        &self,
        requests: Vec<TaskRequest>,
    ) -> Result<Vec<Vec<NeighborResult>>> {
        let mut tasks = JoinSet::new();
        for (index, request) in requests.into_iter().enumerate() {
            let client = self.nodes[index].clone();
            tasks.spawn(async move { (index, client.send_task(&request).await) });
        }

        let mut partials: Vec<Vec<NeighborResult>> = vec![Vec::new(); self.nodes.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined?;
            match result {
                Ok(neighbors) => partials[index] = neighbors,
                Err(source) => {
                    tasks.abort_all();
                    return Err(self.node_failure(index, source));
                }
            }
        }
        Ok(partials)
    }

    /// Node 0, node 1, ... stopping at the first failure
    async fn dispatch_sequential(
        &self,
        requests: Vec<TaskRequest>,
    ) -> Result<Vec<Vec<NeighborResult>>> {
        let mut partials = Vec::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            let neighbors = self.nodes[index]
                .send_task(request)
                .await
                .map_err(|source| self.node_failure(index, source))?;
            partials.push(neighbors);
        }
        Ok(partials)
    }

    fn node_failure(&self, index: usize, source: node_protocol::ProtocolError) -> RecommendError {
        let addr = self.nodes[index].addr().to_string();
        error!("Node {} ({}) failed: {}", index, addr, source);
        RecommendError::Node {
            index,
            addr,
            source,
        }
    }

    fn predict(&self, user_id: UserId, neighbors: &[NeighborResult]) -> Vec<PredictedRating> {
        match self.data_index.user_vector(user_id) {
            Some(target) => knn::predict_ratings(target, neighbors, self.data_index.matrix()),
            None => Vec::new(),
        }
    }

    /// Keep the best N and attach catalog titles
    fn rank_and_select(&self, predictions: Vec<PredictedRating>) -> Vec<RecommendedItem> {
        knn::top_n(predictions, self.top_n)
            .into_iter()
            .map(|p| RecommendedItem {
                movie_id: p.movie_id,
                predicted: p.predicted,
                title: self.data_index.title(p.movie_id).map(str::to_owned),
            })
            .collect()
    }
}
