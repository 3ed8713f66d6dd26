//! Static service configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use knn::SimilarityMetric;
use node_protocol::{DEFAULT_MAX_FRAME_LEN, DEFAULT_NODE_TIMEOUT};
use serde::{Deserialize, Serialize};

use crate::error::{RecommendError, Result};

pub const DEFAULT_K: usize = 50;
pub const DEFAULT_TOP_N: usize = 10;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// How the coordinator talks to its nodes within one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// All nodes at once, joined before the merge
    #[default]
    Concurrent,
    /// Node 0, then node 1, ...
    Sequential,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Concurrent => f.write_str("concurrent"),
            DispatchMode::Sequential => f.write_str("sequential"),
        }
    }
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "concurrent" => Ok(DispatchMode::Concurrent),
            "sequential" => Ok(DispatchMode::Sequential),
            other => Err(format!("unknown dispatch mode '{}'", other)),
        }
    }
}

/// Everything the recommendation service needs besides its data and
/// backends. Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Worker node addresses; chunk `i` always goes to `nodes[i]`
    pub nodes: Vec<String>,
    /// Global neighborhood size
    pub k: usize,
    /// Number of recommendations returned
    pub top_n: usize,
    pub cache_ttl: Duration,
    /// Per-stage timeout for node I/O
    pub node_timeout: Duration,
    /// Timeout for each cache or store call
    pub store_timeout: Duration,
    /// Largest node frame sent or accepted; nodes must be started with at
    /// least this limit
    pub max_frame_len: usize,
    pub dispatch: DispatchMode,
    pub metric: SimilarityMetric,
}

impl ServiceConfig {
    pub fn new(nodes: Vec<String>) -> Self {
        Self {
            nodes,
            k: DEFAULT_K,
            top_n: DEFAULT_TOP_N,
            cache_ttl: DEFAULT_CACHE_TTL,
            node_timeout: DEFAULT_NODE_TIMEOUT,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            dispatch: DispatchMode::default(),
            metric: SimilarityMetric::default(),
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(RecommendError::Config("at least one node address is required".into()));
        }
        if let Some(blank) = self.nodes.iter().position(|addr| addr.trim().is_empty()) {
            return Err(RecommendError::Config(format!("node {} has an empty address", blank)));
        }
        if self.k == 0 {
            return Err(RecommendError::Config("k must be at least 1".into()));
        }
        if self.top_n == 0 {
            return Err(RecommendError::Config("top_n must be at least 1".into()));
        }
        if self.max_frame_len == 0 || self.max_frame_len > u32::MAX as usize {
            return Err(RecommendError::Config(format!(
                "max_frame_len must be between 1 and {}",
                u32::MAX
            )));
        }
        Ok(())
    }
}
