//! Cache → store → compute waterfall around the coordinator.
//!
//! ```text
//! cache hit ───────────────────────────────────────────────▶ respond
//! cache miss ─▶ store hit ─▶ populate cache ───────────────▶ respond
//!               store miss ─▶ compute ─▶ spawn persist
//!                                      ─▶ populate cache ──▶ respond
//! ```
//!
//! Cache and store problems are logged and treated as misses. Only input
//! errors and node failures reach the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use data_loader::{DataIndex, UserId};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use crate::cache::{cache_key, RecommendationCache};
use crate::config::ServiceConfig;
use crate::coordinator::{Coordinator, RecommendedItem};
use crate::error::{Lookup, RecommendError, Result};
use crate::store::{InsertOutcome, RecommendationRecord, RecommendationStore};

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Cache,
    Store,
    Computed,
}

/// Result of the detached persistence task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Inserted,
    /// Another request stored a record for this user first
    AlreadyExists,
    /// Logged and dropped
    Failed,
}

/// A served recommendation
#[derive(Debug)]
pub struct Served {
    pub user_id: UserId,
    pub items: Vec<RecommendedItem>,
    pub source: Source,
    /// Present only for freshly computed results. Dropping the handle leaves
    /// the write running in the background.
    pub persistence: Option<JoinHandle<PersistOutcome>>,
}

/// Recommendation entry point shared by every request
#[derive(Clone)]
pub struct RecommendationService {
    coordinator: Coordinator,
    cache: Arc<dyn RecommendationCache>,
    store: Arc<dyn RecommendationStore>,
    cache_ttl: Duration,
    store_timeout: Duration,
}

impl RecommendationService {
    pub fn new(
        data_index: Arc<DataIndex>,
        config: ServiceConfig,
        cache: Arc<dyn RecommendationCache>,
        store: Arc<dyn RecommendationStore>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            coordinator: Coordinator::new(data_index, &config),
            cache,
            store,
            cache_ttl: config.cache_ttl,
            store_timeout: config.store_timeout,
        })
    }

    pub fn data_index(&self) -> &DataIndex {
        self.coordinator.data_index()
    }

    #[instrument(skip(self))]
    pub async fn recommend(&self, user_id: UserId) -> Result<Served> {
        if !self.data_index().contains_user(user_id) {
            return Err(RecommendError::UnknownUser(user_id));
        }
        let key = cache_key(user_id);

        if let Some(items) = self.check_cache(&key).await {
            info!("Cache hit for user {}", user_id);
            return Ok(Served {
                user_id,
                items,
                source: Source::Cache,
                persistence: None,
            });
        }

        if let Some(record) = self.check_store(user_id).await {
            info!("Store hit for user {}, backfilling cache", user_id);
            self.populate_cache(&key, &record.recommended).await;
            return Ok(Served {
                user_id,
                items: record.recommended,
                source: Source::Store,
                persistence: None,
            });
        }

        let start = Instant::now();
        let items = self.coordinator.recommend(user_id).await?;
        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let record = RecommendationRecord::new(user_id, items.clone(), latency_ms);
        let persistence = self.spawn_persist(record);
        self.populate_cache(&key, &items).await;

        Ok(Served {
            user_id,
            items,
            source: Source::Computed,
            persistence: Some(persistence),
        })
    }

    async fn check_cache(&self, key: &str) -> Option<Vec<RecommendedItem>> {
        let payload = match with_timeout(self.store_timeout, self.cache.get(key)).await {
            Some(Lookup::Hit(payload)) => payload,
            Some(Lookup::NotFound) => {
                debug!(key = %key, "Cache miss");
                return None;
            }
            Some(Lookup::Transient(e)) => {
                warn!(key = %key, error = %e, "Cache lookup failed, continuing");
                return None;
            }
            None => {
                warn!(key = %key, "Cache lookup timed out, continuing");
                return None;
            }
        };

        match serde_json::from_str(&payload) {
            Ok(items) => Some(items),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached value is unreadable, ignoring");
                None
            }
        }
    }

    async fn check_store(&self, user_id: UserId) -> Option<RecommendationRecord> {
        match with_timeout(self.store_timeout, self.store.find(user_id)).await {
            Some(Lookup::Hit(record)) => Some(record),
            Some(Lookup::NotFound) => {
                debug!("No stored recommendation for user {}", user_id);
                None
            }
            Some(Lookup::Transient(e)) => {
                warn!(error = %e, "Store lookup failed for user {}, recomputing", user_id);
                None
            }
            None => {
                warn!("Store lookup timed out for user {}, recomputing", user_id);
                None
            }
        }
    }

    /// Best effort; the response does not depend on it
    async fn populate_cache(&self, key: &str, items: &[RecommendedItem]) {
        let payload = match serde_json::to_string(items) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize recommendations for cache");
                return;
            }
        };

        match with_timeout(self.store_timeout, self.cache.set(key, payload, self.cache_ttl)).await {
            Some(Ok(())) => debug!(key = %key, "Cached recommendations"),
            Some(Err(e)) => warn!(key = %key, error = %e, "Cache write failed"),
            None => warn!(key = %key, "Cache write timed out"),
        }
    }

    fn spawn_persist(&self, record: RecommendationRecord) -> JoinHandle<PersistOutcome> {
        let store = Arc::clone(&self.store);
        let timeout = self.store_timeout;
        let span = info_span!("persist", user_id = record.user_id);
        tokio::spawn(async move { persist(store.as_ref(), &record, timeout).await }.instrument(span))
    }
}

/// Store `record` unless the user already has one.
///
/// The existence check keeps duplicate work off the store; the store's own
/// uniqueness constraint decides races between concurrent requests.
async fn persist(
    store: &dyn RecommendationStore,
    record: &RecommendationRecord,
    timeout: Duration,
) -> PersistOutcome {
    match with_timeout(timeout, store.find(record.user_id)).await {
        Some(Lookup::Hit(_)) => {
            info!("Recommendation already stored, skipping insert");
            return PersistOutcome::AlreadyExists;
        }
        Some(Lookup::NotFound) => {}
        Some(Lookup::Transient(e)) => {
            error!(error = %e, "Existence check failed, not persisting");
            return PersistOutcome::Failed;
        }
        None => {
            error!("Existence check timed out, not persisting");
            return PersistOutcome::Failed;
        }
    }

    match with_timeout(timeout, store.insert(record)).await {
        Some(Ok(InsertOutcome::Inserted)) => {
            info!(latency_ms = record.latency_ms, "Recommendation persisted");
            PersistOutcome::Inserted
        }
        Some(Ok(InsertOutcome::AlreadyExists)) => {
            info!("Lost the insert race, record already present");
            PersistOutcome::AlreadyExists
        }
        Some(Err(e)) => {
            error!(error = %e, "Failed to persist recommendation");
            PersistOutcome::Failed
        }
        None => {
            error!("Persisting recommendation timed out");
            PersistOutcome::Failed
        }
    }
}

async fn with_timeout<F: Future>(timeout: Duration, fut: F) -> Option<F::Output> {
    tokio::time::timeout(timeout, fut).await.ok()
}
