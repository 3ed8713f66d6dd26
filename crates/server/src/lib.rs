//! Coordinator side of the recommendation engine.
//!
//! [`RecommendationService`] is the entry point: it checks the cache, then
//! the durable store, and only then asks the [`Coordinator`] to fan the
//! request out to the worker nodes. Catalog queries live in [`catalog`].

pub mod cache;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod store;
pub mod waterfall;

pub use cache::{cache_key, MemoryCache, RecommendationCache, RedisCache};
pub use config::{DispatchMode, ServiceConfig};
pub use coordinator::{Coordinator, RecommendedItem};
pub use error::{CacheError, Lookup, RecommendError, Result, StoreError};
pub use store::{InsertOutcome, MemoryStore, PostgresStore, RecommendationRecord, RecommendationStore};
pub use waterfall::{PersistOutcome, RecommendationService, Served, Source};
