//! Durable recommendation store.
//!
//! Holds at most one [`RecommendationRecord`] per user. The uniqueness key is
//! the only thing that keeps concurrent first-time requests from writing
//! duplicates, so every backend must enforce it on insert.

use std::collections::HashMap;

use async_trait::async_trait;
use data_loader::UserId;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::Row;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::coordinator::RecommendedItem;
use crate::error::{Lookup, StoreError};

/// Snapshot of one computed recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub user_id: UserId,
    pub recommended: Vec<RecommendedItem>,
    /// Time spent computing the recommendation
    pub latency_ms: u64,
    pub created_at_unix: i64,
}

impl RecommendationRecord {
    pub fn new(user_id: UserId, recommended: Vec<RecommendedItem>, latency_ms: u64) -> Self {
        Self {
            user_id,
            recommended,
            latency_ms,
            created_at_unix: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record for the user was already present; nothing was written
    AlreadyExists,
}

#[async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn find(&self, user_id: UserId) -> Lookup<RecommendationRecord, StoreError>;

    /// Insert unless a record for the user exists
    async fn insert(&self, record: &RecommendationRecord) -> Result<InsertOutcome, StoreError>;
}

/// In-process store keyed by user id
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<UserId, RecommendationRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[async_trait]
impl RecommendationStore for MemoryStore {
    async fn find(&self, user_id: UserId) -> Lookup<RecommendationRecord, StoreError> {
        match self.records.lock().await.get(&user_id) {
            Some(record) => Lookup::Hit(record.clone()),
            None => Lookup::NotFound,
        }
    }

    async fn insert(&self, record: &RecommendationRecord) -> Result<InsertOutcome, StoreError> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.user_id) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        records.insert(record.user_id, record.clone());
        Ok(InsertOutcome::Inserted)
    }
}

/// PostgreSQL store; `user_id` is the primary key
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Create the recommendations table if it does not exist
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS recommendations (
                user_id BIGINT PRIMARY KEY,
                recommended JSONB NOT NULL,
                latency_ms BIGINT NOT NULL,
                created_at_unix BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        info!("Recommendations table ready");
        Ok(())
    }
}

#[async_trait]
impl RecommendationStore for PostgresStore {
    async fn find(&self, user_id: UserId) -> Lookup<RecommendationRecord, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, recommended, latency_ms, created_at_unix
            FROM recommendations
            WHERE user_id = $1
            "#,
        )
        .bind(i64::from(user_id))
        .fetch_optional(&self.pool)
        .await;

        let row = match row {
            Ok(Some(row)) => row,
            Ok(None) => return Lookup::NotFound,
            Err(e) => return Lookup::Transient(StoreError::Database(e)),
        };

        let decoded = (|| -> Result<RecommendationRecord, StoreError> {
            let stored_user: i64 = row.try_get("user_id")?;
            let Json(recommended): Json<Vec<RecommendedItem>> = row.try_get("recommended")?;
            let latency_ms: i64 = row.try_get("latency_ms")?;
            Ok(RecommendationRecord {
                user_id: UserId::try_from(stored_user)
                    .map_err(|_| StoreError::Malformed(format!("user_id {}", stored_user)))?,
                recommended,
                latency_ms: u64::try_from(latency_ms).unwrap_or(0),
                created_at_unix: row.try_get("created_at_unix")?,
            })
        })();

        match decoded {
            Ok(record) => Lookup::Hit(record),
            Err(e) => Lookup::Transient(e),
        }
    }

    async fn insert(&self, record: &RecommendationRecord) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO recommendations (user_id, recommended, latency_ms, created_at_unix)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(i64::from(record.user_id))
        .bind(Json(&record.recommended))
        .bind(i64::try_from(record.latency_ms).unwrap_or(i64::MAX))
        .bind(record.created_at_unix)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(InsertOutcome::Inserted)
        } else {
            debug!(user_id = record.user_id, "Recommendation already stored (duplicate)");
            Ok(InsertOutcome::AlreadyExists)
        }
    }
}
