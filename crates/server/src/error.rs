use data_loader::UserId;
use node_protocol::ProtocolError;
use thiserror::Error;

/// Errors surfaced to callers of the recommendation and catalog operations.
///
/// Cache and store failures never show up here; they are logged and the
/// request falls through to the next stage.
#[derive(Error, Debug)]
pub enum RecommendError {
    #[error("A user id is required")]
    MissingUser,

    #[error("Invalid user id: {0}")]
    InvalidUser(String),

    #[error("User {0} not found")]
    UnknownUser(UserId),

    #[error("A genre is required")]
    MissingGenre,

    #[error("Node {index} ({addr}) failed: {source}")]
    Node {
        index: usize,
        addr: String,
        #[source]
        source: ProtocolError,
    },

    #[error("Dispatch task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RecommendError {
    /// HTTP-style status class for the error
    pub fn status_code(&self) -> u16 {
        match self {
            RecommendError::MissingUser
            | RecommendError::InvalidUser(_)
            | RecommendError::MissingGenre => 400,
            RecommendError::UnknownUser(_) => 404,
            RecommendError::Node { .. } | RecommendError::Join(_) | RecommendError::Config(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, RecommendError>;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stored record is malformed: {0}")]
    Malformed(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a cache or store read.
///
/// `NotFound` and `Transient` are kept apart for logging; the waterfall
/// treats both as a miss.
#[derive(Debug)]
pub enum Lookup<T, E> {
    Hit(T),
    NotFound,
    Transient(E),
}

impl<T, E> Lookup<T, E> {
    pub fn from_result(result: std::result::Result<Option<T>, E>) -> Self {
        match result {
            Ok(Some(value)) => Lookup::Hit(value),
            Ok(None) => Lookup::NotFound,
            Err(e) => Lookup::Transient(e),
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }
}
