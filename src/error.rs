use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("model training failed: {0}")]
    ModelTraining(String),

    #[error("business rule query failed: {0}")]
    FilterQuery(String),

    #[error("invalid preference: {0}")]
    InvalidPreference(String),

    #[error("storage error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("model rebuild timed out after {0}s")]
    Timeout(u64),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
