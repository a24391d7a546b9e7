use crate::models::TargetId;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("target id out of range: {0}")]
    IdOutOfRange(TargetId),
    #[error("invalid stored value: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Row id for `target`, rejecting ids no store can hold
pub fn row_id(target: &TargetId) -> StorageResult<i64> {
    i64::try_from(target.id).map_err(|_| StorageError::IdOutOfRange(*target))
}

/// Per-target metadata (posts and terms alike)
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Get a metadata value, `None` if it was never set
    async fn get_meta(&self, target: &TargetId, key: &str) -> StorageResult<Option<Value>>;

    /// Insert or overwrite a metadata value
    async fn set_meta(&self, target: &TargetId, key: &str, value: Value) -> StorageResult<()>;

    /// All targets whose `key` currently equals `value`, ordered by kind then id
    async fn targets_with_meta(&self, key: &str, value: &Value) -> StorageResult<Vec<TargetId>>;
}

/// Site-wide options
#[async_trait]
pub trait OptionStore: Send + Sync {
    async fn get_option(&self, key: &str) -> StorageResult<Option<Value>>;

    async fn set_option(&self, key: &str, value: Value) -> StorageResult<()>;
}
