//! Storage layer for cached analysis artifacts
//!
//! This crate provides the idempotent stores behind the analysis cache:
//! - **Frame store (filesystem or S3/MinIO)**: extracted keyframe blobs,
//!   addressed by `(subject, frame index)`
//! - **Vector store (`PostgreSQL`)**: embedding records with conflict-free
//!   insert-if-absent semantics
//! - **Metadata store (`PostgreSQL`)**: tag sets replaced transactionally per
//!   `(subject, source)` scope, and completion marks recording which cache
//!   key each finished analysis pass was computed under
//!
//! # Idempotency
//!
//! Every write here is safe to repeat: frame saves overwrite byte-identical
//! content, vector inserts no-op on `(chunk, model)` conflicts, tag
//! replacement swaps whole generations inside one transaction, and deletes
//! of absent state succeed. Retried workers therefore never produce
//! duplicate artifacts or duplicate-key errors.
//!
//! # Example
//!
//! ```rust,no_run
//! use video_insight_storage::{FrameStore, FrameStoreConfig, LocalFrameStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), video_insight_storage::StorageError> {
//!     let store = LocalFrameStore::new(FrameStoreConfig::default());
//!
//!     let locator = store.save("video-123", 0, b"jpeg bytes...").await?;
//!     let bytes = store.load(&locator).await?;
//!     assert_eq!(bytes, b"jpeg bytes...");
//!
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod frame_store;
pub mod metadata_store;
pub mod vector_store;

pub use frame_store::{FrameStore, FrameStoreConfig, LocalFrameStore, S3Config, S3FrameStore};
pub use metadata_store::{
    normalize_tags, AnalysisMark, MarkStore, PostgresConfig, PostgresMetadataStore, TagStore,
};
pub use vector_store::{
    content_hash, validate_dimensions, EmbeddingRecord, EmbeddingStore, PostgresEmbeddingStore,
};

/// Storage layer errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("S3 error: {0}")]
    S3Error(String),

    #[error("PostgreSQL error: {0}")]
    PostgresError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Complete storage configuration for all backends
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Local frame store configuration
    #[serde(default)]
    pub frames: FrameStoreConfig,

    /// S3/MinIO configuration for blob storage
    #[serde(default)]
    pub s3: S3Config,

    /// `PostgreSQL` configuration for vectors, tags and completion marks
    #[serde(default)]
    pub postgres: PostgresConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert_eq!(config.s3.bucket, "video-insight");
        assert_eq!(config.postgres.database, "video_insight");
        assert_eq!(config.frames.output_format, "jpg");
    }
}
