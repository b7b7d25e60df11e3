//! Embedding record storage in `PostgreSQL`
//!
//! One vector per `(chunk, model)` pair, enforced by a database unique
//! constraint. `insert_if_absent` is the idempotency primitive: a retried or
//! racing producer re-inserting the same chunk observes a silent no-op
//! instead of a duplicate-key error, and exactly one row survives.

use crate::metadata_store::PostgresConfig;
use crate::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio_postgres::{Client, NoTls};

/// SHA-256 hex digest of embedded content, stored alongside each vector so
/// re-embedding passes can detect chunk text drift without re-reading chunks.
#[must_use]
pub fn content_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

/// One embedding vector for one content chunk under one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Owning source (video/transcript id)
    pub source_id: String,

    /// Chunk identifier within the source
    pub chunk_id: String,

    /// Embedding model identifier
    pub model_id: String,

    /// Declared dimensionality; must equal `vector.len()`
    pub dimensions: usize,

    /// Dense embedding vector
    pub vector: Vec<f32>,

    /// Hash of the embedded content (hex)
    pub content_hash: String,
}

/// Validate a record's vector shape before any write is attempted.
///
/// `contract` is the fixed dimensionality agreed for the record's model, if
/// one is registered. Violations fail fast instead of leaning on the
/// database's type coercion.
pub fn validate_dimensions(
    record: &EmbeddingRecord,
    contract: Option<usize>,
) -> StorageResult<()> {
    if record.vector.len() != record.dimensions {
        return Err(StorageError::DimensionMismatch {
            expected: record.dimensions,
            actual: record.vector.len(),
        });
    }

    if let Some(expected) = contract {
        if record.dimensions != expected {
            return Err(StorageError::DimensionMismatch {
                expected,
                actual: record.dimensions,
            });
        }
    }

    Ok(())
}

/// Embedding record storage trait
#[async_trait::async_trait]
pub trait EmbeddingStore: Send + Sync {
    /// Insert the record unless one already exists for `(chunk_id,
    /// model_id)`. Returns `true` when a row was created, `false` when the
    /// record was already present; both are success.
    async fn insert_if_absent(&self, record: &EmbeddingRecord) -> StorageResult<bool>;

    /// Number of stored vectors for `(source, model)`; callers use this to
    /// decide whether a full re-embedding pass is already complete.
    async fn count_for(&self, source_id: &str, model_id: &str) -> StorageResult<u64>;

    /// Remove every record owned by the source; returns the rows removed
    async fn delete_for_source(&self, source_id: &str) -> StorageResult<u64>;
}

/// `PostgreSQL` embedding store
pub struct PostgresEmbeddingStore {
    client: Client,
    model_dimensions: HashMap<String, usize>,
}

impl PostgresEmbeddingStore {
    /// Create a new `PostgreSQL` embedding store client
    pub async fn new(config: PostgresConfig) -> StorageResult<Self> {
        let (client, connection) = tokio_postgres::connect(&config.connection_string(), NoTls)
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        // Spawn connection in background
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(Self {
            client,
            model_dimensions: HashMap::new(),
        })
    }

    /// Register fixed dimensionality contracts per model id
    #[must_use]
    pub fn with_model_dimensions(mut self, contracts: HashMap<String, usize>) -> Self {
        self.model_dimensions = contracts;
        self
    }

    /// Initialize database schema (create tables if not exist)
    pub async fn init_schema(&self) -> StorageResult<()> {
        self.client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS embeddings (
                    id BIGSERIAL PRIMARY KEY,
                    source_id TEXT NOT NULL,
                    chunk_id TEXT NOT NULL,
                    model_id TEXT NOT NULL,
                    dimensions INTEGER NOT NULL,
                    embedding REAL[] NOT NULL,
                    content_hash TEXT NOT NULL,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT now(),
                    UNIQUE (chunk_id, model_id)
                )
                ",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_embeddings_source_model
                 ON embeddings(source_id, model_id)",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        tracing::info!("Embedding schema initialized");

        Ok(())
    }
}

#[async_trait::async_trait]
impl EmbeddingStore for PostgresEmbeddingStore {
    async fn insert_if_absent(&self, record: &EmbeddingRecord) -> StorageResult<bool> {
        validate_dimensions(record, self.model_dimensions.get(&record.model_id).copied())?;

        // The unique constraint makes this race-free: two workers inserting
        // the same (chunk, model) both succeed, exactly one row lands.
        let rows = self
            .client
            .execute(
                r"
                INSERT INTO embeddings
                (source_id, chunk_id, model_id, dimensions, embedding, content_hash)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (chunk_id, model_id) DO NOTHING
                ",
                &[
                    &record.source_id,
                    &record.chunk_id,
                    &record.model_id,
                    &(record.dimensions as i32),
                    &record.vector,
                    &record.content_hash,
                ],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        Ok(rows == 1)
    }

    async fn count_for(&self, source_id: &str, model_id: &str) -> StorageResult<u64> {
        let row = self
            .client
            .query_one(
                "SELECT count(*) FROM embeddings WHERE source_id = $1 AND model_id = $2",
                &[&source_id, &model_id],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        let count: i64 = row.get(0);
        Ok(count as u64)
    }

    async fn delete_for_source(&self, source_id: &str) -> StorageResult<u64> {
        let rows = self
            .client
            .execute("DELETE FROM embeddings WHERE source_id = $1", &[&source_id])
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        Ok(rows)
    }
}
