//! Tag sets and completion marks in `PostgreSQL`
//!
//! Tags are a derived, unordered collection scoped to `(subject, source)`
//! and replaced a whole generation at a time inside one transaction, so
//! readers never observe an empty window between delete and insert.
//!
//! Completion marks record the cache key each finished analysis pass was
//! computed under. A mark is written only after the pass's artifacts are
//! durably stored, which makes it the commit point for cache hits.

use crate::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_postgres::{Client, NoTls};
use video_insight_common::AnalysisKind;

/// Tags longer than this are truncated. Tags are display/search hints, not
/// identifiers.
pub const MAX_TAG_LEN: usize = 64;

/// Upper bound on tags stored per `(subject, source)` scope, guarding
/// against unbounded writes from a misbehaving producer.
pub const MAX_TAGS_PER_SCOPE: usize = 200;

const TAG_LIST_LIMIT: i64 = 500;

/// `PostgreSQL` configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Database host
    pub host: String,

    /// Database port
    pub port: u16,

    /// Database name
    pub database: String,

    /// Database user
    pub user: String,

    /// Database password
    pub password: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("POSTGRES_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5432),
            database: std::env::var("POSTGRES_DB").unwrap_or_else(|_| "video_insight".to_string()),
            user: std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("POSTGRES_PASSWORD").unwrap_or_default(),
        }
    }
}

impl PostgresConfig {
    /// Build connection string
    #[must_use]
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.database, self.user, self.password
        )
    }
}

fn normalize_tag(raw: &str) -> Option<String> {
    let tag = raw.trim().to_lowercase();
    if tag.is_empty() {
        return None;
    }
    if tag.chars().count() > MAX_TAG_LEN {
        return Some(tag.chars().take(MAX_TAG_LEN).collect());
    }
    Some(tag)
}

/// Normalize raw producer tags: trim, lowercase, length-cap, drop empties,
/// de-duplicate preserving first-seen order, cap the total count.
///
/// Collisions between raw tags that normalize to the same string are
/// resolved here, before any write happens.
#[must_use]
pub fn normalize_tags(raw_tags: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut unique = Vec::new();

    for raw in raw_tags {
        let Some(tag) = normalize_tag(raw) else {
            continue;
        };
        if seen.insert(tag.clone()) {
            unique.push(tag);
        }
        if unique.len() == MAX_TAGS_PER_SCOPE {
            break;
        }
    }

    unique
}

/// Durable completion record for one `(subject, kind)` analysis pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMark {
    pub subject_id: String,
    pub kind: AnalysisKind,
    /// Hex cache key the pass was computed under
    pub cache_key: String,
    pub completed_at: DateTime<Utc>,
}

/// Tag set storage trait
#[async_trait::async_trait]
pub trait TagStore: Send + Sync {
    /// Replace the entire tag generation for `(subject, source)` with the
    /// normalized form of `raw_tags`, atomically. Returns the stored set.
    /// At most one writer per scope is assumed.
    async fn replace(
        &self,
        subject_id: &str,
        source: &str,
        raw_tags: &[String],
    ) -> StorageResult<Vec<String>>;

    /// List stored tags for a subject, optionally filtered by source
    async fn list(&self, subject_id: &str, source: Option<&str>) -> StorageResult<Vec<String>>;
}

/// Completion mark storage trait
#[async_trait::async_trait]
pub trait MarkStore: Send + Sync {
    /// Fetch the completion mark for `(subject, kind)`, if any
    async fn get(&self, subject_id: &str, kind: AnalysisKind)
        -> StorageResult<Option<AnalysisMark>>;

    /// Record that a pass completed under the given cache key (upsert)
    async fn mark_completed(
        &self,
        subject_id: &str,
        kind: AnalysisKind,
        cache_key: &str,
    ) -> StorageResult<()>;

    /// Remove every mark for the subject; no-op when none exist
    async fn clear(&self, subject_id: &str) -> StorageResult<()>;
}

/// `PostgreSQL` metadata storage implementation
pub struct PostgresMetadataStore {
    // Mutex because tag replacement needs &mut Client for a transaction
    client: tokio::sync::Mutex<Client>,
}

impl PostgresMetadataStore {
    /// Create a new `PostgreSQL` metadata storage client
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
            client: tokio::sync::Mutex::new(client),
        })
    }

    /// Initialize database schema (create tables if not exist)
    pub async fn init_schema(&self) -> StorageResult<()> {
        let client = self.client.lock().await;

        client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS subject_tags (
                    id BIGSERIAL PRIMARY KEY,
                    subject_id TEXT NOT NULL,
                    tag TEXT NOT NULL,
                    source TEXT NOT NULL,
                    UNIQUE (subject_id, source, tag)
                )
                ",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS analysis_marks (
                    subject_id TEXT NOT NULL,
                    kind TEXT NOT NULL,
                    cache_key TEXT NOT NULL,
                    completed_at TIMESTAMP WITH TIME ZONE NOT NULL,
                    PRIMARY KEY (subject_id, kind)
                )
                ",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_subject_tags_subject ON subject_tags(subject_id)",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        tracing::info!("Metadata schema initialized");

        Ok(())
    }
}

#[async_trait::async_trait]
impl TagStore for PostgresMetadataStore {
    async fn replace(
        &self,
        subject_id: &str,
        source: &str,
        raw_tags: &[String],
    ) -> StorageResult<Vec<String>> {
        let source = source.trim();
        let tags = normalize_tags(raw_tags);

        let mut client = self.client.lock().await;
        let tx = client
            .transaction()
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        tx.execute(
            "DELETE FROM subject_tags WHERE subject_id = $1 AND source = $2",
            &[&subject_id, &source],
        )
        .await
        .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        // Already de-duplicated, so plain inserts inside the transaction
        for tag in &tags {
            tx.execute(
                "INSERT INTO subject_tags (subject_id, tag, source) VALUES ($1, $2, $3)",
                &[&subject_id, &tag, &source],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        tracing::debug!(
            "Replaced {} tags for subject {} source {}",
            tags.len(),
            subject_id,
            source
        );

        Ok(tags)
    }

    async fn list(&self, subject_id: &str, source: Option<&str>) -> StorageResult<Vec<String>> {
        let client = self.client.lock().await;

        let rows = client
            .query(
                r"
                SELECT tag
                FROM subject_tags
                WHERE subject_id = $1
                  AND ($2::text IS NULL OR source = $2)
                ORDER BY tag ASC
                LIMIT $3
                ",
                &[&subject_id, &source, &TAG_LIST_LIMIT],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }
}

#[async_trait::async_trait]
impl MarkStore for PostgresMetadataStore {
    async fn get(
        &self,
        subject_id: &str,
        kind: AnalysisKind,
    ) -> StorageResult<Option<AnalysisMark>> {
        let client = self.client.lock().await;

        let row = client
            .query_opt(
                r"
                SELECT subject_id, kind, cache_key, completed_at
                FROM analysis_marks
                WHERE subject_id = $1 AND kind = $2
                ",
                &[&subject_id, &kind.name()],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let kind_name: String = row.get(1);
        let kind = AnalysisKind::from_name(&kind_name).ok_or_else(|| {
            StorageError::SerializationError(format!("unknown analysis kind: {kind_name}"))
        })?;

        Ok(Some(AnalysisMark {
            subject_id: row.get(0),
            kind,
            cache_key: row.get(2),
            completed_at: row.get(3),
        }))
    }

    async fn mark_completed(
        &self,
        subject_id: &str,
        kind: AnalysisKind,
        cache_key: &str,
    ) -> StorageResult<()> {
        let client = self.client.lock().await;

        client
            .execute(
                r"
                INSERT INTO analysis_marks (subject_id, kind, cache_key, completed_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (subject_id, kind) DO UPDATE SET
                    cache_key = EXCLUDED.cache_key,
                    completed_at = EXCLUDED.completed_at
                ",
                &[&subject_id, &kind.name(), &cache_key, &Utc::now()],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        Ok(())
    }

    async fn clear(&self, subject_id: &str) -> StorageResult<()> {
        let client = self.client.lock().await;

        client
            .execute(
                "DELETE FROM analysis_marks WHERE subject_id = $1",
                &[&subject_id],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        Ok(())
    }
}
