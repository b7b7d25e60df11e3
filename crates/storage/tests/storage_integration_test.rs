//! Integration tests for storage backends
//!
//! These tests require live instances of `PostgreSQL` and `MinIO`.
//! Start services with: `docker-compose up -d`
//!
//! Run tests with: `cargo test --package video-insight-storage --test storage_integration_test -- --ignored --nocapture`
//!
//! All tests are marked with #[ignore] to prevent running in CI without live services.

use video_insight_common::AnalysisKind;
use video_insight_storage::*;

/// Check if `PostgreSQL` is available
async fn is_postgres_available() -> bool {
    tokio::net::TcpStream::connect("127.0.0.1:5432")
        .await
        .is_ok()
}

/// Check if `MinIO` is available
async fn is_minio_available() -> bool {
    tokio::net::TcpStream::connect("127.0.0.1:9000")
        .await
        .is_ok()
}

async fn embedding_store() -> PostgresEmbeddingStore {
    let store = PostgresEmbeddingStore::new(PostgresConfig::default())
        .await
        .expect("Failed to create embedding store");
    store.init_schema().await.expect("Failed to init schema");
    store
}

async fn metadata_store() -> PostgresMetadataStore {
    let store = PostgresMetadataStore::new(PostgresConfig::default())
        .await
        .expect("Failed to create metadata store");
    store.init_schema().await.expect("Failed to init schema");
    store
}

fn record(source_id: &str, chunk_id: &str) -> EmbeddingRecord {
    EmbeddingRecord {
        source_id: source_id.to_string(),
        chunk_id: chunk_id.to_string(),
        model_id: "nomic-embed-text".to_string(),
        dimensions: 4,
        vector: vec![0.1, 0.2, 0.3, 0.4],
        content_hash: "cafebabe".to_string(),
    }
}

// ============================================================================
// PostgreSQL Embedding Store Integration Tests
// ============================================================================

#[tokio::test]
#[ignore] // Requires PostgreSQL running on localhost:5432
async fn test_embedding_insert_is_idempotent() {
    if !is_postgres_available().await {
        eprintln!("PostgreSQL not available on 127.0.0.1:5432");
        eprintln!("Skipping test_embedding_insert_is_idempotent");
        return;
    }

    let store = embedding_store().await;
    let source = "it-idempotent-source";
    store
        .delete_for_source(source)
        .await
        .expect("Failed to clean up");

    let rec = record(source, "it-idempotent-chunk");

    let first = store
        .insert_if_absent(&rec)
        .await
        .expect("Failed to insert");
    assert!(first, "First insert should create a row");

    let second = store
        .insert_if_absent(&rec)
        .await
        .expect("Second insert should not error");
    assert!(!second, "Second insert should be a silent no-op");

    let count = store
        .count_for(source, "nomic-embed-text")
        .await
        .expect("Failed to count");
    assert_eq!(count, 1, "Exactly one row should survive");

    store
        .delete_for_source(source)
        .await
        .expect("Failed to clean up");
}

#[tokio::test]
#[ignore] // Requires PostgreSQL running on localhost:5432
async fn test_embedding_dimension_mismatch_stores_nothing() {
    if !is_postgres_available().await {
        eprintln!("PostgreSQL not available on 127.0.0.1:5432");
        eprintln!("Skipping test_embedding_dimension_mismatch_stores_nothing");
        return;
    }

    let store = embedding_store().await;
    let source = "it-dims-source";
    store
        .delete_for_source(source)
        .await
        .expect("Failed to clean up");

    let mut rec = record(source, "it-dims-chunk");
    rec.vector.pop(); // len 3, dimensions 4

    let err = store
        .insert_if_absent(&rec)
        .await
        .expect_err("Mismatched vector must fail");
    assert!(matches!(err, StorageError::DimensionMismatch { .. }));

    let count = store
        .count_for(source, "nomic-embed-text")
        .await
        .expect("Failed to count");
    assert_eq!(count, 0, "Nothing may be stored on dimension mismatch");
}

#[tokio::test]
#[ignore] // Requires PostgreSQL running on localhost:5432
async fn test_embedding_model_contract_enforced() {
    if !is_postgres_available().await {
        eprintln!("PostgreSQL not available on 127.0.0.1:5432");
        eprintln!("Skipping test_embedding_model_contract_enforced");
        return;
    }

    let store = embedding_store().await.with_model_dimensions(
        [("nomic-embed-text".to_string(), 768)].into_iter().collect(),
    );

    // Record is self-consistent (len == dimensions) but violates the
    // model's contracted dimensionality.
    let err = store
        .insert_if_absent(&record("it-contract-source", "it-contract-chunk"))
        .await
        .expect_err("Contract violation must fail");
    assert!(matches!(
        err,
        StorageError::DimensionMismatch {
            expected: 768,
            actual: 4
        }
    ));
}

// ============================================================================
// PostgreSQL Tag Store Integration Tests
// ============================================================================

#[tokio::test]
#[ignore] // Requires PostgreSQL running on localhost:5432
async fn test_tag_replace_normalizes_and_dedupes() {
    if !is_postgres_available().await {
        eprintln!("PostgreSQL not available on 127.0.0.1:5432");
        eprintln!("Skipping test_tag_replace_normalizes_and_dedupes");
        return;
    }

    let store = metadata_store().await;
    let subject = "it-tags-subject";

    let stored = store
        .replace(
            subject,
            "x",
            &["A".to_string(), "a".to_string(), " a ".to_string()],
        )
        .await
        .expect("Failed to replace tags");
    assert_eq!(stored, vec!["a".to_string()]);

    let listed = store
        .list(subject, Some("x"))
        .await
        .expect("Failed to list tags");
    assert_eq!(listed, vec!["a".to_string()]);

    store
        .replace(subject, "x", &[])
        .await
        .expect("Failed to clean up");
}

#[tokio::test]
#[ignore] // Requires PostgreSQL running on localhost:5432
async fn test_tag_replace_swaps_whole_generation() {
    if !is_postgres_available().await {
        eprintln!("PostgreSQL not available on 127.0.0.1:5432");
        eprintln!("Skipping test_tag_replace_swaps_whole_generation");
        return;
    }

    let store = metadata_store().await;
    let subject = "it-tags-generation";

    store
        .replace(subject, "ner", &["old-one".to_string(), "old-two".to_string()])
        .await
        .expect("Failed to write first generation");

    store
        .replace(subject, "ner", &["new-one".to_string()])
        .await
        .expect("Failed to write second generation");

    let listed = store
        .list(subject, Some("ner"))
        .await
        .expect("Failed to list tags");
    assert_eq!(listed, vec!["new-one".to_string()]);

    store
        .replace(subject, "ner", &[])
        .await
        .expect("Failed to clean up");
}

#[tokio::test]
#[ignore] // Requires PostgreSQL running on localhost:5432
async fn test_tag_scopes_are_independent() {
    if !is_postgres_available().await {
        eprintln!("PostgreSQL not available on 127.0.0.1:5432");
        eprintln!("Skipping test_tag_scopes_are_independent");
        return;
    }

    let store = metadata_store().await;
    let subject = "it-tags-scopes";

    store
        .replace(subject, "ner", &["entity".to_string()])
        .await
        .expect("Failed to write ner tags");
    store
        .replace(subject, "vision", &["outdoor".to_string()])
        .await
        .expect("Failed to write vision tags");

    // Replacing one scope must not touch the other
    store
        .replace(subject, "ner", &["person".to_string()])
        .await
        .expect("Failed to rewrite ner tags");

    let vision = store
        .list(subject, Some("vision"))
        .await
        .expect("Failed to list vision tags");
    assert_eq!(vision, vec!["outdoor".to_string()]);

    let all = store.list(subject, None).await.expect("Failed to list all");
    assert_eq!(all, vec!["outdoor".to_string(), "person".to_string()]);

    store.replace(subject, "ner", &[]).await.unwrap();
    store.replace(subject, "vision", &[]).await.unwrap();
}

// ============================================================================
// PostgreSQL Mark Store Integration Tests
// ============================================================================

#[tokio::test]
#[ignore] // Requires PostgreSQL running on localhost:5432
async fn test_marks_upsert_and_clear() {
    if !is_postgres_available().await {
        eprintln!("PostgreSQL not available on 127.0.0.1:5432");
        eprintln!("Skipping test_marks_upsert_and_clear");
        return;
    }

    let store = metadata_store().await;
    let subject = "it-marks-subject";
    store.clear(subject).await.expect("Failed to clean up");

    assert!(store
        .get(subject, AnalysisKind::Keyframes)
        .await
        .expect("Failed to get mark")
        .is_none());

    store
        .mark_completed(subject, AnalysisKind::Keyframes, "aaaa")
        .await
        .expect("Failed to mark completed");

    let mark = store
        .get(subject, AnalysisKind::Keyframes)
        .await
        .expect("Failed to get mark")
        .expect("Mark should exist");
    assert_eq!(mark.cache_key, "aaaa");
    assert_eq!(mark.kind, AnalysisKind::Keyframes);

    // Upsert with a new key replaces the old mark
    store
        .mark_completed(subject, AnalysisKind::Keyframes, "bbbb")
        .await
        .expect("Failed to re-mark");
    let mark = store
        .get(subject, AnalysisKind::Keyframes)
        .await
        .expect("Failed to get mark")
        .expect("Mark should exist");
    assert_eq!(mark.cache_key, "bbbb");

    store.clear(subject).await.expect("Failed to clear");
    assert!(store
        .get(subject, AnalysisKind::Keyframes)
        .await
        .expect("Failed to get mark")
        .is_none());
}

// ============================================================================
// MinIO Frame Store Integration Tests
// ============================================================================

#[tokio::test]
#[ignore] // Requires MinIO running on localhost:9000
async fn test_minio_frame_lifecycle() {
    if !is_minio_available().await {
        eprintln!("MinIO not available on 127.0.0.1:9000");
        eprintln!("Start with: docker-compose up -d minio");
        eprintln!("Skipping test_minio_frame_lifecycle");
        return;
    }

    let config = S3Config {
        bucket: "video-insight".to_string(),
        region: "us-east-1".to_string(),
        endpoint: Some("http://localhost:9000".to_string()),
        access_key_id: "minioadmin".to_string(),
        secret_access_key: "minioadmin".to_string(),
        prefix: "test/".to_string(),
        output_format: "jpg".to_string(),
    };

    let store = S3FrameStore::new(config)
        .await
        .expect("Failed to create S3 frame store");

    let subject = "it-minio-subject";
    let data = b"jpeg frame bytes";

    let locator = store
        .save(subject, 3, data)
        .await
        .expect("Failed to save frame");
    assert_eq!(locator, "test/it-minio-subject/frame_000003.jpg");

    let loaded = store.load(&locator).await.expect("Failed to load frame");
    assert_eq!(loaded, data);

    assert!(store
        .exists(subject, 3)
        .await
        .expect("Failed to check existence"));
    assert_eq!(
        store.url_for(&locator),
        "s3://video-insight/test/it-minio-subject/frame_000003.jpg"
    );

    store
        .delete_all(subject)
        .await
        .expect("Failed to delete frames");

    assert!(matches!(
        store.load(&locator).await,
        Err(StorageError::NotFound(_))
    ));

    println!("✅ MinIO integration test passed: save, load, exists, delete_all");
}
