//! Frame blob storage on the local filesystem or S3/MinIO
//!
//! Extracted keyframes are binary artifacts owned by one subject. Writes are
//! idempotent overwrites keyed by `(subject, frame index)`; deletion removes
//! the whole subject scope at once.

use crate::{StorageError, StorageResult};
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Width frame indices are zero-padded to, so lexical and numeric ordering
/// agree for any external tool iterating blobs.
const FRAME_INDEX_WIDTH: usize = 6;

/// File name for one frame within a subject's scope
#[must_use]
pub fn frame_file_name(frame_index: u32, output_format: &str) -> String {
    format!("frame_{frame_index:0width$}.{output_format}", width = FRAME_INDEX_WIDTH)
}

/// Local frame store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameStoreConfig {
    /// Directory holding one subdirectory per subject
    pub base_dir: PathBuf,

    /// Blob file extension (e.g. "jpg", "png")
    pub output_format: String,
}

impl Default for FrameStoreConfig {
    fn default() -> Self {
        Self {
            base_dir: std::env::var("VIDEO_INSIGHT_FRAMES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".run/frames")),
            output_format: "jpg".to_string(),
        }
    }
}

/// Frame blob storage trait
#[async_trait::async_trait]
pub trait FrameStore: Send + Sync {
    /// Store one frame; overwrites any prior blob at the same index and
    /// returns its locator. Does not consult the cache key: callers that
    /// rely on cache semantics check `exists` first.
    async fn save(&self, subject_id: &str, frame_index: u32, data: &[u8]) -> StorageResult<String>;

    /// Retrieve a frame by locator; `NotFound` if it does not resolve
    async fn load(&self, locator: &str) -> StorageResult<Vec<u8>>;

    /// Check whether a frame exists at `(subject, index)`
    async fn exists(&self, subject_id: &str, frame_index: u32) -> StorageResult<bool>;

    /// Externally addressable reference for a locator (no I/O)
    fn url_for(&self, locator: &str) -> String;

    /// List all frame locators owned by a subject, in index order
    async fn list(&self, subject_id: &str) -> StorageResult<Vec<String>>;

    /// Remove every blob owned by the subject; no-op when nothing exists
    async fn delete_all(&self, subject_id: &str) -> StorageResult<()>;
}

/// Filesystem-backed frame store
pub struct LocalFrameStore {
    base_dir: PathBuf,
    output_format: String,
}

impl LocalFrameStore {
    /// Create a new local frame store
    #[must_use]
    pub fn new(config: FrameStoreConfig) -> Self {
        Self {
            base_dir: config.base_dir,
            output_format: config.output_format,
        }
    }

    fn subject_dir(&self, subject_id: &str) -> PathBuf {
        self.base_dir.join(subject_id)
    }

    fn frame_path(&self, subject_id: &str, frame_index: u32) -> PathBuf {
        self.subject_dir(subject_id)
            .join(frame_file_name(frame_index, &self.output_format))
    }
}

#[async_trait::async_trait]
impl FrameStore for LocalFrameStore {
    async fn save(&self, subject_id: &str, frame_index: u32, data: &[u8]) -> StorageResult<String> {
        let dir = self.subject_dir(subject_id);
        tokio::fs::create_dir_all(&dir).await?;

        let path = self.frame_path(subject_id, frame_index);
        tokio::fs::write(&path, data).await?;

        tracing::debug!(
            "Stored frame {} for subject {} ({} bytes)",
            frame_index,
            subject_id,
            data.len()
        );

        Ok(path.to_string_lossy().into_owned())
    }

    async fn load(&self, locator: &str) -> StorageResult<Vec<u8>> {
        tokio::fs::read(locator).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(locator.to_string())
            } else {
                StorageError::IoError(e)
            }
        })
    }

    async fn exists(&self, subject_id: &str, frame_index: u32) -> StorageResult<bool> {
        Ok(tokio::fs::try_exists(self.frame_path(subject_id, frame_index)).await?)
    }

    fn url_for(&self, locator: &str) -> String {
        locator.to_string()
    }

    async fn list(&self, subject_id: &str) -> StorageResult<Vec<String>> {
        let dir = self.subject_dir(subject_id);

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut locators = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("frame_") && name.ends_with(&format!(".{}", self.output_format)) {
                locators.push(entry.path().to_string_lossy().into_owned());
            }
        }

        // Zero-padded names make lexical order the numeric order
        locators.sort_unstable();
        Ok(locators)
    }

    async fn delete_all(&self, subject_id: &str) -> StorageResult<()> {
        match tokio::fs::remove_dir_all(self.subject_dir(subject_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// S3/MinIO configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,

    /// AWS region (e.g. "us-west-2") or "us-east-1" for `MinIO`
    pub region: String,

    /// S3 endpoint (custom for `MinIO`, empty for AWS S3)
    pub endpoint: Option<String>,

    /// AWS access key ID
    pub access_key_id: String,

    /// AWS secret access key
    pub secret_access_key: String,

    /// Path prefix for all objects (e.g. "frames/")
    pub prefix: String,

    /// Blob file extension
    pub output_format: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: "video-insight".to_string(),
            region: "us-west-2".to_string(),
            endpoint: None,
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
            prefix: String::new(),
            output_format: "jpg".to_string(),
        }
    }
}

/// S3/MinIO frame store
pub struct S3FrameStore {
    client: Client,
    bucket: String,
    prefix: String,
    output_format: String,
}

impl S3FrameStore {
    /// Create a new S3 frame store client
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "video-insight-storage",
        );

        let region = Region::new(config.region.clone());

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(region)
            .behavior_version_latest();

        // Custom endpoint for MinIO
        if let Some(endpoint) = config.endpoint {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true); // Required for MinIO
        }

        let client = Client::from_conf(s3_config_builder.build());

        Ok(Self {
            client,
            bucket: config.bucket,
            prefix: config.prefix,
            output_format: config.output_format,
        })
    }

    fn subject_prefix(&self, subject_id: &str) -> String {
        format!("{}{}/", self.prefix, subject_id)
    }

    fn frame_key(&self, subject_id: &str, frame_index: u32) -> String {
        format!(
            "{}{}",
            self.subject_prefix(subject_id),
            frame_file_name(frame_index, &self.output_format)
        )
    }
}

#[async_trait::async_trait]
impl FrameStore for S3FrameStore {
    async fn save(&self, subject_id: &str, frame_index: u32, data: &[u8]) -> StorageResult<String> {
        let key = self.frame_key(subject_id, frame_index);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| StorageError::S3Error(e.to_string()))?;

        Ok(key)
    }

    async fn load(&self, locator: &str) -> StorageResult<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(locator)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::NotFound(locator.to_string())
                } else {
                    StorageError::S3Error(e.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3Error(e.to_string()))?;

        Ok(bytes.to_vec())
    }

    async fn exists(&self, subject_id: &str, frame_index: u32) -> StorageResult<bool> {
        let key = self.frame_key(subject_id, frame_index);

        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.to_string().contains("NotFound") {
                    Ok(false)
                } else {
                    Err(StorageError::S3Error(e.to_string()))
                }
            }
        }
    }

    fn url_for(&self, locator: &str) -> String {
        format!("s3://{}/{}", self.bucket, locator)
    }

    async fn list(&self, subject_id: &str) -> StorageResult<Vec<String>> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(self.subject_prefix(subject_id))
            .send()
            .await
            .map_err(|e| StorageError::S3Error(e.to_string()))?;

        let mut keys: Vec<String> = response
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(std::string::ToString::to_string))
            .collect();

        keys.sort_unstable();
        Ok(keys)
    }

    async fn delete_all(&self, subject_id: &str) -> StorageResult<()> {
        let keys = self.list(subject_id).await?;

        for key in &keys {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| StorageError::S3Error(e.to_string()))?;
        }

        if !keys.is_empty() {
            tracing::debug!("Deleted {} frames for subject {}", keys.len(), subject_id);
        }

        Ok(())
    }
}
