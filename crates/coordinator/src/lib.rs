//! Ingestion coordination for cached analysis passes
//!
//! One invocation covers one subject and a set of requested analysis kinds.
//! Each `(subject, kind)` unit moves through a strict sequence: derive the
//! cache key, short-circuit on an existing completion mark, otherwise invoke
//! the external producer, write its output through the matching store, and
//! only then record the completion mark. The mark is the commit point: a
//! crash or write failure before it leaves no mark, so a retried job re-runs
//! production instead of serving a half-written result.
//!
//! Units are independent. One kind's failure never blocks another kind's
//! completion, and the caller receives a manifest describing what was
//! reused, computed or failed.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use video_insight_cache::{CacheKey, ContentIdentity, KeyError, ProcessingConfig};
use video_insight_common::AnalysisKind;
use video_insight_storage::{
    EmbeddingRecord, EmbeddingStore, FrameStore, MarkStore, StorageError, TagStore,
};

/// One extracted frame produced by an analysis pass
#[derive(Debug, Clone)]
pub struct FrameBlob {
    /// Caller-assigned, monotonically increasing within one subject; gaps
    /// are tolerated
    pub frame_index: u32,
    pub data: Vec<u8>,
}

/// Output of one producer invocation, routed to the store matching its kind
#[derive(Debug, Clone)]
pub enum AnalysisOutput {
    /// Keyframe blobs for the blob store
    Frames(Vec<FrameBlob>),
    /// Embedding records for the vector store
    Vectors(Vec<EmbeddingRecord>),
    /// Raw tags for one `(subject, source)` scope
    Tags { source: String, tags: Vec<String> },
}

impl AnalysisOutput {
    fn kind_name(&self) -> &'static str {
        match self {
            Self::Frames(_) => "frames",
            Self::Vectors(_) => "vectors",
            Self::Tags { .. } => "tags",
        }
    }
}

/// External analysis producer boundary.
///
/// Implemented by the vision/transcription/NER callers outside this crate.
/// Invoked only on cache miss; may be slow, expensive and fallible.
#[async_trait::async_trait]
pub trait AnalysisProducer: Send + Sync {
    async fn produce(
        &self,
        identity: &ContentIdentity,
        config: &ProcessingConfig,
        kind: AnalysisKind,
    ) -> anyhow::Result<AnalysisOutput>;
}

/// Per-unit processing state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Pending,
    KeyDerived,
    Producing,
    Writing,
    Done,
    Failed,
}

/// Why a unit failed
#[derive(Error, Debug)]
pub enum UnitError {
    /// Key derivation failed; never cached, the unit is retryable once the
    /// content becomes readable
    #[error("cache key derivation failed: {0}")]
    KeyDerivation(#[from] KeyError),

    /// External producer call failed; retryable from `Pending`
    #[error("producer failed: {0}")]
    ProducerFailed(String),

    /// Producer exceeded the request deadline; nothing was written
    #[error("producer cancelled after {0:?}")]
    Cancelled(Duration),

    /// Store write failed after successful production; no completion mark
    /// is recorded, so a retry re-runs production
    #[error("write failed: {0}")]
    WriteFailed(#[from] StorageError),

    /// Producer returned an output variant that does not match the unit kind
    #[error("producer returned {got} output for {kind} unit")]
    OutputMismatch { kind: AnalysisKind, got: &'static str },
}

/// How a unit ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitOutcome {
    /// Existing result reused; producer not invoked
    Hit,
    /// Producer ran and its output is durably stored
    Computed,
    /// Unit failed; see the report's error
    Failed,
}

/// Manifest entry for one `(subject, kind)` unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitReport {
    pub kind: AnalysisKind,
    pub outcome: UnitOutcome,
    pub error: Option<String>,
}

/// Result of one coordinator invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestManifest {
    pub subject_id: String,
    pub reports: Vec<UnitReport>,
}

impl IngestManifest {
    /// Outcome for a kind, if it was part of the request
    #[must_use]
    pub fn outcome_for(&self, kind: AnalysisKind) -> Option<UnitOutcome> {
        self.reports
            .iter()
            .find(|r| r.kind == kind)
            .map(|r| r.outcome)
    }

    /// True when no unit failed
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.reports
            .iter()
            .all(|r| r.outcome != UnitOutcome::Failed)
    }
}

/// One ingestion trigger, handed to the coordinator by the job scheduler
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub subject_id: String,
    pub identity: ContentIdentity,
    /// Request-level configuration; scoped per kind during key derivation
    pub config: ProcessingConfig,
    pub kinds: Vec<AnalysisKind>,
    /// Clear existing artifacts and recompute regardless of cache state
    pub force: bool,
    /// Upper bound on each producer invocation
    pub producer_deadline: Option<Duration>,
}

impl IngestRequest {
    #[must_use]
    pub fn new(
        subject_id: impl Into<String>,
        identity: ContentIdentity,
        config: ProcessingConfig,
        kinds: Vec<AnalysisKind>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            identity,
            config,
            kinds,
            force: false,
            producer_deadline: None,
        }
    }
}

/// Coordinates one subject's analysis pass across the derived stores.
///
/// Constructed once at process start with shared store handles; holds no
/// hidden global state and owns no locks. Workers on different machines
/// coordinate purely through the stores' own atomicity guarantees.
pub struct IngestionCoordinator {
    frames: Arc<dyn FrameStore>,
    embeddings: Arc<dyn EmbeddingStore>,
    tags: Arc<dyn TagStore>,
    marks: Arc<dyn MarkStore>,
}

impl IngestionCoordinator {
    #[must_use]
    pub fn new(
        frames: Arc<dyn FrameStore>,
        embeddings: Arc<dyn EmbeddingStore>,
        tags: Arc<dyn TagStore>,
        marks: Arc<dyn MarkStore>,
    ) -> Self {
        Self {
            frames,
            embeddings,
            tags,
            marks,
        }
    }

    /// Run the requested analysis kinds for one subject and report a
    /// manifest of what was reused, computed or failed.
    pub async fn run(
        &self,
        producer: &dyn AnalysisProducer,
        request: &IngestRequest,
    ) -> IngestManifest {
        info!(
            "Starting ingestion for subject {} ({} kinds, force={})",
            request.subject_id,
            request.kinds.len(),
            request.force
        );

        if request.force {
            if let Err(e) = self.clear_subject(&request.subject_id).await {
                warn!(
                    "Force-clear failed for subject {}: {}",
                    request.subject_id, e
                );
                let reports = request
                    .kinds
                    .iter()
                    .map(|&kind| UnitReport {
                        kind,
                        outcome: UnitOutcome::Failed,
                        error: Some(format!("write failed: {e}")),
                    })
                    .collect();
                return IngestManifest {
                    subject_id: request.subject_id.clone(),
                    reports,
                };
            }
        }

        let mut reports = Vec::with_capacity(request.kinds.len());
        for &kind in &request.kinds {
            let report = match self.run_unit(producer, request, kind).await {
                Ok(outcome) => UnitReport {
                    kind,
                    outcome,
                    error: None,
                },
                Err(e) => {
                    warn!(
                        "Unit {}/{} failed: {}",
                        request.subject_id,
                        kind,
                        e
                    );
                    UnitReport {
                        kind,
                        outcome: UnitOutcome::Failed,
                        error: Some(e.to_string()),
                    }
                }
            };
            reports.push(report);
        }

        let failed = reports
            .iter()
            .filter(|r| r.outcome == UnitOutcome::Failed)
            .count();
        if failed > 0 {
            warn!(
                "Ingestion for subject {} completed with {} failed units",
                request.subject_id, failed
            );
        } else {
            info!(
                "Ingestion for subject {} completed successfully",
                request.subject_id
            );
        }

        IngestManifest {
            subject_id: request.subject_id.clone(),
            reports,
        }
    }

    /// Remove all cached artifacts and marks for a subject (force path)
    async fn clear_subject(&self, subject_id: &str) -> Result<(), StorageError> {
        self.marks.clear(subject_id).await?;
        self.frames.delete_all(subject_id).await?;
        self.embeddings.delete_for_source(subject_id).await?;
        Ok(())
    }

    /// Drive one `(subject, kind)` unit through its state machine
    async fn run_unit(
        &self,
        producer: &dyn AnalysisProducer,
        request: &IngestRequest,
        kind: AnalysisKind,
    ) -> Result<UnitOutcome, UnitError> {
        let subject_id = &request.subject_id;
        debug!("Unit {subject_id}/{kind}: {:?}", UnitState::Pending);

        let key = CacheKey::derive(&request.identity, &request.config.for_kind(kind))?;
        debug!(
            "Unit {subject_id}/{kind}: {:?} (key {})",
            UnitState::KeyDerived,
            key
        );

        if !request.force {
            if let Some(mark) = self.marks.get(subject_id, kind).await? {
                if mark.cache_key == key.as_str() {
                    debug!("Unit {subject_id}/{kind}: cache hit, producer not invoked");
                    return Ok(UnitOutcome::Hit);
                }
                debug!("Unit {subject_id}/{kind}: stale mark, recomputing");
            }
        }

        debug!("Unit {subject_id}/{kind}: {:?}", UnitState::Producing);
        let produce = producer.produce(&request.identity, &request.config, kind);
        let output = match request.producer_deadline {
            Some(deadline) => tokio::time::timeout(deadline, produce)
                .await
                .map_err(|_| UnitError::Cancelled(deadline))?
                .map_err(|e| UnitError::ProducerFailed(e.to_string()))?,
            None => produce
                .await
                .map_err(|e| UnitError::ProducerFailed(e.to_string()))?,
        };

        debug!("Unit {subject_id}/{kind}: {:?}", UnitState::Writing);
        self.write_output(subject_id, kind, output).await?;

        // The mark is written last: producer success alone must never look
        // like a cache hit to a later invocation.
        self.marks
            .mark_completed(subject_id, kind, key.as_str())
            .await?;

        debug!("Unit {subject_id}/{kind}: {:?}", UnitState::Done);
        Ok(UnitOutcome::Computed)
    }

    /// Write producer output through the store matching the unit kind
    async fn write_output(
        &self,
        subject_id: &str,
        kind: AnalysisKind,
        output: AnalysisOutput,
    ) -> Result<(), UnitError> {
        match (kind, output) {
            (AnalysisKind::Keyframes, AnalysisOutput::Frames(frames)) => {
                let count = frames.len();
                for frame in frames {
                    self.frames
                        .save(subject_id, frame.frame_index, &frame.data)
                        .await?;
                }
                debug!("Wrote {count} frames for subject {subject_id}");
            }
            (AnalysisKind::Embeddings, AnalysisOutput::Vectors(records)) => {
                let mut inserted = 0usize;
                for record in &records {
                    if self.embeddings.insert_if_absent(record).await? {
                        inserted += 1;
                    }
                }
                debug!(
                    "Stored {inserted} of {} vectors for subject {subject_id}",
                    records.len()
                );
            }
            (AnalysisKind::Tags, AnalysisOutput::Tags { source, tags }) => {
                let stored = self.tags.replace(subject_id, &source, &tags).await?;
                debug!(
                    "Replaced tag set for subject {subject_id} source {source}: {} tags",
                    stored.len()
                );
            }
            (kind, output) => {
                return Err(UnitError::OutputMismatch {
                    kind,
                    got: output.kind_name(),
                });
            }
        }

        Ok(())
    }
}
