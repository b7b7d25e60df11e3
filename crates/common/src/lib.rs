/// Common types shared across the video analysis cache and ingestion layer
use serde::{Deserialize, Serialize};

/// Analysis kinds the ingestion coordinator knows how to cache and store.
///
/// Each kind routes producer output to a different store: keyframes to the
/// blob store, embeddings to the vector record store, tags to the tag store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    /// Extracted video frames (binary blobs)
    Keyframes,
    /// Embedding vectors per content chunk
    Embeddings,
    /// Normalized tag/entity labels
    Tags,
}

impl AnalysisKind {
    /// Get human-readable kind name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Keyframes => "keyframes",
            Self::Embeddings => "embeddings",
            Self::Tags => "tags",
        }
    }

    /// Parse a kind from its stored name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "keyframes" => Some(Self::Keyframes),
            "embeddings" => Some(Self::Embeddings),
            "tags" => Some(Self::Tags),
            _ => None,
        }
    }
}

impl std::fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Frame extraction strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// FFmpeg scene change detection
    SceneDetect,
    /// Fixed frames per minute
    Uniform,
    /// I-frames only
    Keyframe,
}

/// Parameters that influence frame extraction output.
///
/// Every field participates in cache key derivation; changing any value
/// invalidates previously cached keyframe artifacts for a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub strategy: ExtractionStrategy,
    pub frames_per_minute: u32,
    pub scene_threshold: f64,
    pub max_frames: u32,
    pub max_width: u32,
    pub output_format: String,
    pub output_quality: u8,
    pub min_sharpness: f64,
    pub blank_threshold: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            strategy: ExtractionStrategy::SceneDetect,
            frames_per_minute: 2,
            scene_threshold: 0.27,
            max_frames: 200,
            max_width: 1280,
            output_format: "jpg".to_string(),
            output_quality: 85,
            min_sharpness: 15.0,
            blank_threshold: 20.0,
        }
    }
}

/// Vision model parameters for scene description passes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Provider name (e.g. "ollama", "openai")
    pub provider: String,
    /// Model identifier within the provider
    pub model: String,
    pub max_tokens_per_frame: u32,
    pub temperature: f64,
    /// Inject previous frame description into next prompt
    pub context_carryover: bool,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "llava:13b".to_string(),
            max_tokens_per_frame: 512,
            temperature: 0.2,
            context_carryover: true,
        }
    }
}

/// Embedding model parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding model identifier
    pub model_id: String,
    /// Contracted vector dimensionality for the model
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_id: "nomic-embed-text".to_string(),
            dimensions: 768,
        }
    }
}
