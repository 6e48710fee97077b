//! Feature extractor trait and types.
//!
//! Defines the interface for turning image bytes into vector embeddings.

use crate::error::EmbeddingError;

/// Output dimension of the default ResNet-50 backbone.
pub const RESNET50_DIM: usize = 2048;

/// Vector embedding - a normalized float array.
#[derive(Debug, Clone)]
pub struct Embedding {
    /// The embedding vector (normalized to unit length)
    pub values: Vec<f32>,
}

impl Embedding {
    /// Create a new embedding from a vector.
    /// Normalizes the vector to unit length.
    pub fn new(values: Vec<f32>) -> Self {
        let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        let normalized = if norm > 0.0 {
            values.iter().map(|x| x / norm).collect()
        } else {
            values
        };
        Self { values: normalized }
    }

    /// Create embedding without normalization (for pre-normalized vectors)
    pub fn from_normalized(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Get the embedding dimension
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Compute cosine similarity with another embedding.
    /// Returns value in [-1, 1] range (1 = identical).
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return 0.0;
        }
        // Since both are normalized, dot product = cosine similarity
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| a * b)
            .sum()
    }
}

/// Model information
#[derive(Debug, Clone)]
pub struct ModelInfo {
    /// Model name (e.g., "resnet50")
    pub name: String,
    /// Embedding dimension
    pub dimension: usize,
    /// Input image resolution (square, in pixels)
    pub input_resolution: usize,
}

/// Trait for image feature extractors.
///
/// Implementations must be thread-safe (Send + Sync) for concurrent use.
/// Input is raw encoded image bytes; decoding is the extractor's job.
pub trait FeatureExtractor: Send + Sync {
    /// Get model information
    fn info(&self) -> &ModelInfo;

    /// Extract a normalized feature vector from encoded image bytes.
    fn extract(&self, image: &[u8]) -> Result<Embedding, EmbeddingError>;

    /// Extract features for multiple images (batch).
    /// Default implementation calls extract() for each image.
    fn extract_batch(&self, images: &[Vec<u8>]) -> Result<Vec<Embedding>, EmbeddingError> {
        images.iter().map(|bytes| self.extract(bytes)).collect()
    }
}

/// Stand-in extractor for builds without the `vision` feature.
///
/// Lets the rest of the system construct and run; any actual embedding
/// request reports the missing capability instead of crashing.
#[derive(Debug, Clone)]
pub struct DisabledExtractor {
    info: ModelInfo,
}

impl Default for DisabledExtractor {
    fn default() -> Self {
        Self {
            info: ModelInfo {
                name: "disabled".to_string(),
                dimension: RESNET50_DIM,
                input_resolution: 0,
            },
        }
    }
}

impl DisabledExtractor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeatureExtractor for DisabledExtractor {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn extract(&self, _image: &[u8]) -> Result<Embedding, EmbeddingError> {
        Err(EmbeddingError::vision_unavailable())
    }
}
