//! Embedding error types.

use thiserror::Error;

/// Errors that can occur during feature extraction.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Candle model error
    #[cfg(feature = "vision")]
    #[error("Model error: {0}")]
    Candle(#[from] candle_core::Error),

    /// Image decode error
    #[cfg(feature = "vision")]
    #[error("Image decode error: {0}")]
    Decode(#[from] image::ImageError),

    /// Capability compiled out of this build
    #[error("{capability} support is not available: {hint}")]
    Unavailable { capability: String, hint: String },

    /// Image could not be fetched
    #[error("Failed to fetch image from {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// Model file not found
    #[error("Model file not found: {0}")]
    ModelNotFound(String),

    /// Download error
    #[error("Failed to download model: {0}")]
    Download(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbeddingError {
    /// The structured error returned when image embedding is requested
    /// from a build compiled without the `vision` feature.
    pub fn vision_unavailable() -> Self {
        EmbeddingError::Unavailable {
            capability: "vision".to_string(),
            hint: "rebuild with the `vision` feature to enable image embedding".to_string(),
        }
    }
}
