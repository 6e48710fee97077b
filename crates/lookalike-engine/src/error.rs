//! Engine error types.

use thiserror::Error;

/// Errors from the recommendation engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Embedding computation failed
    #[error("Embedding error: {0}")]
    Embedding(#[from] lookalike_embeddings::EmbeddingError),

    /// Vector index operation failed
    #[error("Vector index error: {0}")]
    Vector(#[from] lookalike_vector::VectorError),

    /// Embedding store operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] lookalike_storage::StorageError),

    /// Product has no stored embedding
    #[error("Product not found: {0}")]
    NotFound(String),

    /// Caller supplied out-of-range query options
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Background task failed to complete
    #[error("Task error: {0}")]
    Task(String),
}
