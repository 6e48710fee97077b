//! Vector index error types.

use thiserror::Error;

/// Errors that can occur during vector index operations.
#[derive(Debug, Error)]
pub enum VectorError {
    /// Backend index error
    #[error("Index error: {0}")]
    Index(String),

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Bulk load called with mismatched vector/id counts
    #[error("Batch mismatch: {vectors} vectors but {ids} product ids")]
    BatchMismatch { vectors: usize, ids: usize },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Index artifact encoding error
    #[error("Encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Index artifact decoding error
    #[error("Decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// Id-mapping serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted artifact failed validation
    #[error("Corrupt index artifact: {0}")]
    Corrupt(String),
}
