//! Vector index trait and types.
//!
//! Defines the interface for nearest-neighbor search over product image
//! embeddings.

use serde::Serialize;

use crate::error::VectorError;

/// A single nearest-neighbor hit
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// Product the matched vector belongs to
    pub product_id: String,
    /// Squared L2 distance to the query (lower = more similar)
    pub distance: f32,
}

impl Neighbor {
    pub fn new(product_id: impl Into<String>, distance: f32) -> Self {
        Self {
            product_id: product_id.into(),
            distance,
        }
    }
}

/// Index statistics
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    /// Number of vectors in the index
    pub vector_count: usize,
    /// Embedding dimension
    pub dimension: usize,
    /// Approximate in-memory size of the vectors in bytes
    pub size_bytes: u64,
    /// Backend kind ("flat" or "hnsw")
    pub kind: &'static str,
}

/// Trait for vector index backends.
///
/// Implementations must be safe for concurrent read access; callers guard
/// mutation with their own lock.
pub trait VectorIndex: Send + Sync {
    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the number of vectors in the index
    fn len(&self) -> usize;

    /// Check if the index is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a vector for the given product.
    /// Re-adding an existing product replaces its vector.
    fn add(&mut self, product_id: &str, vector: &[f32]) -> Result<(), VectorError>;

    /// Bulk-load parallel vector/id slices.
    fn add_batch(&mut self, vectors: &[Vec<f32>], product_ids: &[String]) -> Result<(), VectorError> {
        if vectors.len() != product_ids.len() {
            return Err(VectorError::BatchMismatch {
                vectors: vectors.len(),
                ids: product_ids.len(),
            });
        }
        for (vector, product_id) in vectors.iter().zip(product_ids) {
            self.add(product_id, vector)?;
        }
        Ok(())
    }

    /// Search for the k nearest neighbors.
    /// Returns neighbors sorted by ascending distance.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, VectorError>;

    /// Remove a product's vector. Returns whether it was present.
    fn remove(&mut self, product_id: &str) -> Result<bool, VectorError>;

    /// Check if a product has a vector in the index
    fn contains(&self, product_id: &str) -> bool;

    /// Get index statistics
    fn stats(&self) -> IndexStats;

    /// Save index to disk
    fn save(&self) -> Result<(), VectorError>;

    /// Clear all vectors from the index
    fn clear(&mut self) -> Result<(), VectorError>;
}
