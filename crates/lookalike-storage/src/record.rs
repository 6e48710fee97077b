//! Embedding record type.
//!
//! One record per product image: the feature vector plus the metadata
//! needed to re-derive or invalidate it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored image embedding for a single product.
///
/// `product_id` is the unique key; re-embedding the same product replaces
/// the vector and bumps `updated_at` while keeping `created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Unique product identifier
    pub product_id: String,

    /// Image URL the vector was computed from
    pub image_url: String,

    /// Unit-normalized feature vector
    pub vector: Vec<f32>,

    /// Model version that produced the vector
    pub model_version: String,

    /// Optional: product category, for same-category filtering
    #[serde(default)]
    pub category: Option<String>,

    /// When the record was first created
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    /// When the vector was last recomputed
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl EmbeddingRecord {
    /// Create a new record stamped with the current time
    pub fn new(
        product_id: impl Into<String>,
        image_url: impl Into<String>,
        vector: Vec<f32>,
        model_version: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            product_id: product_id.into(),
            image_url: image_url.into(),
            vector,
            model_version: model_version.into(),
            category: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a category to this record
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Vector dimension
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serialization() {
        let record = EmbeddingRecord::new(
            "prod-123",
            "https://cdn.example.com/prod-123.jpg",
            vec![0.1, 0.2, 0.3],
            "resnet50",
        )
        .with_category("tops");

        let bytes = record.to_bytes().unwrap();
        let decoded = EmbeddingRecord::from_bytes(&bytes).unwrap();

        assert_eq!(decoded.product_id, record.product_id);
        assert_eq!(decoded.image_url, record.image_url);
        assert_eq!(decoded.vector, record.vector);
        assert_eq!(decoded.category, Some("tops".to_string()));
        assert_eq!(decoded.dimension(), 3);
    }

    #[test]
    fn test_new_stamps_matching_timestamps() {
        let record = EmbeddingRecord::new("prod-1", "https://x/1.jpg", vec![1.0], "resnet50");
        assert_eq!(record.created_at, record.updated_at);
        assert!(record.category.is_none());
    }
}
