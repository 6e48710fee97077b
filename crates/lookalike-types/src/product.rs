//! Catalog manifest entries.
//!
//! Batch embedding generation reads a JSON manifest describing which
//! products to process: an array of `{product_id, image_url, category?}`
//! objects. The manifest is the hand-off point between whatever catalog
//! system owns the products and this engine.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::LookalikeError;

/// One product to embed: its id, where its image lives, and an optional
/// category slug used for filtering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductSource {
    /// Unique product identifier
    pub product_id: String,

    /// Source image URL
    pub image_url: String,

    /// Category slug (e.g. "down", "jeans")
    #[serde(default)]
    pub category: Option<String>,
}

impl ProductSource {
    /// Load a manifest file: a JSON array of product sources.
    pub fn load_manifest(path: &Path) -> Result<Vec<ProductSource>, LookalikeError> {
        let raw = fs::read_to_string(path)?;
        let sources: Vec<ProductSource> = serde_json::from_str(&raw)?;
        Ok(sources)
    }
}
