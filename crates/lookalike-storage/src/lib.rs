//! Storage layer for product image embeddings.
//!
//! Provides RocksDB-backed persistence with:
//! - One JSON record per product, keyed by product id
//! - Upsert semantics that preserve first-seen timestamps
//! - Model-version scoped listing for index rebuilds

pub mod db;
pub mod error;
pub mod record;

pub use db::{EmbeddingStore, CF_EMBEDDINGS};
pub use error::StorageError;
pub use record::EmbeddingRecord;
