//! # lookalike-vector
//!
//! Nearest-neighbor index backends for product image embeddings.
//!
//! This crate answers "which products look like this one" by searching
//! vectors produced by the embedding service, keyed by product id.
//!
//! ## Backends
//! - `FlatIndex`: exact brute-force search over squared L2 distance,
//!   always available, persisted as a checksummed paired artifact
//! - `HnswIndex`: approximate usearch-backed index behind the `hnsw`
//!   feature, for catalogs where a full scan no longer holds up
//!
//! Both implement the `VectorIndex` trait, return neighbors in ascending
//! distance order, and persist an (index, id-mapping) file pair.

pub mod error;
pub mod flat;
#[cfg(feature = "hnsw")]
pub mod hnsw;
pub mod index;

pub use error::VectorError;
pub use flat::{FlatIndex, INDEX_FILE, MAPPING_FILE};
#[cfg(feature = "hnsw")]
pub use hnsw::{HnswConfig, HnswIndex, HNSW_INDEX_FILE};
pub use index::{IndexStats, Neighbor, VectorIndex};
