//! # lookalike-engine
//!
//! Image-similarity recommendation engine: embeds product images, stores
//! the vectors, and serves "products that look like this one" queries.
//!
//! The engine composes the other Lookalike crates. The feature extractor
//! and image fetcher come from `lookalike-embeddings`, records persist via
//! `lookalike-storage`, and nearest-neighbor search runs on a
//! `lookalike-vector` index behind a lock. Computed query embeddings are
//! held in a bounded TTL cache.

pub mod cache;
pub mod capability;
pub mod engine;
pub mod error;
pub mod style;

pub use cache::EmbeddingCache;
pub use capability::CapabilityReport;
pub use engine::{
    similarity_from_distance, EngineConfig, EngineStats, GenerateFailure, GenerateOptions,
    GenerateStats, IndexStatus, ProductSummary, QueryOptions, RebuildStats, Recommendation,
    RecommendationEngine, SimilarProducts, DEFAULT_BATCH_SIZE, DEFAULT_LIMIT,
    DEFAULT_MIN_SIMILARITY, MAX_LIMIT,
};
pub use error::EngineError;
pub use style::StyleMatch;
