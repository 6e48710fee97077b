//! # lookalike-embeddings
//!
//! Image feature extraction for lookalike using Candle.
//!
//! This crate turns product images into fixed-length visual feature
//! vectors for similarity search. Inference is local via Candle; no
//! Python runtime and no inference API.
//!
//! ## Features
//! - ResNet-50 backbone with the classification head removed (2048 dims)
//! - ImageNet preprocessing (224x224, mean/std normalization)
//! - Automatic weight download and caching via hf-hub
//! - Pluggable image fetching with timeout and retry
//! - Builds without the `vision` feature for lean deployments; embedding
//!   requests then return a structured capability error

pub mod error;
pub mod fetch;
pub mod model;

#[cfg(feature = "vision")]
pub mod cache;
#[cfg(feature = "vision")]
pub mod resnet;

pub use error::EmbeddingError;
pub use fetch::{HttpImageFetcher, ImageFetch};
pub use model::{DisabledExtractor, Embedding, FeatureExtractor, ModelInfo, RESNET50_DIM};

#[cfg(feature = "vision")]
pub use cache::{get_or_download_model, ModelCache, ModelPaths, DEFAULT_MODEL_REPO, MODEL_FILES};
#[cfg(feature = "vision")]
pub use resnet::ResnetExtractor;

/// Whether this build can compute embeddings.
pub fn vision_available() -> bool {
    cfg!(feature = "vision")
}
