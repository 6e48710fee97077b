//! Build capability reporting.
//!
//! Optional features compile out heavyweight dependencies; this module
//! reports which capabilities the running binary actually has so callers
//! can explain degraded behavior instead of guessing.

use serde::Serialize;

/// Which optional capabilities this build carries
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityReport {
    /// Model inference and image decoding are compiled in
    pub vision: bool,
    /// Approximate nearest-neighbor backend is compiled in
    pub hnsw: bool,
    /// Human-readable names of everything missing
    pub missing: Vec<String>,
}

impl CapabilityReport {
    /// Inspect the current build
    pub fn current() -> Self {
        let vision = lookalike_embeddings::vision_available();
        let hnsw = cfg!(feature = "hnsw");

        let mut missing = Vec::new();
        if !vision {
            missing.push("vision".to_string());
        }
        if !hnsw {
            missing.push("hnsw".to_string());
        }

        Self {
            vision,
            hnsw,
            missing,
        }
    }
}
