//! Style-match labels derived from similarity scores.
//!
//! Recommendations carry a coarse human-readable label alongside the raw
//! similarity so product pages can say *why* an item was suggested.

use serde::Serialize;

/// How closely a recommended product matches the source product's style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleMatch {
    /// Similarity >= 0.95
    NearIdentical,
    /// Similarity >= 0.85
    VerySimilar,
    /// Similarity >= 0.75
    Similar,
    /// Similarity >= 0.65
    SimilarMood,
    /// Everything below
    RelatedCategory,
}

impl StyleMatch {
    /// Classify a similarity score in (0, 1]
    pub fn from_similarity(similarity: f32) -> Self {
        if similarity >= 0.95 {
            StyleMatch::NearIdentical
        } else if similarity >= 0.85 {
            StyleMatch::VerySimilar
        } else if similarity >= 0.75 {
            StyleMatch::Similar
        } else if similarity >= 0.65 {
            StyleMatch::SimilarMood
        } else {
            StyleMatch::RelatedCategory
        }
    }

    /// Shopper-facing description of the match
    pub fn description(&self) -> &'static str {
        match self {
            StyleMatch::NearIdentical => "nearly identical style",
            StyleMatch::VerySimilar => "very similar design",
            StyleMatch::Similar => "similar style",
            StyleMatch::SimilarMood => "similar mood",
            StyleMatch::RelatedCategory => "related category",
        }
    }
}

impl std::fmt::Display for StyleMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}
