//! The recommendation engine.
//!
//! Ties together the feature extractor, the embedding store, and the vector
//! index: embeds catalog product images, persists the results, and answers
//! "products that look like this one" queries against the live index.

use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use lookalike_embeddings::{Embedding, FeatureExtractor, ImageFetch};
use lookalike_storage::{EmbeddingRecord, EmbeddingStore};
use lookalike_types::{CacheSettings, ProductSource};
use lookalike_vector::{IndexStats, VectorError, VectorIndex};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::EmbeddingCache;
use crate::capability::CapabilityReport;
use crate::error::EngineError;
use crate::style::StyleMatch;

/// Default number of recommendations per query
pub const DEFAULT_LIMIT: usize = 10;

/// Upper bound on recommendations per query
pub const MAX_LIMIT: usize = 50;

/// Default similarity floor for recommendations
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.5;

/// Default number of products embedded per batch during generation
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Candidates fetched per requested result, leaving headroom for the
/// self-hit and the category/similarity filters
const OVERFETCH_FACTOR: usize = 3;

/// Convert a squared L2 distance between unit vectors into a similarity
/// score in (0, 1]. Identical vectors score exactly 1.0.
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

/// Engine construction parameters
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Model version stamped onto new records and selected at rebuild
    pub model_version: String,
    /// Directory holding the persisted index artifacts
    pub index_dir: PathBuf,
    /// Embedding cache tuning
    pub cache: CacheSettings,
}

/// Options for a similar-products query
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Maximum recommendations to return (1..=[`MAX_LIMIT`])
    pub limit: usize,
    /// Drop candidates scoring below this similarity, in [0, 1]
    pub min_similarity: f32,
    /// Only recommend products sharing the source product's category.
    /// Has no effect when the source product has no category.
    pub same_category_only: bool,
    /// Recompute the query embedding from the source image instead of
    /// using the stored vector
    pub rebuild: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            min_similarity: DEFAULT_MIN_SIMILARITY,
            same_category_only: true,
            rebuild: false,
        }
    }
}

impl QueryOptions {
    fn validate(&self) -> Result<(), EngineError> {
        if self.limit < 1 || self.limit > MAX_LIMIT {
            return Err(EngineError::InvalidRequest(format!(
                "limit must be between 1 and {}, got {}",
                MAX_LIMIT, self.limit
            )));
        }
        if !(0.0..=1.0).contains(&self.min_similarity) {
            return Err(EngineError::InvalidRequest(format!(
                "min_similarity must be between 0.0 and 1.0, got {}",
                self.min_similarity
            )));
        }
        Ok(())
    }
}

/// Options for a bulk embedding run
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Products per concurrent batch
    pub batch_size: usize,
    /// Re-embed products that already have a record for the target model
    pub rebuild: bool,
    /// Only process products in this category
    pub category: Option<String>,
    /// Stop after this many products
    pub limit: Option<usize>,
    /// Override the engine's configured model version for this run
    pub model_version: Option<String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            rebuild: false,
            category: None,
            limit: None,
            model_version: None,
        }
    }
}

/// Outcome of a bulk embedding run
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateStats {
    /// Products selected for the run
    pub total: usize,
    /// Products actually visited
    pub processed: usize,
    /// Newly embedded products
    pub succeeded: usize,
    /// Products whose embedding failed
    pub failed: usize,
    /// Products skipped because a current record already existed
    pub skipped: usize,
    /// Vectors loaded into the rebuilt index
    pub indexed: usize,
    /// Wall-clock duration of the run
    pub elapsed_secs: f64,
    /// Per-product failure reasons
    pub failures: Vec<GenerateFailure>,
}

/// A single product that failed during a bulk run
#[derive(Debug, Clone, Serialize)]
pub struct GenerateFailure {
    pub product_id: String,
    pub reason: String,
}

/// Outcome of an index rebuild
#[derive(Debug, Clone, Serialize)]
pub struct RebuildStats {
    /// Vectors loaded into the index
    pub loaded: usize,
    /// Stored records skipped for having the wrong dimension
    pub skipped: usize,
}

/// A recommended product with its match scores
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub product_id: String,
    /// Squared L2 distance to the query embedding
    pub distance: f32,
    /// Similarity score in (0, 1]
    pub similarity: f32,
    /// Coarse shopper-facing match label
    pub style_match: StyleMatch,
    pub category: Option<String>,
    pub image_url: String,
}

/// Result of a similar-products query
#[derive(Debug, Clone, Serialize)]
pub struct SimilarProducts {
    /// The source product
    pub product_id: String,
    /// Matches, closest first
    pub recommendations: Vec<Recommendation>,
    /// Vectors in the index at query time
    pub indexed_total: usize,
}

/// Health of the vector index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    /// Index holds at least one vector
    Healthy,
    /// Index is empty; run a generate or rebuild first
    IndexNotBuilt,
}

impl std::fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexStatus::Healthy => write!(f, "healthy"),
            IndexStatus::IndexNotBuilt => write!(f, "index_not_built"),
        }
    }
}

/// Combined store and index health report
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub status: IndexStatus,
    pub index: IndexStats,
    /// Embedding records in the store, across all model versions
    pub stored_records: usize,
    /// Record counts per model version
    pub model_versions: Vec<(String, usize)>,
    /// Indexed vectors over stored records; 0.0 when the store is empty
    pub coverage: f32,
    pub index_file_exists: bool,
    pub mapping_file_exists: bool,
    /// Model version the engine is configured for
    pub model_version: String,
}

/// One embedded product, as listed by [`RecommendationEngine::available_products`]
#[derive(Debug, Clone, Serialize)]
pub struct ProductSummary {
    pub product_id: String,
    pub category: Option<String>,
    pub image_url: String,
    pub model_version: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

/// Image-similarity recommendation engine.
///
/// Safe to share across tasks: the store and extractor are internally
/// synchronized, the index sits behind an `RwLock`, and the cache uses an
/// async lock.
pub struct RecommendationEngine {
    store: Arc<EmbeddingStore>,
    extractor: Arc<dyn FeatureExtractor>,
    fetcher: Arc<dyn ImageFetch>,
    index: Arc<RwLock<Box<dyn VectorIndex>>>,
    cache: EmbeddingCache,
    config: EngineConfig,
}

impl RecommendationEngine {
    /// Create an engine over an opened store and index
    pub fn new(
        store: Arc<EmbeddingStore>,
        extractor: Arc<dyn FeatureExtractor>,
        fetcher: Arc<dyn ImageFetch>,
        index: Box<dyn VectorIndex>,
        config: EngineConfig,
    ) -> Self {
        let cache = EmbeddingCache::new(
            Duration::from_secs(config.cache.ttl_secs),
            config.cache.max_entries,
        );
        Self {
            store,
            extractor,
            fetcher,
            index: Arc::new(RwLock::new(index)),
            cache,
            config,
        }
    }

    fn index_read(&self) -> Result<RwLockReadGuard<'_, Box<dyn VectorIndex>>, EngineError> {
        self.index.read().map_err(|e| {
            EngineError::Vector(VectorError::Index(format!(
                "Failed to acquire read lock: {}",
                e
            )))
        })
    }

    fn index_write(&self) -> Result<RwLockWriteGuard<'_, Box<dyn VectorIndex>>, EngineError> {
        self.index.write().map_err(|e| {
            EngineError::Vector(VectorError::Index(format!(
                "Failed to acquire write lock: {}",
                e
            )))
        })
    }

    /// Resolve a product's embedding: cache, then store, then fetch + extract.
    ///
    /// The fetch path persists the result to the store. `rebuild` skips the
    /// cache and store and recomputes unconditionally; bulk runs pass
    /// `use_cache = false` so they never churn the query cache.
    async fn compute_or_fetch(
        &self,
        product_id: &str,
        image_url: &str,
        category: Option<&str>,
        model_version: &str,
        rebuild: bool,
        use_cache: bool,
    ) -> Result<Embedding, EngineError> {
        if use_cache && !rebuild {
            if let Some(embedding) = self.cache.get(product_id).await {
                debug!(product_id, "Embedding cache hit");
                return Ok(embedding);
            }
        }

        if !rebuild {
            if let Some(record) = self.store.get(product_id)? {
                if record.model_version == model_version
                    && record.dimension() == self.extractor.info().dimension
                {
                    let embedding = Embedding::from_normalized(record.vector);
                    if use_cache {
                        self.cache.put(product_id, embedding.clone()).await;
                    }
                    return Ok(embedding);
                }
            }
        }

        let bytes = self.fetcher.fetch(image_url).await?;
        let extractor = Arc::clone(&self.extractor);
        let embedding = tokio::task::spawn_blocking(move || extractor.extract(&bytes))
            .await
            .map_err(|e| EngineError::Task(e.to_string()))??;

        let mut record = EmbeddingRecord::new(
            product_id,
            image_url,
            embedding.values.clone(),
            model_version,
        );
        if let Some(category) = category {
            record = record.with_category(category);
        }
        self.store.upsert(record)?;
        debug!(product_id, model_version, "Computed embedding");

        if use_cache {
            self.cache.put(product_id, embedding.clone()).await;
        }
        Ok(embedding)
    }

    /// Return the embedding for a product, computing and persisting it when
    /// no current record exists. `rebuild` forces recomputation.
    pub async fn get_or_create_embedding(
        &self,
        product: &ProductSource,
        rebuild: bool,
    ) -> Result<Embedding, EngineError> {
        self.compute_or_fetch(
            &product.product_id,
            &product.image_url,
            product.category.as_deref(),
            &self.config.model_version,
            rebuild,
            true,
        )
        .await
    }

    /// Embed a single product and add it to the live index immediately
    pub async fn embed_product(
        &self,
        product: &ProductSource,
        rebuild: bool,
    ) -> Result<EmbeddingRecord, EngineError> {
        let embedding = self.get_or_create_embedding(product, rebuild).await?;

        {
            let mut index = self.index_write()?;
            index.add(&product.product_id, &embedding.values)?;
            index.save()?;
        }

        let record = self
            .store
            .get(&product.product_id)?
            .ok_or_else(|| EngineError::NotFound(product.product_id.clone()))?;
        info!(product_id = %product.product_id, "Embedded product");
        Ok(record)
    }

    /// Find products visually similar to a stored product.
    ///
    /// Matches come back closest first, never include the source product,
    /// and respect the limit, similarity floor, and category filter in
    /// `options`.
    pub async fn similar_products(
        &self,
        product_id: &str,
        options: &QueryOptions,
    ) -> Result<SimilarProducts, EngineError> {
        options.validate()?;

        let record = self
            .store
            .get(product_id)?
            .ok_or_else(|| EngineError::NotFound(product_id.to_string()))?;

        let query = if options.rebuild {
            self.compute_or_fetch(
                product_id,
                &record.image_url,
                record.category.as_deref(),
                &self.config.model_version,
                true,
                true,
            )
            .await?
        } else {
            Embedding::from_normalized(record.vector.clone())
        };

        let (neighbors, indexed_total) = {
            let index = self.index_read()?;
            let total = index.len();
            if total == 0 {
                (Vec::new(), 0)
            } else {
                let search_k = options.limit * OVERFETCH_FACTOR;
                (index.search(&query.values, search_k)?, total)
            }
        };

        let mut recommendations = Vec::new();
        for neighbor in neighbors {
            if neighbor.product_id == product_id {
                continue;
            }
            let similarity = similarity_from_distance(neighbor.distance);
            if similarity < options.min_similarity {
                continue;
            }
            let Some(hit) = self.store.get(&neighbor.product_id)? else {
                // The index can lag behind deletions until the next rebuild
                debug!(product_id = %neighbor.product_id, "Indexed product has no record, skipping");
                continue;
            };
            if options.same_category_only {
                if let Some(source_category) = &record.category {
                    if hit.category.as_deref() != Some(source_category.as_str()) {
                        continue;
                    }
                }
            }
            recommendations.push(Recommendation {
                product_id: hit.product_id,
                distance: neighbor.distance,
                similarity,
                style_match: StyleMatch::from_similarity(similarity),
                category: hit.category,
                image_url: hit.image_url,
            });
            if recommendations.len() >= options.limit {
                break;
            }
        }

        debug!(
            product_id,
            returned = recommendations.len(),
            indexed_total,
            "Similar-products query complete"
        );

        Ok(SimilarProducts {
            product_id: product_id.to_string(),
            recommendations,
            indexed_total,
        })
    }

    /// Rebuild the index from stored records for the configured model version
    pub fn rebuild_index(&self) -> Result<RebuildStats, EngineError> {
        self.rebuild_for(&self.config.model_version)
    }

    fn rebuild_for(&self, model_version: &str) -> Result<RebuildStats, EngineError> {
        let records = self.store.for_model(model_version)?;

        let mut index = self.index_write()?;
        let expected = index.dimension();

        let mut vectors = Vec::with_capacity(records.len());
        let mut product_ids = Vec::with_capacity(records.len());
        let mut skipped = 0;
        for record in records {
            if record.dimension() != expected {
                warn!(
                    product_id = %record.product_id,
                    dimension = record.dimension(),
                    expected,
                    "Skipping record with wrong vector dimension"
                );
                skipped += 1;
                continue;
            }
            product_ids.push(record.product_id);
            vectors.push(record.vector);
        }

        index.clear()?;
        index.add_batch(&vectors, &product_ids)?;
        index.save()?;

        let loaded = product_ids.len();
        info!(model_version, loaded, skipped, "Rebuilt vector index");
        Ok(RebuildStats { loaded, skipped })
    }

    /// Remove a product's embedding from the store, cache, and index.
    /// Returns whether anything was present to remove.
    pub async fn remove_product(&self, product_id: &str) -> Result<bool, EngineError> {
        let deleted = self.store.delete(product_id)?;
        self.cache.invalidate(product_id).await;

        let removed = {
            let mut index = self.index_write()?;
            let removed = index.remove(product_id)?;
            if removed {
                index.save()?;
            }
            removed
        };

        if deleted || removed {
            info!(product_id, deleted, removed, "Removed product");
        }
        Ok(deleted || removed)
    }

    /// Embed a catalog of products in concurrent batches, then rebuild the
    /// index for the target model version.
    ///
    /// Products that already have a record under the target model version
    /// are skipped unless `rebuild` is set. Individual failures are recorded
    /// in the returned stats and do not abort the run.
    pub async fn generate(
        &self,
        products: &[ProductSource],
        options: &GenerateOptions,
    ) -> Result<GenerateStats, EngineError> {
        let started = Instant::now();
        let model_version = options
            .model_version
            .clone()
            .unwrap_or_else(|| self.config.model_version.clone());

        let selected: Vec<&ProductSource> = products
            .iter()
            .filter(|p| match &options.category {
                Some(category) => p.category.as_deref() == Some(category.as_str()),
                None => true,
            })
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();

        let mut stats = GenerateStats {
            total: selected.len(),
            ..GenerateStats::default()
        };
        info!(
            total = stats.total,
            model_version = %model_version,
            batch_size = options.batch_size,
            rebuild = options.rebuild,
            "Starting embedding generation"
        );

        let batch_size = options.batch_size.max(1);
        for batch in selected.chunks(batch_size) {
            let outcomes = stream::iter(batch.iter().map(|product| {
                let model_version = model_version.as_str();
                async move {
                    let outcome = self
                        .process_product(product, model_version, options.rebuild)
                        .await;
                    (product.product_id.as_str(), outcome)
                }
            }))
            .buffer_unordered(batch_size)
            .collect::<Vec<_>>()
            .await;

            for (product_id, outcome) in outcomes {
                stats.processed += 1;
                match outcome {
                    Ok(true) => stats.succeeded += 1,
                    Ok(false) => {
                        debug!(product_id, "Already embedded, skipping");
                        stats.skipped += 1;
                    }
                    Err(e) => {
                        warn!(product_id, error = %e, "Failed to embed product");
                        stats.failed += 1;
                        stats.failures.push(GenerateFailure {
                            product_id: product_id.to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
            info!(
                processed = stats.processed,
                total = stats.total,
                "Batch complete"
            );
        }

        let rebuild = self.rebuild_for(&model_version)?;
        stats.indexed = rebuild.loaded;
        stats.elapsed_secs = started.elapsed().as_secs_f64();

        info!(
            succeeded = stats.succeeded,
            failed = stats.failed,
            skipped = stats.skipped,
            indexed = stats.indexed,
            "Embedding generation complete"
        );
        Ok(stats)
    }

    async fn process_product(
        &self,
        product: &ProductSource,
        model_version: &str,
        rebuild: bool,
    ) -> Result<bool, EngineError> {
        if !rebuild {
            if let Some(existing) = self.store.get(&product.product_id)? {
                if existing.model_version == model_version {
                    return Ok(false);
                }
            }
        }

        self.compute_or_fetch(
            &product.product_id,
            &product.image_url,
            product.category.as_deref(),
            model_version,
            rebuild,
            false,
        )
        .await?;
        Ok(true)
    }

    /// Report combined store and index health
    pub fn stats(&self) -> Result<EngineStats, EngineError> {
        let index_stats = {
            let index = self.index_read()?;
            index.stats()
        };

        let stored_records = self.store.count()?;
        let model_versions = self.store.model_versions()?;

        let coverage = if stored_records == 0 {
            0.0
        } else {
            index_stats.vector_count as f32 / stored_records as f32
        };

        let index_file = match index_stats.kind {
            #[cfg(feature = "hnsw")]
            "hnsw" => lookalike_vector::HNSW_INDEX_FILE,
            _ => lookalike_vector::INDEX_FILE,
        };
        let index_file_exists = self.config.index_dir.join(index_file).exists();
        let mapping_file_exists = self
            .config
            .index_dir
            .join(lookalike_vector::MAPPING_FILE)
            .exists();

        let status = if index_stats.vector_count > 0 {
            IndexStatus::Healthy
        } else {
            IndexStatus::IndexNotBuilt
        };

        Ok(EngineStats {
            status,
            index: index_stats,
            stored_records,
            model_versions,
            coverage,
            index_file_exists,
            mapping_file_exists,
            model_version: self.config.model_version.clone(),
        })
    }

    /// List embedded products, ordered by category then product id.
    /// Products without a category sort first.
    pub fn available_products(&self) -> Result<Vec<ProductSummary>, EngineError> {
        let mut summaries: Vec<ProductSummary> = self
            .store
            .all()?
            .into_iter()
            .map(|record| ProductSummary {
                product_id: record.product_id,
                category: record.category,
                image_url: record.image_url,
                model_version: record.model_version,
                updated_at: record.updated_at,
            })
            .collect();
        summaries.sort_by(|a, b| {
            (a.category.as_deref(), a.product_id.as_str())
                .cmp(&(b.category.as_deref(), b.product_id.as_str()))
        });
        Ok(summaries)
    }

    /// Report which optional capabilities this build carries
    pub fn capabilities(&self) -> CapabilityReport {
        CapabilityReport::current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lookalike_embeddings::{EmbeddingError, ModelInfo};
    use lookalike_vector::FlatIndex;
    use std::collections::HashMap;
    use tempfile::TempDir;

    const DIM: usize = 8;

    /// Deterministic stand-in for the real model: folds image bytes into a
    /// fixed-dimension vector, so byte-identical images embed identically.
    struct FoldExtractor {
        info: ModelInfo,
    }

    impl FoldExtractor {
        fn new() -> Self {
            Self {
                info: ModelInfo {
                    name: "fold-test".to_string(),
                    dimension: DIM,
                    input_resolution: 4,
                },
            }
        }
    }

    impl FeatureExtractor for FoldExtractor {
        fn info(&self) -> &ModelInfo {
            &self.info
        }

        fn extract(&self, image: &[u8]) -> Result<Embedding, EmbeddingError> {
            if image.is_empty() {
                return Err(EmbeddingError::InvalidInput("empty image".to_string()));
            }
            let mut values = vec![0.0f32; DIM];
            for (i, byte) in image.iter().enumerate() {
                values[i % DIM] += *byte as f32;
            }
            Ok(Embedding::new(values))
        }
    }

    struct StaticFetcher {
        images: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl ImageFetch for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, EmbeddingError> {
            self.images
                .get(url)
                .cloned()
                .ok_or_else(|| EmbeddingError::Fetch {
                    url: url.to_string(),
                    reason: "not found".to_string(),
                })
        }
    }

    fn image_url(product_id: &str) -> String {
        format!("http://images.test/{}.jpg", product_id)
    }

    /// Build product sources and the matching fetcher image map
    fn catalog(
        entries: Vec<(&str, Vec<u8>, Option<&str>)>,
    ) -> (Vec<ProductSource>, Vec<(String, Vec<u8>)>) {
        let mut products = Vec::new();
        let mut images = Vec::new();
        for (id, bytes, category) in entries {
            let url = image_url(id);
            images.push((url.clone(), bytes));
            products.push(ProductSource {
                product_id: id.to_string(),
                image_url: url,
                category: category.map(|c| c.to_string()),
            });
        }
        (products, images)
    }

    fn setup(
        images: Vec<(String, Vec<u8>)>,
    ) -> (TempDir, Arc<EmbeddingStore>, RecommendationEngine) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(EmbeddingStore::open(&dir.path().join("db")).unwrap());
        let index_dir = dir.path().join("index");
        let index = FlatIndex::open_or_create(DIM, &index_dir).unwrap();
        let config = EngineConfig {
            model_version: "fold-test".to_string(),
            index_dir,
            cache: CacheSettings::default(),
        };
        let engine = RecommendationEngine::new(
            Arc::clone(&store),
            Arc::new(FoldExtractor::new()),
            Arc::new(StaticFetcher {
                images: images.into_iter().collect(),
            }),
            Box::new(index),
            config,
        );
        (dir, store, engine)
    }

    // Byte recipes: [100, 0] is the anchor direction, [100, n] tilts away
    // from it as n grows, [0, 100] is orthogonal (similarity ~0.33).

    #[tokio::test]
    async fn test_generate_and_query_end_to_end() {
        let (products, images) = catalog(vec![
            ("anchor", vec![100, 0], None),
            ("close", vec![100, 10], None),
            ("mid", vec![100, 100], None),
            ("far", vec![0, 100], None),
        ]);
        let (_dir, _store, engine) = setup(images);

        let stats = engine
            .generate(&products, &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.succeeded, 4);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.indexed, 4);

        let result = engine
            .similar_products("anchor", &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(result.indexed_total, 4);

        let ids: Vec<&str> = result
            .recommendations
            .iter()
            .map(|r| r.product_id.as_str())
            .collect();
        // "far" is orthogonal, below the 0.5 similarity floor
        assert_eq!(ids, vec!["close", "mid"]);

        for pair in result.recommendations.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
        for rec in &result.recommendations {
            assert_ne!(rec.product_id, "anchor");
            assert!(rec.similarity > 0.0 && rec.similarity <= 1.0);
        }
    }

    #[tokio::test]
    async fn test_identical_images_match_at_distance_zero() {
        let (products, images) = catalog(vec![
            ("original", vec![42, 7, 99], None),
            ("duplicate", vec![42, 7, 99], None),
        ]);
        let (_dir, _store, engine) = setup(images);
        engine
            .generate(&products, &GenerateOptions::default())
            .await
            .unwrap();

        let result = engine
            .similar_products("original", &QueryOptions::default())
            .await
            .unwrap();
        let top = &result.recommendations[0];
        assert_eq!(top.product_id, "duplicate");
        assert_eq!(top.distance, 0.0);
        assert_eq!(top.similarity, 1.0);
        assert_eq!(top.style_match, StyleMatch::NearIdentical);
    }

    #[tokio::test]
    async fn test_embedding_is_deterministic() {
        let (products, images) = catalog(vec![("prod", vec![5, 10, 15], None)]);
        let (_dir, store, engine) = setup(images);

        engine
            .get_or_create_embedding(&products[0], false)
            .await
            .unwrap();
        let first = store.get("prod").unwrap().unwrap().vector;

        engine
            .get_or_create_embedding(&products[0], true)
            .await
            .unwrap();
        let second = store.get("prod").unwrap().unwrap().vector;

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unknown_product_is_not_found() {
        let (_dir, _store, engine) = setup(Vec::new());
        let result = engine
            .similar_products("ghost", &QueryOptions::default())
            .await;
        assert!(matches!(result, Err(EngineError::NotFound(id)) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_invalid_query_options_rejected() {
        let (products, images) = catalog(vec![("prod", vec![1, 2], None)]);
        let (_dir, _store, engine) = setup(images);
        engine
            .generate(&products, &GenerateOptions::default())
            .await
            .unwrap();

        for options in [
            QueryOptions {
                limit: 0,
                ..QueryOptions::default()
            },
            QueryOptions {
                limit: MAX_LIMIT + 1,
                ..QueryOptions::default()
            },
            QueryOptions {
                min_similarity: -0.1,
                ..QueryOptions::default()
            },
            QueryOptions {
                min_similarity: 1.5,
                ..QueryOptions::default()
            },
        ] {
            let result = engine.similar_products("prod", &options).await;
            assert!(matches!(result, Err(EngineError::InvalidRequest(_))));
        }
    }

    #[tokio::test]
    async fn test_empty_index_returns_no_matches() {
        let (products, images) = catalog(vec![("prod", vec![1, 2], None)]);
        let (_dir, _store, engine) = setup(images);

        // Record exists but nothing was ever indexed
        engine
            .get_or_create_embedding(&products[0], false)
            .await
            .unwrap();

        let result = engine
            .similar_products("prod", &QueryOptions::default())
            .await
            .unwrap();
        assert!(result.recommendations.is_empty());
        assert_eq!(result.indexed_total, 0);
    }

    #[tokio::test]
    async fn test_same_category_filter() {
        let (products, images) = catalog(vec![
            ("anchor", vec![100, 0], Some("tops")),
            ("near", vec![100, 10], Some("shoes")),
            ("mid", vec![100, 30], Some("tops")),
        ]);
        let (_dir, _store, engine) = setup(images);
        engine
            .generate(&products, &GenerateOptions::default())
            .await
            .unwrap();

        let filtered = engine
            .similar_products("anchor", &QueryOptions::default())
            .await
            .unwrap();
        let ids: Vec<&str> = filtered
            .recommendations
            .iter()
            .map(|r| r.product_id.as_str())
            .collect();
        assert_eq!(ids, vec!["mid"]);

        let unfiltered = engine
            .similar_products(
                "anchor",
                &QueryOptions {
                    same_category_only: false,
                    ..QueryOptions::default()
                },
            )
            .await
            .unwrap();
        let ids: Vec<&str> = unfiltered
            .recommendations
            .iter()
            .map(|r| r.product_id.as_str())
            .collect();
        assert_eq!(ids, vec!["near", "mid"]);
    }

    #[tokio::test]
    async fn test_uncategorized_source_skips_category_filter() {
        let (products, images) = catalog(vec![
            ("anchor", vec![100, 0], None),
            ("near", vec![100, 10], Some("shoes")),
        ]);
        let (_dir, _store, engine) = setup(images);
        engine
            .generate(&products, &GenerateOptions::default())
            .await
            .unwrap();

        let result = engine
            .similar_products("anchor", &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(result.recommendations.len(), 1);
        assert_eq!(result.recommendations[0].product_id, "near");
    }

    #[tokio::test]
    async fn test_min_similarity_floor() {
        let (products, images) = catalog(vec![
            ("anchor", vec![100, 0], None),
            ("far", vec![0, 100], None),
        ]);
        let (_dir, _store, engine) = setup(images);
        engine
            .generate(&products, &GenerateOptions::default())
            .await
            .unwrap();

        let strict = engine
            .similar_products("anchor", &QueryOptions::default())
            .await
            .unwrap();
        assert!(strict.recommendations.is_empty());

        let lax = engine
            .similar_products(
                "anchor",
                &QueryOptions {
                    min_similarity: 0.0,
                    ..QueryOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(lax.recommendations.len(), 1);
        assert_eq!(lax.recommendations[0].product_id, "far");
    }

    #[tokio::test]
    async fn test_limit_truncates_results() {
        let (products, images) = catalog(vec![
            ("anchor", vec![100, 0], None),
            ("a", vec![100, 5], None),
            ("b", vec![100, 10], None),
            ("c", vec![100, 15], None),
            ("d", vec![100, 20], None),
        ]);
        let (_dir, _store, engine) = setup(images);
        engine
            .generate(&products, &GenerateOptions::default())
            .await
            .unwrap();

        let result = engine
            .similar_products(
                "anchor",
                &QueryOptions {
                    limit: 2,
                    ..QueryOptions::default()
                },
            )
            .await
            .unwrap();
        let ids: Vec<&str> = result
            .recommendations
            .iter()
            .map(|r| r.product_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_removed_product_never_returned() {
        let (products, images) = catalog(vec![
            ("anchor", vec![100, 0], None),
            ("close", vec![100, 10], None),
            ("mid", vec![100, 30], None),
        ]);
        let (_dir, _store, engine) = setup(images);
        engine
            .generate(&products, &GenerateOptions::default())
            .await
            .unwrap();

        assert!(engine.remove_product("close").await.unwrap());

        let result = engine
            .similar_products(
                "anchor",
                &QueryOptions {
                    min_similarity: 0.0,
                    ..QueryOptions::default()
                },
            )
            .await
            .unwrap();
        assert!(result
            .recommendations
            .iter()
            .all(|r| r.product_id != "close"));

        let gone = engine
            .similar_products("close", &QueryOptions::default())
            .await;
        assert!(matches!(gone, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_absent_product_is_false() {
        let (_dir, _store, engine) = setup(Vec::new());
        assert!(!engine.remove_product("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn test_generate_skips_existing_unless_rebuilding() {
        let (products, images) = catalog(vec![
            ("a", vec![1, 2], None),
            ("b", vec![3, 4], None),
        ]);
        let (_dir, _store, engine) = setup(images);

        let first = engine
            .generate(&products, &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(first.succeeded, 2);
        assert_eq!(first.skipped, 0);

        let second = engine
            .generate(&products, &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(second.succeeded, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(second.indexed, 2);

        let forced = engine
            .generate(
                &products,
                &GenerateOptions {
                    rebuild: true,
                    ..GenerateOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(forced.succeeded, 2);
        assert_eq!(forced.skipped, 0);
    }

    #[tokio::test]
    async fn test_generate_category_and_limit() {
        let (products, images) = catalog(vec![
            ("t1", vec![1, 2], Some("tops")),
            ("s1", vec![3, 4], Some("shoes")),
            ("t2", vec![5, 6], Some("tops")),
        ]);
        let (_dir, store, engine) = setup(images);

        let stats = engine
            .generate(
                &products,
                &GenerateOptions {
                    category: Some("tops".to_string()),
                    limit: Some(1),
                    ..GenerateOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.succeeded, 1);
        assert!(store.exists("t1").unwrap());
        assert!(!store.exists("s1").unwrap());
        assert!(!store.exists("t2").unwrap());
    }

    #[tokio::test]
    async fn test_generate_continues_past_failures() {
        let (mut products, images) = catalog(vec![
            ("good-1", vec![1, 2], None),
            ("good-2", vec![3, 4], None),
        ]);
        products.push(ProductSource {
            product_id: "broken".to_string(),
            image_url: "http://images.test/missing.jpg".to_string(),
            category: None,
        });
        let (_dir, _store, engine) = setup(images);

        let stats = engine
            .generate(&products, &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.indexed, 2);
        assert_eq!(stats.failures.len(), 1);
        assert_eq!(stats.failures[0].product_id, "broken");
        assert!(stats.failures[0].reason.contains("Failed to fetch image"));
    }

    #[tokio::test]
    async fn test_generate_with_model_version_override() {
        let (products, images) = catalog(vec![("prod", vec![1, 2], None)]);
        let (_dir, store, engine) = setup(images);

        let stats = engine
            .generate(
                &products,
                &GenerateOptions {
                    model_version: Some("fold-v2".to_string()),
                    ..GenerateOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.indexed, 1);

        let record = store.get("prod").unwrap().unwrap();
        assert_eq!(record.model_version, "fold-v2");
    }

    #[tokio::test]
    async fn test_rebuild_skips_wrong_dimension_records() {
        let (_dir, store, engine) = setup(Vec::new());

        store
            .upsert(EmbeddingRecord::new(
                "good",
                image_url("good"),
                vec![1.0; DIM],
                "fold-test",
            ))
            .unwrap();
        store
            .upsert(EmbeddingRecord::new(
                "stale",
                image_url("stale"),
                vec![1.0, 0.0, 0.0],
                "fold-test",
            ))
            .unwrap();

        let stats = engine.rebuild_index().unwrap();
        assert_eq!(stats.loaded, 1);
        assert_eq!(stats.skipped, 1);

        let engine_stats = engine.stats().unwrap();
        assert_eq!(engine_stats.index.vector_count, 1);
    }

    #[tokio::test]
    async fn test_rebuild_only_loads_configured_model_version() {
        let (_dir, store, engine) = setup(Vec::new());

        store
            .upsert(EmbeddingRecord::new(
                "current",
                image_url("current"),
                vec![1.0; DIM],
                "fold-test",
            ))
            .unwrap();
        store
            .upsert(EmbeddingRecord::new(
                "legacy",
                image_url("legacy"),
                vec![1.0; DIM],
                "fold-v0",
            ))
            .unwrap();

        let stats = engine.rebuild_index().unwrap();
        assert_eq!(stats.loaded, 1);

        let engine_stats = engine.stats().unwrap();
        assert_eq!(engine_stats.index.vector_count, 1);
        assert_eq!(engine_stats.stored_records, 2);
        assert!((engine_stats.coverage - 0.5).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_stats_health_transitions() {
        let (products, images) = catalog(vec![
            ("a", vec![1, 2], None),
            ("b", vec![3, 4], None),
        ]);
        let (_dir, _store, engine) = setup(images);

        let before = engine.stats().unwrap();
        assert_eq!(before.status, IndexStatus::IndexNotBuilt);
        assert_eq!(before.stored_records, 0);
        assert_eq!(before.coverage, 0.0);
        assert!(!before.index_file_exists);
        assert!(!before.mapping_file_exists);

        engine
            .generate(&products, &GenerateOptions::default())
            .await
            .unwrap();

        let after = engine.stats().unwrap();
        assert_eq!(after.status, IndexStatus::Healthy);
        assert_eq!(after.index.vector_count, 2);
        assert_eq!(after.stored_records, 2);
        assert!((after.coverage - 1.0).abs() < f32::EPSILON);
        assert!(after.index_file_exists);
        assert!(after.mapping_file_exists);
        assert_eq!(after.model_versions, vec![("fold-test".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_available_products_sorted_by_category_then_id() {
        let (products, images) = catalog(vec![
            ("b-prod", vec![1, 2], Some("tops")),
            ("a-prod", vec![3, 4], None),
            ("c-prod", vec![5, 6], Some("shoes")),
        ]);
        let (_dir, _store, engine) = setup(images);
        engine
            .generate(&products, &GenerateOptions::default())
            .await
            .unwrap();

        let listed = engine.available_products().unwrap();
        let ids: Vec<&str> = listed.iter().map(|s| s.product_id.as_str()).collect();
        assert_eq!(ids, vec!["a-prod", "c-prod", "b-prod"]);
    }

    #[tokio::test]
    async fn test_embed_product_is_immediately_searchable() {
        let (products, images) = catalog(vec![
            ("anchor", vec![100, 0], None),
            ("close", vec![100, 10], None),
        ]);
        let (_dir, _store, engine) = setup(images);

        let record = engine.embed_product(&products[0], false).await.unwrap();
        assert_eq!(record.dimension(), DIM);
        engine.embed_product(&products[1], false).await.unwrap();

        let result = engine
            .similar_products("anchor", &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(result.indexed_total, 2);
        assert_eq!(result.recommendations[0].product_id, "close");
    }

    #[tokio::test]
    async fn test_similarity_from_distance_bounds() {
        assert_eq!(similarity_from_distance(0.0), 1.0);
        assert!(similarity_from_distance(1.0) - 0.5 < f32::EPSILON);
        let tiny = similarity_from_distance(1_000_000.0);
        assert!(tiny > 0.0 && tiny < 0.001);
    }
}
