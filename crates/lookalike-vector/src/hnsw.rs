//! HNSW index backend using usearch.
//!
//! Approximate alternative to the flat index for large catalogs. usearch
//! keys are u64, so a key ↔ product-id mapping is persisted as the JSON
//! half of the paired artifact, next to the native index file. Removal is
//! native here (no array splice).

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::VectorError;
use crate::flat::MAPPING_FILE;
use crate::index::{IndexStats, Neighbor, VectorIndex};

/// File name of the native usearch artifact inside the index directory.
pub const HNSW_INDEX_FILE: &str = "image_index.usearch";

/// HNSW index configuration
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Embedding dimension (must match model)
    pub dimension: usize,
    /// Number of connections per layer (M parameter)
    pub connectivity: usize,
    /// Build-time search depth (ef_construction)
    pub expansion_add: usize,
    /// Query-time search depth (ef_search)
    pub expansion_search: usize,
    /// Directory the paired artifact lives in
    pub index_dir: PathBuf,
    /// Maximum capacity (for pre-allocation)
    pub capacity: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            dimension: 2048, // ResNet-50 features
            connectivity: 16,
            expansion_add: 200,
            expansion_search: 100,
            index_dir: PathBuf::from("./image-index"),
            capacity: 100_000,
        }
    }
}

impl HnswConfig {
    pub fn new(dimension: usize, index_dir: impl Into<PathBuf>) -> Self {
        Self {
            dimension,
            index_dir: index_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_connectivity(mut self, m: usize) -> Self {
        self.connectivity = m;
        self
    }

    pub fn with_expansion(mut self, ef_add: usize, ef_search: usize) -> Self {
        self.expansion_add = ef_add;
        self.expansion_search = ef_search;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    fn options(&self) -> IndexOptions {
        IndexOptions {
            dimensions: self.dimension,
            metric: MetricKind::L2sq, // Squared L2, same ordering as the flat backend
            quantization: ScalarKind::F32,
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            expansion_search: self.expansion_search,
            multi: false, // Single vector per key
        }
    }
}

/// Persisted key ↔ product-id mapping.
#[derive(Debug, Default, Serialize, Deserialize)]
struct KeyMapping {
    next_key: u64,
    entries: Vec<(u64, String)>,
}

/// HNSW index wrapper around usearch.
pub struct HnswIndex {
    index: RwLock<Index>,
    config: HnswConfig,
    by_key: HashMap<u64, String>,
    by_id: HashMap<String, u64>,
    next_key: u64,
}

impl HnswIndex {
    /// Create a new HNSW index or open an existing paired artifact.
    pub fn open_or_create(config: HnswConfig) -> Result<Self, VectorError> {
        let index_file = config.index_dir.join(HNSW_INDEX_FILE);
        let mapping_file = config.index_dir.join(MAPPING_FILE);
        let options = config.options();

        match (index_file.exists(), mapping_file.exists()) {
            (true, true) => {
                info!(path = ?index_file, "Opening existing image index");
                let idx = Index::new(&options).map_err(|e| VectorError::Index(e.to_string()))?;
                idx.load(
                    index_file
                        .to_str()
                        .ok_or_else(|| VectorError::Index("Invalid path encoding".to_string()))?,
                )
                .map_err(|e| VectorError::Index(format!("Failed to load: {}", e)))?;

                let mapping_json = fs::read_to_string(&mapping_file)?;
                let mapping: KeyMapping = serde_json::from_str(&mapping_json)?;
                if mapping.entries.len() != idx.size() {
                    return Err(VectorError::Corrupt(format!(
                        "id mapping lists {} products but index holds {} vectors",
                        mapping.entries.len(),
                        idx.size()
                    )));
                }

                let by_key: HashMap<u64, String> = mapping.entries.iter().cloned().collect();
                let by_id: HashMap<String, u64> = mapping
                    .entries
                    .into_iter()
                    .map(|(key, id)| (id, key))
                    .collect();

                Ok(Self {
                    index: RwLock::new(idx),
                    config,
                    by_key,
                    by_id,
                    next_key: mapping.next_key,
                })
            }
            (false, false) => {
                info!(path = ?index_file, dim = config.dimension, "Creating new image index");
                fs::create_dir_all(&config.index_dir)?;
                let idx = Index::new(&options).map_err(|e| VectorError::Index(e.to_string()))?;
                idx.reserve(config.capacity)
                    .map_err(|e| VectorError::Index(e.to_string()))?;

                Ok(Self {
                    index: RwLock::new(idx),
                    config,
                    by_key: HashMap::new(),
                    by_id: HashMap::new(),
                    next_key: 0,
                })
            }
            // A lone half of the pair means an interrupted save.
            _ => Err(VectorError::Corrupt(format!(
                "paired artifact incomplete under {}",
                config.index_dir.display()
            ))),
        }
    }

    /// Get the native index file path
    pub fn index_file(&self) -> PathBuf {
        self.config.index_dir.join(HNSW_INDEX_FILE)
    }

    fn mapping_file(&self) -> PathBuf {
        self.config.index_dir.join(MAPPING_FILE)
    }
}

impl VectorIndex for HnswIndex {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn len(&self) -> usize {
        self.index.read().unwrap().size()
    }

    #[allow(clippy::readonly_write_lock)] // usearch::Index uses interior mutability
    fn add(&mut self, product_id: &str, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.config.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.config.dimension,
                actual: vector.len(),
            });
        }

        let index = self.index.write().unwrap();
        let key = match self.by_id.get(product_id).copied() {
            // Keep the key stable across replacement.
            Some(key) => {
                index
                    .remove(key)
                    .map_err(|e| VectorError::Index(e.to_string()))?;
                key
            }
            None => {
                let key = self.next_key;
                self.next_key += 1;
                self.by_key.insert(key, product_id.to_string());
                self.by_id.insert(product_id.to_string(), key);
                key
            }
        };
        index
            .add(key, vector)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        debug!(key = key, product_id = %product_id, "Added vector");
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, VectorError> {
        if query.len() != self.config.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.config.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let index = self.index.read().unwrap();
        let results = index
            .search(query, k)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        let neighbors: Vec<Neighbor> = results
            .keys
            .iter()
            .zip(results.distances.iter())
            .filter_map(|(&key, &dist)| {
                self.by_key
                    .get(&key)
                    .map(|product_id| Neighbor::new(product_id.clone(), dist))
            })
            .collect();

        debug!(k = k, found = neighbors.len(), "Search complete");
        Ok(neighbors)
    }

    #[allow(clippy::readonly_write_lock)] // usearch::Index uses interior mutability
    fn remove(&mut self, product_id: &str) -> Result<bool, VectorError> {
        let Some(&key) = self.by_id.get(product_id) else {
            return Ok(false);
        };

        let index = self.index.write().unwrap();
        index
            .remove(key)
            .map_err(|e| VectorError::Index(e.to_string()))?;
        drop(index);

        self.by_id.remove(product_id);
        self.by_key.remove(&key);
        debug!(key = key, product_id = %product_id, "Removed vector");
        Ok(true)
    }

    fn contains(&self, product_id: &str) -> bool {
        self.by_id.contains_key(product_id)
    }

    fn stats(&self) -> IndexStats {
        let index = self.index.read().unwrap();
        let size_bytes = fs::metadata(self.index_file())
            .map(|m| m.len())
            .unwrap_or(0);

        IndexStats {
            vector_count: index.size(),
            dimension: self.config.dimension,
            size_bytes,
            kind: "hnsw",
        }
    }

    fn save(&self) -> Result<(), VectorError> {
        fs::create_dir_all(&self.config.index_dir)?;

        let index = self.index.read().unwrap();
        let path = self.index_file();
        let path_str = path
            .to_str()
            .ok_or_else(|| VectorError::Index("Invalid path encoding".to_string()))?;
        index
            .save(path_str)
            .map_err(|e| VectorError::Index(format!("Failed to save: {}", e)))?;

        let mut entries: Vec<(u64, String)> = self
            .by_key
            .iter()
            .map(|(&key, id)| (key, id.clone()))
            .collect();
        entries.sort_by_key(|(key, _)| *key);
        let mapping = KeyMapping {
            next_key: self.next_key,
            entries,
        };
        fs::write(self.mapping_file(), serde_json::to_string_pretty(&mapping)?)?;

        info!(path = ?path, vectors = index.size(), "Saved image index");
        Ok(())
    }

    fn clear(&mut self) -> Result<(), VectorError> {
        // Recreate empty index
        let new_index =
            Index::new(&self.config.options()).map_err(|e| VectorError::Index(e.to_string()))?;
        new_index
            .reserve(self.config.capacity)
            .map_err(|e| VectorError::Index(e.to_string()))?;

        *self.index.write().unwrap() = new_index;
        self.by_key.clear();
        self.by_id.clear();
        self.next_key = 0;
        info!("Cleared image index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 64;

    fn random_vector(dim: usize) -> Vec<f32> {
        use rand::Rng;
        let mut rng = rand::rng();
        (0..dim).map(|_| rng.random()).collect()
    }

    #[test]
    fn test_create_index() {
        let temp = TempDir::new().unwrap();
        let config = HnswConfig::new(DIM, temp.path());
        let index = HnswIndex::open_or_create(config).unwrap();
        assert_eq!(index.dimension(), DIM);
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_add_and_search() {
        let temp = TempDir::new().unwrap();
        let config = HnswConfig::new(DIM, temp.path()).with_capacity(100);
        let mut index = HnswIndex::open_or_create(config).unwrap();

        for i in 0..10 {
            index
                .add(&format!("prod-{}", i), &random_vector(DIM))
                .unwrap();
        }

        assert_eq!(index.len(), 10);

        let query = random_vector(DIM);
        let results = index.search(&query, 5).unwrap();
        assert_eq!(results.len(), 5);

        // Nearest first: distances ascend.
        for i in 1..results.len() {
            assert!(results[i - 1].distance <= results[i].distance);
        }
    }

    #[test]
    fn test_self_match_at_distance_zero() {
        let temp = TempDir::new().unwrap();
        let config = HnswConfig::new(DIM, temp.path()).with_capacity(100);
        let mut index = HnswIndex::open_or_create(config).unwrap();

        let target = random_vector(DIM);
        index.add("target", &target).unwrap();
        index.add("other", &random_vector(DIM)).unwrap();

        let results = index.search(&target, 1).unwrap();
        assert_eq!(results[0].product_id, "target");
        assert!(results[0].distance.abs() < 1e-5);
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let config = HnswConfig::new(DIM, temp.path()).with_capacity(100);

        {
            let mut index = HnswIndex::open_or_create(config.clone()).unwrap();
            for i in 0..5 {
                index
                    .add(&format!("prod-{}", i), &random_vector(DIM))
                    .unwrap();
            }
            index.save().unwrap();
        }

        let index = HnswIndex::open_or_create(config).unwrap();
        assert_eq!(index.len(), 5);
        assert!(index.contains("prod-3"));
    }

    #[test]
    fn test_dimension_mismatch() {
        let temp = TempDir::new().unwrap();
        let config = HnswConfig::new(DIM, temp.path());
        let mut index = HnswIndex::open_or_create(config).unwrap();

        let wrong_dim = random_vector(DIM / 2);
        let result = index.add("prod-1", &wrong_dim);
        assert!(matches!(result, Err(VectorError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_remove() {
        let temp = TempDir::new().unwrap();
        let config = HnswConfig::new(DIM, temp.path()).with_capacity(100);
        let mut index = HnswIndex::open_or_create(config).unwrap();

        index.add("prod-42", &random_vector(DIM)).unwrap();
        assert!(index.contains("prod-42"));

        let removed = index.remove("prod-42").unwrap();
        assert!(removed);
        assert!(!index.contains("prod-42"));
        assert!(!index.remove("prod-42").unwrap());

        let results = index.search(&random_vector(DIM), 10).unwrap();
        assert!(results.iter().all(|n| n.product_id != "prod-42"));
    }

    #[test]
    fn test_add_replaces_existing_product() {
        let temp = TempDir::new().unwrap();
        let config = HnswConfig::new(DIM, temp.path()).with_capacity(100);
        let mut index = HnswIndex::open_or_create(config).unwrap();

        let replacement = random_vector(DIM);
        index.add("prod-1", &random_vector(DIM)).unwrap();
        index.add("prod-1", &replacement).unwrap();

        assert_eq!(index.len(), 1);
        let results = index.search(&replacement, 1).unwrap();
        assert_eq!(results[0].product_id, "prod-1");
        assert!(results[0].distance.abs() < 1e-5);
    }

    #[test]
    fn test_clear() {
        let temp = TempDir::new().unwrap();
        let config = HnswConfig::new(DIM, temp.path()).with_capacity(100);
        let mut index = HnswIndex::open_or_create(config).unwrap();

        index.add("prod-1", &random_vector(DIM)).unwrap();
        index.clear().unwrap();
        assert!(index.is_empty());
        assert!(!index.contains("prod-1"));
    }
}
