//! Exact flat index over squared L2 distance.
//!
//! Brute-force scan over row-major vectors, matching the exact-search
//! behavior the recommendation pipeline was tuned against. Removal splices
//! the backing arrays rather than tombstoning, so a removed product can
//! never surface again. Persisted as a paired artifact: a checksummed
//! binary vector file plus a JSON id-mapping file listing product ids in
//! row order.

use std::fs;
use std::path::{Path, PathBuf};

use blake3::hash;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::VectorError;
use crate::index::{IndexStats, Neighbor, VectorIndex};

/// File name of the binary vector artifact inside the index directory.
pub const INDEX_FILE: &str = "image_index.bin";

/// File name of the JSON id-mapping artifact inside the index directory.
pub const MAPPING_FILE: &str = "product_mapping.json";

/// Decode limit for the vector artifact (2 GiB).
const DECODE_LIMIT: usize = 2 * 1024 * 1024 * 1024;

fn artifact_config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_fixed_int_encoding()
        .with_little_endian()
}

fn artifact_decode_config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_fixed_int_encoding()
        .with_little_endian()
        .with_limit::<DECODE_LIMIT>()
}

/// On-disk form of the vector artifact.
#[derive(Debug, Serialize, Deserialize)]
struct FlatArtifact {
    /// Serialized row-major vectors
    bytes: Vec<u8>,
    /// Number of vectors
    vector_count: u64,
    /// Embedding dimension
    dimension: u32,
    /// Blake3 checksum of `bytes`
    checksum: [u8; 32],
}

/// Exact nearest-neighbor index over parallel vector/id arrays.
pub struct FlatIndex {
    vectors: Vec<Vec<f32>>,
    product_ids: Vec<String>,
    dimension: usize,
    index_dir: PathBuf,
}

impl FlatIndex {
    /// Create an empty index that will persist under `index_dir`.
    pub fn new(dimension: usize, index_dir: impl Into<PathBuf>) -> Self {
        Self {
            vectors: Vec::new(),
            product_ids: Vec::new(),
            dimension,
            index_dir: index_dir.into(),
        }
    }

    /// Load the persisted artifact from `index_dir`, or start empty when no
    /// artifact exists yet.
    pub fn open_or_create(
        dimension: usize,
        index_dir: impl Into<PathBuf>,
    ) -> Result<Self, VectorError> {
        let index_dir = index_dir.into();
        let index_path = index_dir.join(INDEX_FILE);
        let mapping_path = index_dir.join(MAPPING_FILE);

        match (index_path.exists(), mapping_path.exists()) {
            (true, true) => Self::load(dimension, index_dir),
            (false, false) => {
                debug!(path = %index_dir.display(), "No index artifact found, starting empty");
                Ok(Self::new(dimension, index_dir))
            }
            // A lone half of the pair means an interrupted save.
            _ => Err(VectorError::Corrupt(format!(
                "paired artifact incomplete under {}",
                index_dir.display()
            ))),
        }
    }

    /// Load and validate the paired artifact.
    fn load(dimension: usize, index_dir: PathBuf) -> Result<Self, VectorError> {
        let index_path = index_dir.join(INDEX_FILE);
        let mapping_path = index_dir.join(MAPPING_FILE);

        let file_bytes = fs::read(&index_path)?;
        let (artifact, read) = bincode::serde::decode_from_slice::<FlatArtifact, _>(
            &file_bytes,
            artifact_decode_config(),
        )?;
        if read != file_bytes.len() {
            return Err(VectorError::Corrupt(format!(
                "index artifact: expected {} bytes, read {}",
                file_bytes.len(),
                read
            )));
        }
        if hash(&artifact.bytes).as_bytes() != &artifact.checksum {
            return Err(VectorError::Corrupt(
                "index artifact checksum mismatch".to_string(),
            ));
        }
        if artifact.dimension as usize != dimension {
            return Err(VectorError::Corrupt(format!(
                "index artifact dimension {} does not match configured dimension {}",
                artifact.dimension, dimension
            )));
        }

        let (vectors, read) = bincode::serde::decode_from_slice::<Vec<Vec<f32>>, _>(
            &artifact.bytes,
            artifact_decode_config(),
        )?;
        if read != artifact.bytes.len() {
            return Err(VectorError::Corrupt(format!(
                "vector payload: expected {} bytes, read {}",
                artifact.bytes.len(),
                read
            )));
        }
        if vectors.len() as u64 != artifact.vector_count {
            return Err(VectorError::Corrupt(format!(
                "vector count {} does not match recorded count {}",
                vectors.len(),
                artifact.vector_count
            )));
        }
        for (row, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                return Err(VectorError::Corrupt(format!(
                    "vector row {} has dimension {}, expected {}",
                    row,
                    vector.len(),
                    dimension
                )));
            }
        }

        let mapping_json = fs::read_to_string(&mapping_path)?;
        let product_ids: Vec<String> = serde_json::from_str(&mapping_json)?;
        if product_ids.len() != vectors.len() {
            return Err(VectorError::Corrupt(format!(
                "id mapping lists {} products but index holds {} vectors",
                product_ids.len(),
                vectors.len()
            )));
        }

        info!(
            vectors = vectors.len(),
            dimension = dimension,
            path = %index_dir.display(),
            "Loaded flat index artifact"
        );

        Ok(Self {
            vectors,
            product_ids,
            dimension,
            index_dir,
        })
    }

    /// Directory the paired artifact is persisted under.
    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    fn index_path(&self) -> PathBuf {
        self.index_dir.join(INDEX_FILE)
    }

    fn mapping_path(&self) -> PathBuf {
        self.index_dir.join(MAPPING_FILE)
    }

    fn position(&self, product_id: &str) -> Option<usize> {
        self.product_ids.iter().position(|id| id == product_id)
    }
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn add(&mut self, product_id: &str, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        match self.position(product_id) {
            Some(pos) => self.vectors[pos] = vector.to_vec(),
            None => {
                self.vectors.push(vector.to_vec());
                self.product_ids.push(product_id.to_string());
            }
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, VectorError> {
        if query.len() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let mut neighbors: Vec<Neighbor> = self
            .vectors
            .iter()
            .zip(&self.product_ids)
            .map(|(vector, product_id)| {
                Neighbor::new(product_id.clone(), squared_l2(query, vector))
            })
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        neighbors.truncate(k);
        Ok(neighbors)
    }

    fn remove(&mut self, product_id: &str) -> Result<bool, VectorError> {
        let Some(pos) = self.position(product_id) else {
            return Ok(false);
        };
        // Splice both arrays so rows and mapping stay aligned.
        self.vectors.remove(pos);
        self.product_ids.remove(pos);
        debug!(product_id = %product_id, "Removed vector from flat index");
        Ok(true)
    }

    fn contains(&self, product_id: &str) -> bool {
        self.position(product_id).is_some()
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            vector_count: self.vectors.len(),
            dimension: self.dimension,
            size_bytes: (self.vectors.len() * self.dimension * std::mem::size_of::<f32>()) as u64,
            kind: "flat",
        }
    }

    fn save(&self) -> Result<(), VectorError> {
        let bytes = bincode::serde::encode_to_vec(&self.vectors, artifact_config())?;
        let checksum = *hash(&bytes).as_bytes();
        let artifact = FlatArtifact {
            bytes,
            vector_count: self.vectors.len() as u64,
            dimension: self.dimension as u32,
            checksum,
        };

        fs::create_dir_all(&self.index_dir)?;
        let file_bytes = bincode::serde::encode_to_vec(&artifact, artifact_config())?;
        fs::write(self.index_path(), file_bytes)?;

        let mapping_json = serde_json::to_string_pretty(&self.product_ids)?;
        fs::write(self.mapping_path(), mapping_json)?;

        info!(
            vectors = self.vectors.len(),
            path = %self.index_dir.display(),
            "Saved flat index artifact"
        );
        Ok(())
    }

    fn clear(&mut self) -> Result<(), VectorError> {
        self.vectors.clear();
        self.product_ids.clear();
        Ok(())
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}
