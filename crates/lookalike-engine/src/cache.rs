//! In-memory TTL cache for computed embeddings.
//!
//! Product pages request the same recommendations repeatedly; caching the
//! query embedding by product id avoids re-fetching and re-embedding the
//! image on every hit. Entries expire after a configurable TTL and the
//! cache evicts its oldest entry when full.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use lookalike_embeddings::Embedding;
use tokio::sync::RwLock;
use tracing::debug;

struct CacheEntry {
    embedding: Embedding,
    inserted_at: Instant,
}

/// Bounded TTL cache keyed by product id
pub struct EmbeddingCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl EmbeddingCache {
    /// Create a cache holding at most `max_entries` embeddings for `ttl`
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries,
        }
    }

    /// Look up a live entry, treating expired entries as misses
    pub async fn get(&self, product_id: &str) -> Option<Embedding> {
        let entries = self.entries.read().await;
        let entry = entries.get(product_id)?;
        if entry.inserted_at.elapsed() >= self.ttl {
            debug!(product_id, "Cache entry expired");
            return None;
        }
        Some(entry.embedding.clone())
    }

    /// Insert an embedding, purging expired entries and evicting the oldest
    /// live entry if the cache is full
    pub async fn put(&self, product_id: &str, embedding: Embedding) {
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);

        if entries.len() >= self.max_entries && !entries.contains_key(product_id) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted_at)
                .map(|(id, _)| id.clone())
            {
                debug!(product_id = %oldest, "Evicting oldest cache entry");
                entries.remove(&oldest);
            }
        }

        entries.insert(
            product_id.to_string(),
            CacheEntry {
                embedding,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop a single entry, returning whether it was present
    pub async fn invalidate(&self, product_id: &str) -> bool {
        self.entries.write().await.remove(product_id).is_some()
    }

    /// Drop all entries
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        debug!(count, "Cleared embedding cache");
    }

    /// Number of entries currently held, expired or not
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
