//! RocksDB wrapper for the embedding record store.
//!
//! One column family keyed by product-id bytes, JSON-encoded records as
//! values. Keys iterate in bytewise order, so id listings come out sorted
//! for free.

use std::collections::BTreeMap;
use std::path::Path;

use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use tracing::{debug, info};

use crate::error::StorageError;
use crate::record::EmbeddingRecord;

/// Column family name for embedding records
pub const CF_EMBEDDINGS: &str = "embeddings";

/// Persistent store for product image embeddings
pub struct EmbeddingStore {
    db: DB,
}

impl EmbeddingStore {
    /// Open the store at the given path, creating it if necessary.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening embedding store at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        // Records are rewritten wholesale on re-embedding runs
        db_opts.set_compaction_style(rocksdb::DBCompactionStyle::Universal);
        db_opts.set_max_background_jobs(4);

        let cf = ColumnFamilyDescriptor::new(CF_EMBEDDINGS, Options::default());
        let db = DB::open_cf_descriptors(&db_opts, path, vec![cf])?;

        Ok(Self { db })
    }

    fn embeddings_cf(&self) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(CF_EMBEDDINGS)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(CF_EMBEDDINGS.to_string()))
    }

    /// Insert or replace the record for a product.
    ///
    /// Returns (stored record, created) where created=false means an
    /// existing record was replaced. Replacement keeps the original
    /// `created_at` and bumps `updated_at`.
    pub fn upsert(
        &self,
        record: EmbeddingRecord,
    ) -> Result<(EmbeddingRecord, bool), StorageError> {
        let cf = self.embeddings_cf()?;

        let existing = self.get(&record.product_id)?;
        let created = existing.is_none();

        let mut stored = record;
        stored.updated_at = chrono::Utc::now();
        if let Some(previous) = existing {
            stored.created_at = previous.created_at;
        }

        self.db
            .put_cf(&cf, stored.product_id.as_bytes(), stored.to_bytes()?)?;

        debug!(
            product_id = %stored.product_id,
            model_version = %stored.model_version,
            created = created,
            "Stored embedding record"
        );
        Ok((stored, created))
    }

    /// Get the record for a product.
    pub fn get(&self, product_id: &str) -> Result<Option<EmbeddingRecord>, StorageError> {
        let cf = self.embeddings_cf()?;
        match self.db.get_cf(&cf, product_id.as_bytes())? {
            Some(bytes) => Ok(Some(EmbeddingRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Check whether a product has a stored record.
    pub fn exists(&self, product_id: &str) -> Result<bool, StorageError> {
        let cf = self.embeddings_cf()?;
        Ok(self.db.get_cf(&cf, product_id.as_bytes())?.is_some())
    }

    /// Delete the record for a product. Returns whether it was present.
    pub fn delete(&self, product_id: &str) -> Result<bool, StorageError> {
        let cf = self.embeddings_cf()?;
        if self.db.get_cf(&cf, product_id.as_bytes())?.is_none() {
            return Ok(false);
        }
        self.db.delete_cf(&cf, product_id.as_bytes())?;
        debug!(product_id = %product_id, "Deleted embedding record");
        Ok(true)
    }

    /// Count all stored records.
    pub fn count(&self) -> Result<usize, StorageError> {
        let cf = self.embeddings_cf()?;
        let mut count = 0;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Load all records, in product-id order.
    pub fn all(&self) -> Result<Vec<EmbeddingRecord>, StorageError> {
        let cf = self.embeddings_cf()?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            records.push(EmbeddingRecord::from_bytes(&value)?);
        }
        Ok(records)
    }

    /// Load all records produced by a specific model version.
    pub fn for_model(&self, model_version: &str) -> Result<Vec<EmbeddingRecord>, StorageError> {
        let records = self.all()?;
        Ok(records
            .into_iter()
            .filter(|r| r.model_version == model_version)
            .collect())
    }

    /// List all stored product ids, sorted.
    pub fn product_ids(&self) -> Result<Vec<String>, StorageError> {
        let cf = self.embeddings_cf()?;
        let mut ids = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item?;
            ids.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(ids)
    }

    /// Count records per model version, sorted by version.
    pub fn model_versions(&self) -> Result<Vec<(String, usize)>, StorageError> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for record in self.all()? {
            *counts.entry(record.model_version).or_insert(0) += 1;
        }
        Ok(counts.into_iter().collect())
    }

    /// Delete all records. Returns the number deleted.
    pub fn clear(&self) -> Result<usize, StorageError> {
        let cf = self.embeddings_cf()?;
        let mut batch = WriteBatch::default();
        let mut count = 0;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item?;
            batch.delete_cf(&cf, &key);
            count += 1;
        }
        if count > 0 {
            self.db.write(batch)?;
            info!(deleted = count, "Cleared embedding store");
        }
        Ok(count)
    }
}
