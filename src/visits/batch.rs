//! Per-target visit batches awaiting a periodic digest
//!
//! Batches are persisted as a list under the target's `vn_visitors` metadata
//! key. Every read-modify-write of one target's list runs under that target's
//! lock, so concurrent appends and flushes never lose records.

use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use crate::models::{TargetId, VisitRecord};
use crate::storage::{KeyLocks, MetadataStore, StorageResult};

pub const BATCH_KEY: &str = "vn_visitors";

pub struct BatchAccumulator {
    meta: Arc<dyn MetadataStore>,
    locks: KeyLocks,
}

impl BatchAccumulator {
    pub fn new(meta: Arc<dyn MetadataStore>) -> Self {
        Self {
            meta,
            locks: KeyLocks::new(),
        }
    }

    /// Append a record, creating the batch if needed. Returns the new size.
    pub async fn append(&self, target: &TargetId, record: VisitRecord) -> StorageResult<usize> {
        let _guard = self.locks.lock(&target.storage_key()).await;

        let mut records = self.load(target).await?;
        records.push(record);
        self.store(target, &records).await?;
        Ok(records.len())
    }

    /// Take the whole batch and clear it.
    ///
    /// An empty batch is returned without touching storage. If clearing fails
    /// the error is returned and the stored batch is left as it was.
    pub async fn flush(&self, target: &TargetId) -> StorageResult<Vec<VisitRecord>> {
        let _guard = self.locks.lock(&target.storage_key()).await;

        let records = self.load(target).await?;
        if records.is_empty() {
            return Ok(records);
        }

        self.store(target, &[]).await?;
        Ok(records)
    }

    /// Current batch contents, in arrival order, without clearing
    pub async fn snapshot(&self, target: &TargetId) -> StorageResult<Vec<VisitRecord>> {
        let _guard = self.locks.lock(&target.storage_key()).await;
        self.load(target).await
    }

    /// Remove records that were delivered from a previous snapshot.
    ///
    /// Records appended after the snapshot are kept. Each delivered record
    /// removes at most one stored occurrence.
    pub async fn acknowledge(&self, target: &TargetId, delivered: &[VisitRecord]) -> StorageResult<()> {
        if delivered.is_empty() {
            return Ok(());
        }

        let _guard = self.locks.lock(&target.storage_key()).await;

        let mut records = self.load(target).await?;
        let before = records.len();
        for sent in delivered {
            if let Some(pos) = records.iter().position(|r| r == sent) {
                records.remove(pos);
            }
        }

        if records.len() != before {
            self.store(target, &records).await?;
        }
        Ok(())
    }

    /// Drop lock entries for targets nobody is working on
    pub fn release_idle_locks(&self) {
        self.locks.release_idle();
    }

    /// Number of per-target lock entries currently kept
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    pub async fn is_empty(&self, target: &TargetId) -> StorageResult<bool> {
        Ok(self.load(target).await?.is_empty())
    }

    async fn load(&self, target: &TargetId) -> StorageResult<Vec<VisitRecord>> {
        match self.meta.get_meta(target, BATCH_KEY).await? {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items
                .into_iter()
                .filter_map(|item| match serde_json::from_value::<VisitRecord>(item) {
                    Ok(record) => Some(record),
                    Err(err) => {
                        warn!(target_id = %target, error = %err, "Skipping malformed visitor entry");
                        None
                    }
                })
                .collect()),
            Some(other) => {
                warn!(target_id = %target, value = %other, "Visitor list is not an array, ignoring");
                Ok(Vec::new())
            }
        }
    }

    async fn store(&self, target: &TargetId, records: &[VisitRecord]) -> StorageResult<()> {
        let value = serde_json::to_value(records)?;
        self.meta.set_meta(target, BATCH_KEY, value).await
    }
}
