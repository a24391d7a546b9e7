use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::models::TargetId;
use crate::storage::{row_id, MetadataStore, OptionStore, StorageError, StorageResult};

/// In-process store backed by concurrent hash maps
///
/// Writes can be made to fail on demand, which lets callers exercise the
/// storage failure paths without a real database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    meta: DashMap<(TargetId, String), Value>,
    options: DashMap<String, Value>,
    writes: AtomicU64,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every following write return `StorageError::Unavailable`
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "memory store is rejecting writes".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn get_meta(&self, target: &TargetId, key: &str) -> StorageResult<Option<Value>> {
        row_id(target)?;
        Ok(self
            .meta
            .get(&(*target, key.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn set_meta(&self, target: &TargetId, key: &str, value: Value) -> StorageResult<()> {
        row_id(target)?;
        self.check_writable()?;
        self.meta.insert((*target, key.to_string()), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn targets_with_meta(&self, key: &str, value: &Value) -> StorageResult<Vec<TargetId>> {
        let mut targets: Vec<TargetId> = self
            .meta
            .iter()
            .filter(|entry| entry.key().1 == key && entry.value() == value)
            .map(|entry| entry.key().0)
            .collect();
        targets.sort();
        Ok(targets)
    }
}

#[async_trait]
impl OptionStore for MemoryStore {
    async fn get_option(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.options.get(key).map(|entry| entry.value().clone()))
    }

    async fn set_option(&self, key: &str, value: Value) -> StorageResult<()> {
        self.check_writable()?;
        self.options.insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
