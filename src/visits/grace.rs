//! Grace period tracking for repeat visitors
//!
//! Each scope owns a map of `grace_key(anonymized ip) -> expiry` (Unix
//! seconds). Expired entries are pruned lazily at the start of every check;
//! there is no background sweeper.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::models::{GraceContext, TargetId};
use crate::storage::{KeyLocks, MetadataStore, OptionStore, StorageResult};

pub const GRACE_DATA_KEY: &str = "vn_ip_grace_period_data";

pub type GraceMap = BTreeMap<String, i64>;

/// Which map a grace entry lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraceScope {
    Site,
    Target(TargetId),
}

impl GraceScope {
    /// Resolve the configured context for a visited target.
    ///
    /// Returns `None` when grace tracking does not apply: unknown context, or
    /// a per-post context on a target that has no map of its own (terms).
    pub fn resolve(context: Option<GraceContext>, target: &TargetId) -> Option<Self> {
        match context? {
            GraceContext::Site => Some(GraceScope::Site),
            GraceContext::Post if target.supports_target_scope() => {
                Some(GraceScope::Target(*target))
            }
            GraceContext::Post => None,
        }
    }

    fn lock_key(&self) -> String {
        match self {
            GraceScope::Site => "grace:site".to_string(),
            GraceScope::Target(target) => format!("grace:{}", target.storage_key()),
        }
    }
}

pub struct GracePeriodTracker {
    options: Arc<dyn OptionStore>,
    meta: Arc<dyn MetadataStore>,
    clock: Arc<dyn Clock>,
    locks: KeyLocks,
}

impl GracePeriodTracker {
    pub fn new(
        options: Arc<dyn OptionStore>,
        meta: Arc<dyn MetadataStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            options,
            meta,
            clock,
            locks: KeyLocks::new(),
        }
    }

    /// Whether `key` is still inside its grace period. Prunes first.
    pub async fn is_active(&self, scope: GraceScope, key: &str) -> StorageResult<bool> {
        let live = self.prune(scope).await?;
        Ok(live.contains_key(key))
    }

    /// Start (or restart) the grace period for `key`
    pub async fn record(&self, scope: GraceScope, key: &str, duration_secs: u64) -> StorageResult<()> {
        let _guard = self.locks.lock(&scope.lock_key()).await;

        let mut map = self.load(scope).await?;
        let expiry = self
            .clock
            .now()
            .saturating_add(i64::try_from(duration_secs).unwrap_or(i64::MAX));
        map.insert(key.to_string(), expiry);
        self.store(scope, &map).await
    }

    /// Admit `key` unless it is still inside its grace period, starting a new
    /// period on admission. Check and insert happen under one scope lock, so
    /// two concurrent visitors with the same key cannot both be admitted.
    pub async fn check_and_record(
        &self,
        scope: GraceScope,
        key: &str,
        duration_secs: u64,
    ) -> StorageResult<bool> {
        let _guard = self.locks.lock(&scope.lock_key()).await;

        let mut map = self.load(scope).await?;
        let before = map.len();
        let now = self.clock.now();
        map.retain(|_, expiry| *expiry > now);

        if map.contains_key(key) {
            if map.len() != before {
                self.store(scope, &map).await?;
            }
            return Ok(false);
        }

        let expiry = now.saturating_add(i64::try_from(duration_secs).unwrap_or(i64::MAX));
        map.insert(key.to_string(), expiry);
        self.store(scope, &map).await?;
        Ok(true)
    }

    /// Drop lock entries for scopes nobody is working on
    pub fn release_idle_locks(&self) {
        self.locks.release_idle();
    }

    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    /// Remove entries with `expiry <= now` and return the survivors.
    /// The map is only written back when something was removed.
    pub async fn prune(&self, scope: GraceScope) -> StorageResult<GraceMap> {
        let _guard = self.locks.lock(&scope.lock_key()).await;

        let mut map = self.load(scope).await?;
        let before = map.len();
        let now = self.clock.now();
        map.retain(|_, expiry| *expiry > now);

        if map.len() != before {
            debug!(scope = ?scope, removed = before - map.len(), "Pruned expired grace entries");
            self.store(scope, &map).await?;
        }

        Ok(map)
    }

    async fn load(&self, scope: GraceScope) -> StorageResult<GraceMap> {
        let stored = match scope {
            GraceScope::Site => self.options.get_option(GRACE_DATA_KEY).await?,
            GraceScope::Target(target) => self.meta.get_meta(&target, GRACE_DATA_KEY).await?,
        };

        Ok(match stored {
            None | Some(Value::Null) => GraceMap::new(),
            Some(Value::Object(entries)) => entries
                .into_iter()
                .filter_map(|(key, expiry)| expiry.as_i64().map(|expiry| (key, expiry)))
                .collect(),
            Some(other) => {
                warn!(scope = ?scope, value = %other, "Discarding malformed grace period data");
                GraceMap::new()
            }
        })
    }

    async fn store(&self, scope: GraceScope, map: &GraceMap) -> StorageResult<()> {
        let value = serde_json::to_value(map)?;
        match scope {
            GraceScope::Site => self.options.set_option(GRACE_DATA_KEY, value).await,
            GraceScope::Target(target) => self.meta.set_meta(&target, GRACE_DATA_KEY, value).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn tracker() -> (Arc<MemoryStore>, Arc<ManualClock>, GracePeriodTracker) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000));
        let tracker = GracePeriodTracker::new(store.clone(), store.clone(), clock.clone());
        (store, clock, tracker)
    }

    #[test]
    fn test_scope_resolution() {
        let post = TargetId::post(4);
        let term = TargetId::term(4);

        assert_eq!(GraceScope::resolve(Some(GraceContext::Site), &term), Some(GraceScope::Site));
        assert_eq!(
            GraceScope::resolve(Some(GraceContext::Post), &post),
            Some(GraceScope::Target(post))
        );
        assert_eq!(GraceScope::resolve(Some(GraceContext::Post), &term), None);
        assert_eq!(GraceScope::resolve(None, &post), None);
    }

    #[tokio::test]
    async fn test_record_then_expire() {
        let (_, clock, tracker) = tracker();

        tracker.record(GraceScope::Site, "abc", 300).await.unwrap();
        assert!(tracker.is_active(GraceScope::Site, "abc").await.unwrap());

        clock.advance(299);
        assert!(tracker.is_active(GraceScope::Site, "abc").await.unwrap());

        clock.advance(1);
        assert!(!tracker.is_active(GraceScope::Site, "abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_duration_expires_immediately() {
        let (_, clock, tracker) = tracker();

        tracker.record(GraceScope::Site, "abc", 0).await.unwrap();
        clock.advance(1);
        assert!(!tracker.is_active(GraceScope::Site, "abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_scopes_are_independent() {
        let (_, _, tracker) = tracker();
        let post = GraceScope::Target(TargetId::post(1));

        tracker.record(post, "abc", 60).await.unwrap();
        assert!(tracker.is_active(post, "abc").await.unwrap());
        assert!(!tracker.is_active(GraceScope::Site, "abc").await.unwrap());
        assert!(!tracker
            .is_active(GraceScope::Target(TargetId::post(2)), "abc")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_prune_writes_only_when_something_expired() {
        let (store, clock, tracker) = tracker();

        tracker.record(GraceScope::Site, "a", 10).await.unwrap();
        tracker.record(GraceScope::Site, "b", 100).await.unwrap();
        let writes = store.write_count();

        let live = tracker.prune(GraceScope::Site).await.unwrap();
        assert_eq!(live.len(), 2);
        assert_eq!(store.write_count(), writes);

        clock.advance(50);
        let live = tracker.prune(GraceScope::Site).await.unwrap();
        assert_eq!(live.keys().collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(store.write_count(), writes + 1);
        assert_eq!(
            store.get_option(GRACE_DATA_KEY).await.unwrap(),
            Some(json!({ "b": 1_100 }))
        );
    }

    #[tokio::test]
    async fn test_record_overwrites_expiry() {
        let (_, clock, tracker) = tracker();

        tracker.record(GraceScope::Site, "a", 10).await.unwrap();
        clock.advance(5);
        tracker.record(GraceScope::Site, "a", 10).await.unwrap();
        clock.advance(8);
        assert!(tracker.is_active(GraceScope::Site, "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_record_surfaces_storage_failure() {
        let (store, _, tracker) = tracker();
        store.set_fail_writes(true);
        assert!(tracker.record(GraceScope::Site, "a", 10).await.is_err());
    }

    #[tokio::test]
    async fn test_check_and_record_admits_once_per_period() {
        let (_, clock, tracker) = tracker();

        assert!(tracker.check_and_record(GraceScope::Site, "a", 300).await.unwrap());
        assert!(!tracker.check_and_record(GraceScope::Site, "a", 300).await.unwrap());
        assert!(tracker.check_and_record(GraceScope::Site, "b", 300).await.unwrap());

        clock.advance(300);
        assert!(tracker.check_and_record(GraceScope::Site, "a", 300).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_check_and_record_admits_one() {
        let (_, _, tracker) = tracker();
        let tracker = Arc::new(tracker);

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                tokio::spawn(async move {
                    tracker
                        .check_and_record(GraceScope::Site, "same", 300)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }

    #[tokio::test]
    async fn test_idle_locks_are_released() {
        let (_, _, tracker) = tracker();
        for id in 0..5 {
            let scope = GraceScope::Target(TargetId::post(id));
            tracker.check_and_record(scope, "a", 60).await.unwrap();
        }
        assert_eq!(tracker.lock_count(), 5);

        tracker.release_idle_locks();
        assert_eq!(tracker.lock_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_data_is_treated_as_empty() {
        let (store, _, tracker) = tracker();
        store.set_option(GRACE_DATA_KEY, json!("garbage")).await.unwrap();
        assert!(!tracker.is_active(GraceScope::Site, "a").await.unwrap());
    }
}
