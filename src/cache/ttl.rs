//! Query-shape keyed snapshot cache with time-based expiry

use crate::discovery::{DiscoveryOptions, WindowSnapshot};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, trace};

pub const DEFAULT_TTL: Duration = Duration::from_secs(2);

/// Which query produced a cached result, together with its options
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    AllWindows(DiscoveryOptions),
    ByProcess(i32, DiscoveryOptions),
    ByBundle(String, DiscoveryOptions),
}

impl CacheKey {
    pub fn options(&self) -> &DiscoveryOptions {
        match self {
            CacheKey::AllWindows(options)
            | CacheKey::ByProcess(_, options)
            | CacheKey::ByBundle(_, options) => options,
        }
    }
}

/// Cached snapshots plus the moment they were stored
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub snapshots: Arc<Vec<WindowSnapshot>>,
    pub created: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(snapshots: Vec<WindowSnapshot>, ttl: Duration) -> Self {
        Self {
            snapshots: Arc::new(snapshots),
            created: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.created.elapsed() > self.ttl
    }
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entries: usize,
}

/// Snapshot cache keyed by [`CacheKey`].
///
/// Writers serialize on the lock; readers proceed concurrently. Expired
/// entries are evicted lazily when read.
#[derive(Debug)]
pub struct TtlCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl TtlCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Live snapshots for `key`, counting a hit or a miss
    pub async fn get(&self, key: &CacheKey) -> Option<Arc<Vec<WindowSnapshot>>> {
        let expired = {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired() => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    trace!(?key, "Cache hit");
                    return Some(Arc::clone(&entry.snapshots));
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            let mut entries = self.entries.write().await;
            // Another writer may have refreshed it in between.
            if entries.get(key).map(CacheEntry::is_expired).unwrap_or(false) {
                entries.remove(key);
                trace!(?key, "Evicted expired entry");
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub async fn set(&self, key: CacheKey, snapshots: Vec<WindowSnapshot>) {
        self.set_with_ttl(key, snapshots, self.default_ttl).await;
    }

    pub async fn set_with_ttl(&self, key: CacheKey, snapshots: Vec<WindowSnapshot>, ttl: Duration) {
        let count = snapshots.len();
        self.entries
            .write()
            .await
            .insert(key, CacheEntry::new(snapshots, ttl));
        trace!(count, ttl_ms = ttl.as_millis() as u64, "Cached snapshots");
    }

    /// Drop results that may contain `pid`: its own entry plus every
    /// by-bundle and all-windows entry
    pub async fn invalidate_process(&self, pid: i32) -> usize {
        let removed = self
            .remove_where(|key| !matches!(key, CacheKey::ByProcess(other, _) if *other != pid))
            .await;
        debug!(pid, removed, "Invalidated process");
        removed
    }

    /// Drop results that may contain `bundle_id`: its own entry plus every
    /// by-process and all-windows entry
    pub async fn invalidate_bundle(&self, bundle_id: &str) -> usize {
        let removed = self
            .remove_where(
                |key| !matches!(key, CacheKey::ByBundle(other, _) if other.as_str() != bundle_id),
            )
            .await;
        debug!(bundle_id, removed, "Invalidated bundle");
        removed
    }

    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        entries.clear();
        debug!(removed, "Cache cleared");
        removed
    }

    pub async fn prune_expired(&self) -> usize {
        self.remove_where(|_| false).await
    }

    pub async fn statistics(&self) -> CacheStatistics {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let entries = self
            .entries
            .read()
            .await
            .values()
            .filter(|entry| !entry.is_expired())
            .count();

        CacheStatistics {
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            entries,
        }
    }

    pub fn reset_statistics(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Remove entries matching `predicate` and every expired entry
    async fn remove_where(&self, predicate: impl Fn(&CacheKey) -> bool) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, entry| !predicate(key) && !entry.is_expired());
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::snapshot::sample_snapshot;

    fn options() -> DiscoveryOptions {
        DiscoveryOptions::default()
    }

    async fn populated() -> TtlCache {
        let cache = TtlCache::default();
        cache
            .set(CacheKey::AllWindows(options()), vec![sample_snapshot(1, 10, "a")])
            .await;
        cache
            .set(CacheKey::ByProcess(10, options()), vec![sample_snapshot(1, 10, "a")])
            .await;
        cache
            .set(CacheKey::ByProcess(20, options()), vec![sample_snapshot(2, 20, "b")])
            .await;
        cache
            .set(CacheKey::ByBundle("com.a".into(), options()), vec![])
            .await;
        cache
            .set(CacheKey::ByBundle("com.b".into(), options()), vec![])
            .await;
        cache
    }

    #[tokio::test]
    async fn get_returns_exactly_what_was_set() {
        let cache = TtlCache::default();
        let key = CacheKey::AllWindows(options());
        cache
            .set(key.clone(), vec![sample_snapshot(3, 1, "x"), sample_snapshot(4, 1, "y")])
            .await;

        let hit = cache.get(&key).await.unwrap();
        let ids: Vec<u32> = hit.iter().map(|s| s.window_id).collect();
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(cache.statistics().await.hits, 1);
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss_and_evicted() {
        let cache = TtlCache::default();
        let key = CacheKey::AllWindows(options());
        cache
            .set_with_ttl(key.clone(), vec![sample_snapshot(1, 1, "")], Duration::from_millis(10))
            .await;

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(cache.get(&key).await.is_none());
        let stats = cache.statistics().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 0);
    }

    #[tokio::test]
    async fn keys_differ_by_options() {
        let cache = TtlCache::default();
        cache.set(CacheKey::AllWindows(options()), vec![]).await;
        assert!(cache
            .get(&CacheKey::AllWindows(DiscoveryOptions::fast()))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn process_invalidation_cascades_to_broader_queries() {
        let cache = populated().await;
        assert_eq!(cache.invalidate_process(10).await, 4);

        assert!(cache.get(&CacheKey::ByProcess(20, options())).await.is_some());
        assert!(cache.get(&CacheKey::AllWindows(options())).await.is_none());
        assert!(cache
            .get(&CacheKey::ByBundle("com.b".into(), options()))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn bundle_invalidation_cascades_to_process_queries() {
        let cache = populated().await;
        assert_eq!(cache.invalidate_bundle("com.a").await, 4);

        assert!(cache
            .get(&CacheKey::ByBundle("com.b".into(), options()))
            .await
            .is_some());
        assert!(cache.get(&CacheKey::ByProcess(20, options())).await.is_none());
    }

    #[tokio::test]
    async fn prune_and_statistics_reset() {
        let cache = TtlCache::new(Duration::from_millis(10));
        cache.set(CacheKey::AllWindows(options()), vec![]).await;
        cache
            .set_with_ttl(CacheKey::ByProcess(1, options()), vec![], Duration::from_secs(60))
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.prune_expired().await, 1);
        cache.get(&CacheKey::ByProcess(1, options())).await;
        cache.get(&CacheKey::AllWindows(options())).await;

        let stats = cache.statistics().await;
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);

        cache.reset_statistics();
        assert_eq!(cache.statistics().await.hits, 0);
        assert_eq!(cache.clear().await, 1);
    }
}
