//! Two-tier cache engine
//!
//! [`ResilientCacheEngine`] composes a [`HotTier`] in memory with a
//! [`WarmTier`] on disk. Reads check memory first and fall back to disk;
//! writes go to memory and, when the circuit allows, to disk as well.
//! Nothing a caller does through this type can fail because of the cache:
//! storage faults surface as misses, partial stores or metrics.

use crate::cache::codec::EntryCodec;
use crate::cache::config::EngineConfig;
use crate::cache::entry::CacheEntry;
use crate::cache::hot::{HotInsert, HotLookup, HotTier};
use crate::cache::storage::{StorageBackend, TokioStorage};
use crate::cache::types::{CacheHealth, CacheMetrics, CacheValue, HealthReport, StoredTier};
use crate::cache::warm::{WarmLookup, WarmTier};
use crate::error::Result;
use crate::resilience::CircuitBreaker;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Name of the breaker guarding the warm tier
pub const WARM_TIER_COMPONENT: &str = "warm_tier";

#[derive(Debug, Default)]
struct EngineCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    hot_hits: AtomicU64,
    warm_hits: AtomicU64,
    hot_misses: AtomicU64,
    warm_misses: AtomicU64,
    hot_evictions: AtomicU64,
    expirations: AtomicU64,
    promotions: AtomicU64,
    internal_errors: AtomicU64,
}

impl EngineCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Outcome of one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub hot_expired: usize,
    pub warm_expired: usize,
    pub temp_files_removed: usize,
    pub superseded_removed: usize,
}

/// Cache facade owning one hot tier, one warm tier and the warm tier's breaker
pub struct ResilientCacheEngine<V> {
    config: EngineConfig,
    hot: HotTier<V>,
    warm: WarmTier<V>,
    breaker: Arc<CircuitBreaker>,
    codec: EntryCodec,
    counters: EngineCounters,
}

impl<V: CacheValue> ResilientCacheEngine<V> {
    /// Build an engine persisting to the local filesystem.
    ///
    /// Fails only if `config` is invalid; an unusable warm directory
    /// degrades the engine instead.
    pub async fn new(config: EngineConfig) -> Result<Self> {
        Self::with_storage(config, Arc::new(TokioStorage)).await
    }

    /// Build an engine on top of a custom storage backend
    pub async fn with_storage(config: EngineConfig, storage: Arc<dyn StorageBackend>) -> Result<Self> {
        config.validate()?;

        let breaker = Arc::new(CircuitBreaker::new(
            WARM_TIER_COMPONENT,
            config.circuit_breaker_config(),
        ));
        let codec = EntryCodec::new(config.compression.compressor());

        let warm = WarmTier::open(
            config.warm_dir.clone(),
            config.warm_size_bytes,
            breaker.clone(),
            storage,
            codec.clone(),
        )
        .await;

        info!(
            hot_size_bytes = config.hot_size_bytes,
            warm_size_bytes = config.warm_size_bytes,
            warm_dir = %config.warm_dir.display(),
            "Resilient cache engine initialized"
        );

        Ok(Self {
            hot: HotTier::new(config.hot_size_bytes),
            warm,
            breaker,
            codec,
            config,
            counters: EngineCounters::default(),
        })
    }

    /// Look up `key`, checking memory first and then disk.
    ///
    /// A warm hit whose access count passes the promotion threshold is
    /// copied into the hot tier.
    pub async fn get(&self, key: &str) -> Option<V> {
        let hot_expired = match self.hot.get(key) {
            HotLookup::Hit(entry) => {
                EngineCounters::bump(&self.counters.hits);
                EngineCounters::bump(&self.counters.hot_hits);
                debug!(key = %key, "Hot hit");
                return Some(entry.payload);
            }
            HotLookup::Expired => true,
            HotLookup::Miss => false,
        };
        EngineCounters::bump(&self.counters.hot_misses);

        let lookup = self.warm.get(key).await;

        // One expiration per entry, even when both tiers held it.
        if hot_expired || matches!(lookup, Ok(WarmLookup::Expired)) {
            EngineCounters::bump(&self.counters.expirations);
        }

        match lookup {
            Ok(WarmLookup::Hit(entry)) => {
                EngineCounters::bump(&self.counters.hits);
                EngineCounters::bump(&self.counters.warm_hits);
                debug!(key = %key, access_count = entry.metadata.access_count, "Warm hit");

                let payload = entry.payload.clone();
                if entry
                    .metadata
                    .is_hot(self.config.promotion_access_count_threshold)
                {
                    self.promote_entry(entry);
                }
                Some(payload)
            }
            Ok(_) => {
                EngineCounters::bump(&self.counters.misses);
                EngineCounters::bump(&self.counters.warm_misses);
                debug!(key = %key, "Cache miss");
                None
            }
            Err(e) => {
                EngineCounters::bump(&self.counters.internal_errors);
                EngineCounters::bump(&self.counters.misses);
                EngineCounters::bump(&self.counters.warm_misses);
                error!(key = %key, error = %e, "Unexpected cache error, treating as miss");
                None
            }
        }
    }

    /// Store `payload` under `key` for `ttl`, reporting which tiers took it
    pub async fn store(&self, key: impl Into<String>, payload: V, ttl: Duration) -> StoredTier {
        let key = key.into();

        let payload_size = match self.codec.payload_size(&payload) {
            Ok(size) => size,
            Err(e) => {
                EngineCounters::bump(&self.counters.internal_errors);
                error!(key = %key, error = %e, "Payload cannot be serialized, not caching");
                return StoredTier::None;
            }
        };
        let entry = CacheEntry::new(key.clone(), payload, ttl).with_size(key.len() + payload_size);

        let hot_stored = self.insert_hot(entry.clone());
        let warm_stored = self.warm.store(&entry).await;

        let tier = StoredTier::from_flags(hot_stored, warm_stored);
        debug!(key = %key, tier = %tier, size = entry.size_bytes(), "Stored entry");
        tier
    }

    /// Store with the configured default TTL (jitter applied)
    pub async fn store_with_default_ttl(&self, key: impl Into<String>, payload: V) -> StoredTier {
        let ttl = self.config.ttl_with_jitter();
        self.store(key, payload, ttl).await
    }

    /// Copy a warm entry into the hot tier.
    ///
    /// Returns whether the key is now in memory. Reading the warm copy
    /// counts as an access but not as a cache hit.
    pub async fn promote(&self, key: &str) -> bool {
        if self.hot.contains_key(key) {
            return true;
        }
        match self.warm.get(key).await {
            Ok(WarmLookup::Hit(entry)) => self.promote_entry(entry),
            Ok(_) => false,
            Err(e) => {
                EngineCounters::bump(&self.counters.internal_errors);
                warn!(key = %key, error = %e, "Promotion lookup failed");
                false
            }
        }
    }

    /// Remove `key` from both tiers, returning whether either held it
    pub async fn remove(&self, key: &str) -> bool {
        let in_hot = self.hot.remove(key).is_some();
        let in_warm = self.warm.remove(key).await;
        in_hot || in_warm
    }

    /// Snapshot of counters, tier sizes and breaker state
    pub fn metrics(&self) -> CacheMetrics {
        let warm = self.warm.stats();
        let circuit = self.breaker.snapshot();
        let health = CacheHealth::from_circuit(circuit.state);

        CacheMetrics {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            hot_hits: self.counters.hot_hits.load(Ordering::Relaxed),
            warm_hits: self.counters.warm_hits.load(Ordering::Relaxed),
            hot_misses: self.counters.hot_misses.load(Ordering::Relaxed),
            warm_misses: self.counters.warm_misses.load(Ordering::Relaxed),
            hot_evictions: self.counters.hot_evictions.load(Ordering::Relaxed),
            warm_evictions: warm.evictions,
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            promotions: self.counters.promotions.load(Ordering::Relaxed),
            warm_io_errors: warm.io_errors,
            warm_corruptions: warm.corruptions,
            warm_bypassed: warm.bypassed,
            internal_errors: self.counters.internal_errors.load(Ordering::Relaxed),
            hot_entries: self.hot.len(),
            hot_size_bytes: self.hot.current_size_bytes(),
            warm_entries: warm.entries,
            warm_size_bytes: warm.size_bytes,
            target_hit_rate: self.config.target_hit_rate,
            circuit,
            health,
        }
    }

    /// Metrics plus a timestamp, for external pollers
    pub fn health_check(&self) -> HealthReport {
        let metrics = self.metrics();
        HealthReport {
            status: metrics.health,
            timestamp: Utc::now(),
            metrics,
        }
    }

    /// Drop expired entries from both tiers, then settle leftover files on disk
    pub async fn sweep(&self) -> SweepReport {
        let hot_expired = self.hot.remove_expired();
        let warm_expired = self.warm.sweep_expired().await;

        let distinct: HashSet<&str> = hot_expired
            .iter()
            .chain(warm_expired.iter())
            .map(String::as_str)
            .collect();
        self.counters
            .expirations
            .fetch_add(distinct.len() as u64, Ordering::Relaxed);

        let report = SweepReport {
            hot_expired: hot_expired.len(),
            warm_expired: warm_expired.len(),
            temp_files_removed: self.warm.sweep_temp_files().await,
            superseded_removed: self.warm.purge_superseded().await,
        };
        debug!(?report, "Cache sweep complete");
        report
    }

    /// Start the periodic sweep if `maintenance_interval` is configured.
    ///
    /// The task holds a weak reference and exits once the engine is dropped.
    pub fn spawn_maintenance(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let interval = self.config.maintenance_interval?;
        let engine = Arc::downgrade(self);

        info!("Starting cache maintenance task (interval: {:?})", interval);

        Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;

                let Some(engine) = engine.upgrade() else {
                    debug!("Cache dropped, stopping maintenance task");
                    break;
                };
                let report = engine.sweep().await;
                if report != SweepReport::default() {
                    info!(
                        hot_expired = report.hot_expired,
                        warm_expired = report.warm_expired,
                        temp_files_removed = report.temp_files_removed,
                        superseded_removed = report.superseded_removed,
                        "Maintenance sweep removed entries"
                    );
                }
            }
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Breaker guarding the warm tier; exposed for operator overrides
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn insert_hot(&self, entry: CacheEntry<V>) -> bool {
        match self.hot.put(entry) {
            HotInsert::Stored { evicted } => {
                self.counters
                    .hot_evictions
                    .fetch_add(evicted.len() as u64, Ordering::Relaxed);
                true
            }
            HotInsert::Rejected => false,
        }
    }

    /// Best effort; a rejected promotion leaves the warm copy serving reads
    fn promote_entry(&self, entry: CacheEntry<V>) -> bool {
        let key = entry.key.clone();
        let promoted = self.insert_hot(entry);
        if promoted {
            EngineCounters::bump(&self.counters.promotions);
            debug!(key = %key, "Promoted warm entry to hot tier");
        } else {
            debug!(key = %key, "Promotion skipped, entry too large for hot tier");
        }
        promoted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::storage::MemoryStorage;
    use crate::resilience::CircuitState;

    fn config() -> EngineConfig {
        EngineConfig::builder()
            .warm_dir("/cache")
            .hot_size_bytes(1024)
            .warm_size_bytes(64 * 1024)
            .build()
    }

    async fn engine(config: EngineConfig) -> ResilientCacheEngine<String> {
        ResilientCacheEngine::with_storage(config, Arc::new(MemoryStorage::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_store_reports_both_tiers() {
        let cache = engine(config()).await;
        let tier = cache.store("k", "v".to_string(), Duration::from_secs(60)).await;
        assert_eq!(tier, StoredTier::Both);
        assert_eq!(cache.get("k").await, Some("v".to_string()));

        let metrics = cache.metrics();
        assert_eq!(metrics.hot_hits, 1);
        assert_eq!(metrics.warm_entries, 1);
        // key (1) + "\"v\"" (3)
        assert_eq!(metrics.hot_size_bytes, 4);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut bad = config();
        bad.failure_threshold = 0;
        let result = ResilientCacheEngine::<String>::with_storage(bad, Arc::new(MemoryStorage::new())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_entry_too_large_for_hot_lands_in_warm() {
        let cache = engine(config()).await;
        let tier = cache.store("big", "x".repeat(2000), Duration::from_secs(60)).await;
        assert_eq!(tier, StoredTier::Warm);
        assert_eq!(cache.get("big").await.map(|v| v.len()), Some(2000));
        assert_eq!(cache.metrics().warm_hits, 1);
    }

    #[tokio::test]
    async fn test_promotion_after_threshold() {
        let cache = engine(config()).await;
        cache.store("p", "v".to_string(), Duration::from_secs(60)).await;
        cache.hot.remove("p");

        for _ in 0..3 {
            assert!(cache.get("p").await.is_some());
        }
        assert!(!cache.hot.contains_key("p"));

        // Fourth warm hit passes the default threshold of 3.
        assert!(cache.get("p").await.is_some());
        assert!(cache.hot.contains_key("p"));

        let metrics = cache.metrics();
        assert_eq!(metrics.promotions, 1);
        assert_eq!(metrics.warm_hits, 4);

        assert!(cache.get("p").await.is_some());
        assert_eq!(cache.metrics().hot_hits, 1);
    }

    #[tokio::test]
    async fn test_explicit_promote() {
        let cache = engine(config()).await;
        cache.store("k", "v".to_string(), Duration::from_secs(60)).await;
        cache.hot.remove("k");

        assert!(cache.promote("k").await);
        assert!(cache.hot.contains_key("k"));
        assert!(!cache.promote("missing").await);
        assert_eq!(cache.metrics().hits, 0);
    }

    #[tokio::test]
    async fn test_degraded_when_breaker_forced_open() {
        let cache = engine(config()).await;
        cache.circuit_breaker().force_open();

        let tier = cache.store("k", "v".to_string(), Duration::from_secs(60)).await;
        assert_eq!(tier, StoredTier::Hot);
        assert_eq!(cache.get("k").await, Some("v".to_string()));

        let report = cache.health_check();
        assert_eq!(report.status, CacheHealth::Degraded);
        assert_eq!(report.metrics.circuit.state, CircuitState::Open);
        assert_eq!(report.metrics.warm_bypassed, 1);

        cache.circuit_breaker().reset();
        assert_eq!(cache.health_check().status, CacheHealth::Healthy);
    }

    #[tokio::test]
    async fn test_remove_from_both_tiers() {
        let cache = engine(config()).await;
        cache.store("k", "v".to_string(), Duration::from_secs(60)).await;

        assert!(cache.remove("k").await);
        assert_eq!(cache.get("k").await, None);
        assert!(!cache.remove("k").await);

        let metrics = cache.metrics();
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.hot_misses, 1);
        assert_eq!(metrics.warm_misses, 1);
    }

    #[tokio::test]
    async fn test_misses_split_by_tier() {
        let cache = engine(config()).await;
        cache.store("big", "x".repeat(2000), Duration::from_secs(60)).await;
        cache.store("small", "v".to_string(), Duration::from_secs(60)).await;

        assert!(cache.get("small").await.is_some());
        assert!(cache.get("big").await.is_some());
        assert!(cache.get("absent").await.is_none());

        let metrics = cache.metrics();
        assert_eq!((metrics.hot_hits, metrics.hot_misses), (1, 2));
        assert_eq!((metrics.warm_hits, metrics.warm_misses), (1, 1));
        assert_eq!(metrics.hits + metrics.misses, metrics.hot_hits + metrics.hot_misses);
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_entries() {
        let cache = engine(config()).await;
        cache.store("short", "v".to_string(), Duration::from_millis(20)).await;
        cache.store("long", "v".to_string(), Duration::from_secs(60)).await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        let report = cache.sweep().await;
        assert_eq!(report.hot_expired, 1);
        assert_eq!(report.warm_expired, 1);

        // "short" expired in both tiers but is one entry.
        let metrics = cache.metrics();
        assert_eq!(metrics.expirations, 1);
        assert_eq!(metrics.hot_entries, 1);
        assert_eq!(metrics.warm_entries, 1);
    }

    #[tokio::test]
    async fn test_maintenance_disabled_by_default() {
        let cache = Arc::new(engine(config()).await);
        assert!(cache.spawn_maintenance().is_none());
    }

    #[tokio::test]
    async fn test_maintenance_task_stops_with_engine() {
        let mut cfg = config();
        cfg.maintenance_interval = Some(Duration::from_millis(10));
        let cache = Arc::new(engine(cfg).await);

        let handle = cache.spawn_maintenance().unwrap();
        cache.store("short", "v".to_string(), Duration::from_millis(5)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.metrics().hot_entries, 0);

        drop(cache);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
