//! Core type definitions for the cache system

use crate::resilience::{CircuitBreakerSnapshot, CircuitState};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cache key type - opaque string, unique within a cache instance
pub type CacheKey = String;

/// Bound for payloads the engine can hold in memory and persist to disk
pub trait CacheValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Which tiers captured a `store`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoredTier {
    /// Computed but not cached anywhere
    None,
    /// Memory only (warm tier bypassed, rejected or failed)
    Hot,
    /// Disk only (entry too large for the hot tier)
    Warm,
    /// Cached in memory and persisted
    Both,
}

impl StoredTier {
    pub(crate) fn from_flags(hot: bool, warm: bool) -> Self {
        match (hot, warm) {
            (true, true) => StoredTier::Both,
            (true, false) => StoredTier::Hot,
            (false, true) => StoredTier::Warm,
            (false, false) => StoredTier::None,
        }
    }

    /// True if any tier holds the entry
    pub fn is_cached(&self) -> bool {
        !matches!(self, StoredTier::None)
    }

    /// True if the entry reached the persistent tier
    pub fn is_persisted(&self) -> bool {
        matches!(self, StoredTier::Warm | StoredTier::Both)
    }
}

impl fmt::Display for StoredTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoredTier::None => write!(f, "none"),
            StoredTier::Hot => write!(f, "hot"),
            StoredTier::Warm => write!(f, "warm"),
            StoredTier::Both => write!(f, "hot+warm"),
        }
    }
}

/// Engine health as seen by external pollers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheHealth {
    /// Both tiers usable
    Healthy,
    /// Warm tier bypassed, serving from memory only
    Degraded,
}

impl CacheHealth {
    /// Degraded exactly when the breaker is open
    pub fn from_circuit(state: CircuitState) -> Self {
        if state == CircuitState::Open {
            CacheHealth::Degraded
        } else {
            CacheHealth::Healthy
        }
    }
}

/// Statistics and metrics for cache monitoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetrics {
    /// Total number of cache hits (both tiers)
    pub hits: u64,

    /// Total number of cache misses
    pub misses: u64,

    /// Hits served from memory
    pub hot_hits: u64,

    /// Hits served from disk
    pub warm_hits: u64,

    /// Lookups the hot tier could not answer (each then went to disk)
    pub hot_misses: u64,

    /// Disk lookups that found nothing usable; equals `misses`
    pub warm_misses: u64,

    /// LRU evictions from the hot tier
    pub hot_evictions: u64,

    /// Capacity evictions from the warm tier
    pub warm_evictions: u64,

    /// Entries dropped because their TTL elapsed, counted once per entry
    pub expirations: u64,

    /// Warm entries copied into the hot tier
    pub promotions: u64,

    /// Warm-tier I/O failures (counted against the breaker)
    pub warm_io_errors: u64,

    /// Warm entries discarded as unparseable
    pub warm_corruptions: u64,

    /// Warm operations skipped because the circuit was open
    pub warm_bypassed: u64,

    /// Unexpected errors converted to misses at the engine boundary
    pub internal_errors: u64,

    /// Entries and bytes currently held in memory
    pub hot_entries: usize,
    pub hot_size_bytes: usize,

    /// Entries and bytes currently indexed on disk
    pub warm_entries: usize,
    pub warm_size_bytes: usize,

    /// Configured hit-rate goal (informational, 0.0 - 1.0)
    pub target_hit_rate: f64,

    /// Breaker guarding the warm tier
    pub circuit: CircuitBreakerSnapshot,

    /// Degraded iff the breaker is open
    pub health: CacheHealth,
}

impl CacheMetrics {
    /// Calculate cache hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate miss rate (0.0 - 1.0)
    pub fn miss_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            1.0 - self.hit_rate()
        }
    }

    /// Total evictions across both tiers
    pub fn total_evictions(&self) -> u64 {
        self.hot_evictions + self.warm_evictions
    }

    /// True once the observed hit rate reaches the configured goal
    pub fn meets_target_hit_rate(&self) -> bool {
        self.hit_rate() >= self.target_hit_rate
    }
}

impl fmt::Display for CacheMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheMetrics {{ hits: {} (hot: {}, warm: {}), misses: {}, hit_rate: {:.2}%, evictions: {}, corruptions: {}, circuit: {}, health: {:?} }}",
            self.hits,
            self.hot_hits,
            self.warm_hits,
            self.misses,
            self.hit_rate() * 100.0,
            self.total_evictions(),
            self.warm_corruptions,
            self.circuit.state,
            self.health
        )
    }
}

/// Health report for external polling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall health status
    pub status: CacheHealth,
    /// Timestamp of the health check
    pub timestamp: DateTime<Utc>,
    /// Metrics at the time of the check
    pub metrics: CacheMetrics,
}
