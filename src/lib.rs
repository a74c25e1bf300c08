//! # Ouroboros Cache (ouroboros-cache)
//!
//! A resilient two-tier cache: a bounded in-memory LRU tier in front of a
//! disk-backed tier whose every operation is guarded by a circuit breaker.
//!
//! ## Features
//!
//! - Hot tier (memory) and warm tier (disk) with promotion of frequently read entries
//! - Async-first design using tokio
//! - Circuit breaker that separates I/O failures from data corruption
//! - Crash-safe persistence (temp file then atomic rename)
//! - Index rebuild from entry files when the index is lost
//! - Degraded, memory-only operation while the disk is failing
//!
//! Cache failures are never caller failures: `get` returns `Option`, `store`
//! reports which tiers captured the value, and everything else is visible
//! through [`ResilientCacheEngine::metrics`].
//!
//! ## Basic Usage
//!
//! ```rust
//! use ouroboros_cache::{EngineConfig, ResilientCacheEngine};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let dir = tempfile::tempdir()?;
//!     let config = EngineConfig::small(dir.path());
//!
//!     let cache: ResilientCacheEngine<String> = ResilientCacheEngine::new(config).await?;
//!
//!     let stored = cache
//!         .store("llm:response:42", "cached answer".to_string(), Duration::from_secs(600))
//!         .await;
//!     println!("Stored in: {}", stored);
//!
//!     assert_eq!(cache.get("llm:response:42").await.as_deref(), Some("cached answer"));
//!     Ok(())
//! }
//! ```
//!
//! ## Health Check
//!
//! [`ResilientCacheEngine::health_check`] is the single polling entry point for
//! external surfaces. The status is `Degraded` exactly while the warm tier's
//! breaker is open.
//!
//! ```rust
//! use ouroboros_cache::{CacheHealth, EngineConfig, ResilientCacheEngine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let dir = tempfile::tempdir()?;
//!     let cache: ResilientCacheEngine<Vec<u8>> =
//!         ResilientCacheEngine::new(EngineConfig::small(dir.path())).await?;
//!
//!     let report = cache.health_check();
//!     assert_eq!(report.status, CacheHealth::Healthy);
//!     println!("{}", report.metrics);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration From the Environment
//!
//! ```no_run
//! use ouroboros_cache::{EngineConfig, ResilientCacheEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // OUROBOROS_CACHE_WARM_DIR, OUROBOROS_CACHE_HOT_SIZE_BYTES, ...
//!     let config = EngineConfig::from_env()?;
//!
//!     let cache = Arc::new(ResilientCacheEngine::<String>::new(config).await?);
//!     let _maintenance = cache.spawn_maintenance();
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod resilience;

// Re-export main types for convenience
pub use cache::{
    CacheEntry, CacheHealth, CacheKey, CacheMetadata, CacheMetrics, CacheValue, CompressionKind,
    EngineConfig, EngineConfigBuilder, HealthReport, ResilientCacheEngine, StorageBackend,
    StoredTier, SweepReport, TokioStorage,
};
pub use error::{CacheError, Result};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState};
