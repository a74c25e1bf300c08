//! # Two-Tier Cache
//!
//! A bounded in-memory tier in front of a disk-backed tier. The disk tier is
//! guarded by a [`crate::resilience::CircuitBreaker`], so a failing device
//! degrades the cache to memory-only operation instead of surfacing errors.
//!
//! ## Features
//!
//! - **LRU Hot Tier**: byte-budgeted, recency-ordered memory store
//! - **Warm Tier**: one compressed file per key plus a crash-safe JSON index
//! - **Self-Healing**: corrupt or missing entry files are deleted and treated as misses
//! - **Index Rebuild**: a lost or damaged index is re-derived from the entry files
//! - **Promotion**: frequently read warm entries are copied into memory
//! - **TTL Expiration**: checked lazily on read, with an optional background sweep
//!
//! ## Example
//!
//! ```rust
//! use ouroboros_cache::cache::{EngineConfig, ResilientCacheEngine, StoredTier};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let config = EngineConfig::builder()
//!     .warm_dir(dir.path())
//!     .hot_size_bytes(10 * 1024 * 1024) // 10 MB
//!     .warm_size_bytes(100 * 1024 * 1024) // 100 MB
//!     .build();
//!
//! let cache: ResilientCacheEngine<String> = ResilientCacheEngine::new(config).await?;
//!
//! let tier = cache
//!     .store("query:123", "cached response".to_string(), Duration::from_secs(3600))
//!     .await;
//! assert_eq!(tier, StoredTier::Both);
//!
//! if let Some(value) = cache.get("query:123").await {
//!     println!("Cache hit: {}", value);
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod engine;
pub mod entry;
pub mod hot;
pub mod index;
pub mod storage;
pub mod types;
pub mod warm;

pub use codec::{CodecError, CompressionKind, Compressor, EntryCodec, GzipCompression, NoCompression};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use engine::{ResilientCacheEngine, SweepReport};
pub use entry::{CacheEntry, CacheMetadata};
pub use hot::{HotInsert, HotLookup, HotTier};
pub use index::{IndexRecord, PersistentIndex};
pub use storage::{MemoryStorage, StorageBackend, TokioStorage};
pub use types::{CacheHealth, CacheKey, CacheMetrics, CacheValue, HealthReport, StoredTier};
pub use warm::{WarmLookup, WarmStats, WarmTier};
