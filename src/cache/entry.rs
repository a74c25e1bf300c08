//! Cache entry management with TTL support

use crate::cache::types::CacheKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A cache entry with TTL and access metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    /// The cache key
    pub key: CacheKey,

    /// The cached payload
    pub payload: V,

    /// Entry metadata
    pub metadata: CacheMetadata,
}

impl<V> CacheEntry<V> {
    /// Create a new cache entry expiring `ttl` from now
    pub fn new(key: CacheKey, payload: V, ttl: Duration) -> Self {
        let now = Utc::now();
        let expires_at = expiry_after(now, ttl);

        Self {
            key,
            payload,
            metadata: CacheMetadata {
                created_at: now,
                last_accessed_at: now,
                expires_at,
                access_count: 0,
                size_bytes: 0, // Will be calculated on insert
            },
        }
    }

    /// Create a new cache entry with custom expiration time
    pub fn with_expiration(key: CacheKey, payload: V, expires_at: DateTime<Utc>) -> Self {
        let now = Utc::now();

        Self {
            key,
            payload,
            metadata: CacheMetadata {
                created_at: now,
                last_accessed_at: now,
                expires_at,
                access_count: 0,
                size_bytes: 0,
            },
        }
    }

    /// Set the approximate serialized size used for capacity accounting
    pub fn with_size(mut self, size_bytes: usize) -> Self {
        self.metadata.size_bytes = size_bytes;
        self
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        self.metadata.is_expired()
    }

    /// The time-to-live the entry was created with
    pub fn ttl(&self) -> Duration {
        (self.metadata.expires_at - self.metadata.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Get time until expiration
    pub fn time_until_expiration(&self) -> Option<Duration> {
        let now = Utc::now();
        if now > self.metadata.expires_at {
            None
        } else {
            (self.metadata.expires_at - now).to_std().ok()
        }
    }

    /// Mark the entry as accessed (updates access time and count)
    pub fn mark_accessed(&mut self) {
        self.metadata.last_accessed_at = Utc::now();
        self.metadata.access_count += 1;
    }

    /// Get the age of the entry
    pub fn age(&self) -> Duration {
        (Utc::now() - self.metadata.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Size used for capacity accounting
    pub fn size_bytes(&self) -> usize {
        self.metadata.size_bytes
    }
}

/// Metadata associated with a cache entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// When the entry was created
    pub created_at: DateTime<Utc>,

    /// Last access time, updated on every hit
    pub last_accessed_at: DateTime<Utc>,

    /// When the entry expires
    pub expires_at: DateTime<Utc>,

    /// Number of times this entry has been read
    pub access_count: u64,

    /// Approximate serialized size in bytes
    pub size_bytes: usize,
}

impl CacheMetadata {
    /// Check if the TTL has elapsed
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Check if metadata indicates a hot entry (frequently accessed)
    pub fn is_hot(&self, threshold: u64) -> bool {
        self.access_count > threshold
    }
}

/// `from + ttl`, saturating at the latest representable time
pub(crate) fn expiry_after(from: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|d| from.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
