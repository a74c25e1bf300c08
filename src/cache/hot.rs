//! In-memory hot tier with LRU eviction
//!
//! Bounded by a byte budget. All operations are synchronous and never touch
//! storage, so this tier has no failure modes beyond capacity rejection.

use crate::cache::entry::CacheEntry;
use crate::cache::types::CacheKey;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Result of a hot-tier lookup
#[derive(Debug, Clone)]
pub enum HotLookup<V> {
    /// Entry found; access metadata already updated
    Hit(CacheEntry<V>),
    /// Entry found but past its TTL; it has been removed
    Expired,
    Miss,
}

/// Result of a hot-tier insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotInsert {
    /// Stored after evicting these keys (least recently used first)
    Stored { evicted: Vec<CacheKey> },
    /// Entry is larger than the whole budget; nothing was evicted
    Rejected,
}

impl HotInsert {
    pub fn is_stored(&self) -> bool {
        matches!(self, HotInsert::Stored { .. })
    }
}

struct HotState<V> {
    /// Main storage: key -> entry
    entries: HashMap<CacheKey, CacheEntry<V>>,

    /// LRU tracking: front is least recently used
    lru_queue: VecDeque<CacheKey>,

    current_size_bytes: usize,
}

impl<V> HotState<V> {
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.lru_queue.retain(|k| k != key);
        self.current_size_bytes = self.current_size_bytes.saturating_sub(entry.size_bytes());
        Some(entry)
    }

    fn touch(&mut self, key: &str) {
        self.lru_queue.retain(|k| k != key);
        self.lru_queue.push_back(key.to_string());
    }
}

/// Bounded, recency-ordered in-memory store
pub struct HotTier<V> {
    max_size_bytes: usize,
    inner: Mutex<HotState<V>>,
}

impl<V: Clone> HotTier<V> {
    /// Create a hot tier holding at most `max_size_bytes` of entries
    pub fn new(max_size_bytes: usize) -> Self {
        Self {
            max_size_bytes,
            inner: Mutex::new(HotState {
                entries: HashMap::new(),
                lru_queue: VecDeque::new(),
                current_size_bytes: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HotState<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a key, refreshing its recency and access count on a hit
    pub fn get(&self, key: &str) -> HotLookup<V> {
        let mut st = self.lock();

        let expired = match st.entries.get(key) {
            None => return HotLookup::Miss,
            Some(entry) => entry.is_expired(),
        };

        if expired {
            debug!(key = %key, "Hot entry expired");
            st.remove_entry(key);
            return HotLookup::Expired;
        }

        st.touch(key);
        match st.entries.get_mut(key) {
            Some(entry) => {
                entry.mark_accessed();
                HotLookup::Hit(entry.clone())
            }
            None => HotLookup::Miss,
        }
    }

    /// Insert an entry, evicting least recently used entries until it fits.
    ///
    /// An entry larger than the whole budget is rejected without evicting
    /// anything; any older value under the same key is dropped so readers
    /// never see it after the rejected write.
    pub fn put(&self, entry: CacheEntry<V>) -> HotInsert {
        let mut st = self.lock();
        let key = entry.key.clone();
        let size = entry.size_bytes();

        st.remove_entry(&key);

        if size > self.max_size_bytes {
            debug!(key = %key, size, budget = self.max_size_bytes, "Entry too large for hot tier");
            return HotInsert::Rejected;
        }

        let mut evicted = Vec::new();
        while st.current_size_bytes + size > self.max_size_bytes {
            let Some(victim) = st.lru_queue.front().cloned() else {
                break;
            };
            debug!(key = %victim, "Evicting hot entry (LRU)");
            st.remove_entry(&victim);
            evicted.push(victim);
        }

        st.current_size_bytes += size;
        st.lru_queue.push_back(key.clone());
        st.entries.insert(key, entry);

        HotInsert::Stored { evicted }
    }

    /// Remove a key, returning its entry if present
    pub fn remove(&self, key: &str) -> Option<CacheEntry<V>> {
        self.lock().remove_entry(key)
    }

    /// Check presence without touching recency
    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Drop every expired entry, returning their keys
    pub fn remove_expired(&self) -> Vec<CacheKey> {
        let mut st = self.lock();
        let expired: Vec<CacheKey> = st
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired())
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            st.remove_entry(key);
        }
        expired
    }

    /// Bytes currently accounted to resident entries
    pub fn current_size_bytes(&self) -> usize {
        self.lock().current_size_bytes
    }

    pub fn max_size_bytes(&self) -> usize {
        self.max_size_bytes
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(key: &str, size: usize) -> CacheEntry<String> {
        CacheEntry::new(key.to_string(), format!("value-{}", key), Duration::from_secs(60)).with_size(size)
    }

    #[test]
    fn test_put_and_get() {
        let tier = HotTier::new(1000);
        assert!(tier.put(entry("a", 100)).is_stored());

        match tier.get("a") {
            HotLookup::Hit(e) => {
                assert_eq!(e.payload, "value-a");
                assert_eq!(e.metadata.access_count, 1);
            }
            other => panic!("expected hit, got {:?}", other),
        }
        assert_eq!(tier.current_size_bytes(), 100);
        assert!(matches!(tier.get("missing"), HotLookup::Miss));
    }

    #[test]
    fn test_lru_eviction_respects_recent_access() {
        let tier = HotTier::new(250);
        tier.put(entry("first", 100));
        tier.put(entry("second", 100));

        // Touch the older entry so "second" becomes least recently used.
        assert!(matches!(tier.get("first"), HotLookup::Hit(_)));

        let result = tier.put(entry("third", 100));
        assert_eq!(
            result,
            HotInsert::Stored {
                evicted: vec!["second".to_string()]
            }
        );
        assert!(tier.contains_key("first"));
        assert!(tier.contains_key("third"));
        assert!(!tier.contains_key("second"));
        assert_eq!(tier.current_size_bytes(), 200);
    }

    #[test]
    fn test_oversized_entry_rejected_without_eviction() {
        let tier = HotTier::new(150);
        tier.put(entry("small", 100));

        assert_eq!(tier.put(entry("huge", 151)), HotInsert::Rejected);
        assert!(tier.contains_key("small"));
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_rejected_overwrite_drops_stale_value() {
        let tier = HotTier::new(150);
        tier.put(entry("k", 100));
        assert_eq!(tier.put(entry("k", 500)), HotInsert::Rejected);
        assert!(matches!(tier.get("k"), HotLookup::Miss));
        assert_eq!(tier.current_size_bytes(), 0);
    }

    #[test]
    fn test_replace_updates_size_accounting() {
        let tier = HotTier::new(1000);
        tier.put(entry("k", 100));
        tier.put(entry("k", 300));
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.current_size_bytes(), 300);
    }

    #[test]
    fn test_expired_entry_is_removed_on_read() {
        let tier = HotTier::new(1000);
        let short = CacheEntry::new("short".to_string(), "v".to_string(), Duration::from_millis(20)).with_size(10);
        tier.put(short);

        std::thread::sleep(Duration::from_millis(40));
        assert!(matches!(tier.get("short"), HotLookup::Expired));
        assert!(tier.is_empty());
        assert_eq!(tier.current_size_bytes(), 0);
    }

    #[test]
    fn test_remove_expired_sweep() {
        let tier = HotTier::new(1000);
        tier.put(CacheEntry::new("old".to_string(), "v".to_string(), Duration::from_millis(10)).with_size(10));
        tier.put(entry("fresh", 10));

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(tier.remove_expired(), vec!["old".to_string()]);
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_remove() {
        let tier = HotTier::new(1000);
        tier.put(entry("a", 10));
        assert!(tier.remove("a").is_some());
        assert!(tier.remove("a").is_none());
        assert_eq!(tier.current_size_bytes(), 0);
    }
}
