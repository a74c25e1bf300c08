//! Disk-backed warm tier guarded by a circuit breaker
//!
//! Every operation that touches storage goes through the tier's
//! [`CircuitBreaker`]. Two kinds of fault are kept apart:
//!
//! - **I/O failures** (permission denied, device errors, disk full) are
//!   counted by the breaker. Enough of them in a row open the circuit and
//!   the tier is bypassed until the recovery timeout elapses.
//! - **Corruption** (an entry file that cannot be decoded, or that vanished
//!   from a directory that still exists) is permanent data loss. The file
//!   and the record are deleted and the breaker is left untouched. A missing
//!   directory is an I/O failure.
//!
//! When an overwrite or removal cannot reach disk, the old record is dropped
//! at once and its file is deleted by the next operation that gets through
//! the breaker, so a superseded value is never served again.
//!
//! Neither kind ever leaves this module as an error: lookups degrade to
//! misses and writes report `false`.

use crate::cache::codec::{CodecError, EntryCodec};
use crate::cache::entry::CacheEntry;
use crate::cache::index::{location_for, IndexRecord, PersistentIndex};
use crate::cache::storage::{atomic_write, is_temp_file, StorageBackend};
use crate::cache::types::{CacheKey, CacheValue};
use crate::error::{CacheError, Result};
use crate::resilience::{CircuitBreaker, CircuitBreakerError};
use chrono::Utc;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Result of a warm-tier lookup
#[derive(Debug, Clone)]
pub enum WarmLookup<V> {
    /// Entry decoded; `metadata.access_count` reflects this hit
    Hit(CacheEntry<V>),
    /// Key not indexed
    Miss,
    /// Entry was past its TTL and has been deleted
    Expired,
    /// Entry could not be decoded and has been deleted
    Corrupt,
    /// Circuit open; storage was not touched
    Bypassed,
    /// Storage failed; counted against the breaker
    Failed,
}

impl<V> WarmLookup<V> {
    pub fn is_hit(&self) -> bool {
        matches!(self, WarmLookup::Hit(_))
    }
}

/// Counters describing warm-tier activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmStats {
    pub entries: usize,
    pub size_bytes: usize,
    pub io_errors: u64,
    pub corruptions: u64,
    pub bypassed: u64,
    pub evictions: u64,
    pub expirations: u64,
}

#[derive(Debug, Default)]
struct WarmCounters {
    entries: AtomicUsize,
    size_bytes: AtomicUsize,
    io_errors: AtomicU64,
    corruptions: AtomicU64,
    bypassed: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// Persistent tier: one entry file per key plus a [`PersistentIndex`]
#[derive(Debug)]
pub struct WarmTier<V> {
    dir: PathBuf,
    max_size_bytes: usize,
    breaker: Arc<CircuitBreaker>,
    storage: Arc<dyn StorageBackend>,
    codec: EntryCodec,
    /// Serializes every read-modify-write of the index
    index: Mutex<PersistentIndex>,
    counters: WarmCounters,
    _payload: PhantomData<fn() -> V>,
}

impl<V: CacheValue> WarmTier<V> {
    /// Open the tier rooted at `dir`.
    ///
    /// Never fails: an unusable directory or index is logged and the tier
    /// starts empty, leaving the breaker to decide whether disk is usable.
    pub async fn open(
        dir: impl Into<PathBuf>,
        max_size_bytes: usize,
        breaker: Arc<CircuitBreaker>,
        storage: Arc<dyn StorageBackend>,
        codec: EntryCodec,
    ) -> Self {
        let dir = dir.into();

        let created = breaker
            .execute(|| async {
                storage
                    .create_dir_all(&dir)
                    .await
                    .map_err(|e| CacheError::io("create warm directory", &dir, e))
            })
            .await
            .map_err(CacheError::from);

        let index = match created {
            Ok(()) => match PersistentIndex::load(&dir, storage.clone(), codec.clone()).await {
                Ok(index) => index,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Failed to load warm index, starting empty");
                    PersistentIndex::new(&dir, storage.clone(), codec.clone())
                }
            },
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Warm directory unavailable, starting empty");
                PersistentIndex::new(&dir, storage.clone(), codec.clone())
            }
        };

        let tier = Self {
            dir,
            max_size_bytes,
            breaker,
            storage,
            codec,
            index: Mutex::new(index),
            counters: WarmCounters::default(),
            _payload: PhantomData,
        };

        {
            let index = tier.index.lock().await;
            tier.publish_sizes(&index);
        }

        let swept = tier.sweep_temp_files().await;
        info!(
            dir = %tier.dir.display(),
            entries = tier.counters.entries.load(Ordering::Relaxed),
            stray_temp_files = swept,
            compression = tier.codec.compressor_name(),
            "Warm tier opened"
        );

        tier
    }

    /// Look up `key` on disk.
    ///
    /// Storage faults are absorbed into [`WarmLookup`] variants; an `Err` is
    /// returned only for failures outside the storage taxonomy.
    pub async fn get(&self, key: &str) -> Result<WarmLookup<V>> {
        let mut index = self.index.lock().await;

        let path = match index.get(key) {
            Some(record) => index.entry_path(record),
            None => return Ok(WarmLookup::Miss),
        };

        if self.breaker.is_open() {
            self.counters.bypassed.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Warm tier bypassed, circuit open");
            return Ok(WarmLookup::Bypassed);
        }

        let path_ref = path.as_path();
        let result = self
            .breaker
            .execute_filtered(move || self.read_entry(path_ref), CacheError::is_transient)
            .await;

        let mut entry = match result {
            Ok(entry) => entry,
            Err(CircuitBreakerError::CircuitOpen { .. }) => {
                self.counters.bypassed.fetch_add(1, Ordering::Relaxed);
                return Ok(WarmLookup::Bypassed);
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                return self.classify_read_failure(&mut index, key, e).await;
            }
        };

        if entry.key != key {
            warn!(key = %key, found = %entry.key, path = %path.display(), "Entry file holds a different key");
            self.counters.corruptions.fetch_add(1, Ordering::Relaxed);
            self.discard(&mut index, key).await;
            return Ok(WarmLookup::Corrupt);
        }

        if entry.is_expired() {
            debug!(key = %key, "Warm entry expired");
            self.counters.expirations.fetch_add(1, Ordering::Relaxed);
            self.discard(&mut index, key).await;
            return Ok(WarmLookup::Expired);
        }

        // Access metadata lives in the index; it reaches disk with the next save.
        if let Some(record) = index.get_mut(key) {
            let now = Utc::now();
            record.access_count += 1;
            record.last_accessed_at = Some(now);
            entry.metadata.access_count = record.access_count;
            entry.metadata.last_accessed_at = now;
        }

        Ok(WarmLookup::Hit(entry))
    }

    /// Persist `entry`, returning whether it reached disk.
    ///
    /// Skipped without I/O when the circuit is open or the entry exceeds the
    /// whole budget. Older entries are evicted, oldest write first, to make
    /// room. Any storage failure counts against the breaker.
    pub async fn store(&self, entry: &CacheEntry<V>) -> bool {
        let mut index = self.index.lock().await;
        let key = entry.key.as_str();

        if self.breaker.is_open() {
            self.counters.bypassed.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Warm store skipped, circuit open");
            self.forget(&mut index, key);
            return false;
        }

        if entry.size_bytes() > self.max_size_bytes {
            debug!(
                key = %key,
                size = entry.size_bytes(),
                budget = self.max_size_bytes,
                "Entry too large for warm tier"
            );
            self.forget(&mut index, key);
            return false;
        }

        let bytes = match self.codec.encode(entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(key = %key, error = %e, "Failed to encode entry");
                self.forget(&mut index, key);
                return false;
            }
        };

        let index_ref: &mut PersistentIndex = &mut index;
        let bytes_ref = bytes.as_slice();
        let result = self
            .breaker
            .execute(move || self.write_entry(index_ref, entry, bytes_ref))
            .await;

        let stored = match result {
            Ok(evicted) => {
                if !evicted.is_empty() {
                    self.counters.evictions.fetch_add(evicted.len() as u64, Ordering::Relaxed);
                    debug!(key = %key, evicted = evicted.len(), "Evicted warm entries to make room");
                }
                true
            }
            Err(CircuitBreakerError::CircuitOpen { .. }) => {
                self.counters.bypassed.fetch_add(1, Ordering::Relaxed);
                self.forget(&mut index, key);
                false
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                self.counters.io_errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Warm store failed");
                self.forget(&mut index, key);
                false
            }
        };

        self.publish_sizes(&index);
        stored
    }

    /// Delete `key` from disk, returning whether it was indexed
    pub async fn remove(&self, key: &str) -> bool {
        let mut index = self.index.lock().await;
        let Some(record) = index.get(key).cloned() else {
            return false;
        };

        if self.breaker.is_open() {
            // The file is deleted once the circuit lets storage calls through.
            self.forget(&mut index, key);
            return true;
        }

        let index_ref: &mut PersistentIndex = &mut index;
        let record_ref = &record;
        let result = self
            .breaker
            .execute(move || self.delete_record(index_ref, record_ref))
            .await;

        if let Err(CircuitBreakerError::OperationFailed(e)) = &result {
            self.counters.io_errors.fetch_add(1, Ordering::Relaxed);
            warn!(key = %key, error = %e, "Failed to delete warm entry");
        }
        index.remove(key);
        self.publish_sizes(&index);
        true
    }

    /// Delete every entry whose TTL has elapsed, returning the removed keys
    pub async fn sweep_expired(&self) -> Vec<CacheKey> {
        let mut index = self.index.lock().await;
        if self.breaker.is_open() {
            return Vec::new();
        }

        let expired: Vec<IndexRecord> = index.records().filter(|r| r.is_expired()).cloned().collect();
        if expired.is_empty() {
            return Vec::new();
        }

        let index_ref: &mut PersistentIndex = &mut index;
        let expired_ref = expired.as_slice();
        let result = self
            .breaker
            .execute(move || self.delete_records(index_ref, expired_ref))
            .await;

        if let Err(CircuitBreakerError::OperationFailed(e)) = &result {
            self.counters.io_errors.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "Warm expiry sweep failed");
        }

        let removed: Vec<CacheKey> = expired
            .into_iter()
            .filter(|r| index.get(&r.key).is_none())
            .map(|r| r.key)
            .collect();
        self.counters.expirations.fetch_add(removed.len() as u64, Ordering::Relaxed);
        self.publish_sizes(&index);
        if !removed.is_empty() {
            info!(removed = removed.len(), "Swept expired warm entries");
        }
        removed
    }

    /// Delete the files of records dropped while storage was unreachable.
    ///
    /// Returns how many files were settled; zero without I/O when nothing is
    /// owed or the circuit is open.
    pub async fn purge_superseded(&self) -> usize {
        let mut index = self.index.lock().await;
        if !index.has_superseded() || self.breaker.is_open() {
            return 0;
        }

        let index_ref: &mut PersistentIndex = &mut index;
        let result = self
            .breaker
            .execute(move || self.settle_superseded(index_ref))
            .await;

        match result {
            Ok(purged) => {
                info!(purged, "Deleted superseded warm entries");
                purged
            }
            Err(CircuitBreakerError::CircuitOpen { .. }) => 0,
            Err(CircuitBreakerError::OperationFailed(e)) => {
                self.counters.io_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Failed to delete superseded warm entries");
                0
            }
        }
    }

    /// Check whether a dropped record's file is still waiting to be deleted
    pub async fn has_superseded(&self) -> bool {
        self.index.lock().await.has_superseded()
    }

    /// Delete temp files left behind by interrupted writes
    pub async fn sweep_temp_files(&self) -> usize {
        // Holding the index lock keeps in-flight writes from being swept.
        let _index = self.index.lock().await;
        if self.breaker.is_open() {
            return 0;
        }

        let files = match self.storage.list(&self.dir).await {
            Ok(files) => files,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Failed to list warm directory");
                return 0;
            }
        };

        let mut removed = 0;
        for path in files.iter().filter(|p| is_temp_file(p)) {
            match self.storage.remove(path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stray temp file"),
            }
        }
        if removed > 0 {
            info!(removed, "Removed stray temp files");
        }
        removed
    }

    /// Check whether `key` is indexed, without touching storage
    pub async fn contains_key(&self, key: &str) -> bool {
        self.index.lock().await.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.counters.entries.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recorded bytes of all indexed entries
    pub fn size_bytes(&self) -> usize {
        self.counters.size_bytes.load(Ordering::Relaxed)
    }

    pub fn max_size_bytes(&self) -> usize {
        self.max_size_bytes
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn stats(&self) -> WarmStats {
        WarmStats {
            entries: self.counters.entries.load(Ordering::Relaxed),
            size_bytes: self.counters.size_bytes.load(Ordering::Relaxed),
            io_errors: self.counters.io_errors.load(Ordering::Relaxed),
            corruptions: self.counters.corruptions.load(Ordering::Relaxed),
            bypassed: self.counters.bypassed.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
        }
    }

    async fn read_entry(&self, path: &Path) -> Result<CacheEntry<V>> {
        let bytes = match self.storage.read(path).await {
            Ok(bytes) => bytes,
            // A missing file under a live directory is data loss; a missing directory is a device fault.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if let Err(dir_err) = self.storage.list(&self.dir).await {
                    return Err(CacheError::io("list warm directory", &self.dir, dir_err));
                }
                return Err(CacheError::Corruption {
                    path: path.to_path_buf(),
                    reason: "entry file missing".to_string(),
                });
            }
            Err(e) => return Err(CacheError::io("read entry", path, e)),
        };

        self.codec.decode(&bytes).map_err(|e| match e {
            CodecError::Corrupt(reason) | CodecError::Encode(reason) => CacheError::Corruption {
                path: path.to_path_buf(),
                reason,
            },
        })
    }

    async fn classify_read_failure(
        &self,
        index: &mut PersistentIndex,
        key: &str,
        error: CacheError,
    ) -> Result<WarmLookup<V>> {
        match error {
            CacheError::Io { .. } => {
                self.counters.io_errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %error, "Warm read failed");
                Ok(WarmLookup::Failed)
            }
            CacheError::Corruption { ref path, ref reason } => {
                self.counters.corruptions.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, path = %path.display(), reason = %reason, "Discarding corrupt warm entry");
                self.discard(index, key).await;
                Ok(WarmLookup::Corrupt)
            }
            other => Err(other),
        }
    }

    async fn write_entry(
        &self,
        index: &mut PersistentIndex,
        entry: &CacheEntry<V>,
        bytes: &[u8],
    ) -> Result<Vec<CacheKey>> {
        let size = entry.size_bytes();
        let replaced = index.get(&entry.key).map(|r| r.size_bytes).unwrap_or(0);
        let mut used = index.total_size_bytes() - replaced;

        let mut evicted = Vec::new();
        if used + size > self.max_size_bytes {
            for victim in index.keys_by_age() {
                if used + size <= self.max_size_bytes {
                    break;
                }
                if victim == entry.key {
                    continue;
                }
                if let Some(record) = index.get(&victim).cloned() {
                    self.remove_file(&index.entry_path(&record)).await?;
                    index.remove(&victim);
                    used -= record.size_bytes;
                    evicted.push(victim);
                }
            }
        }

        let location = location_for(&entry.key);
        let path = index.entry_dir().join(&location);
        atomic_write(self.storage.as_ref(), &path, bytes)
            .await
            .map_err(|e| CacheError::io("write entry", &path, e))?;

        index.put(IndexRecord {
            key: entry.key.clone(),
            location,
            size_bytes: size,
            created_at: entry.metadata.created_at,
            expires_at: entry.metadata.expires_at,
            access_count: 0,
            last_accessed_at: None,
        });
        self.remove_superseded_files(index).await?;
        index.save().await?;

        debug!(key = %entry.key, size, path = %path.display(), "Stored warm entry");
        Ok(evicted)
    }

    async fn delete_record(&self, index: &mut PersistentIndex, record: &IndexRecord) -> Result<()> {
        self.delete_records(index, std::slice::from_ref(record)).await
    }

    async fn delete_records(&self, index: &mut PersistentIndex, records: &[IndexRecord]) -> Result<()> {
        for record in records {
            self.remove_file(&index.entry_path(record)).await?;
            index.remove(&record.key);
        }
        self.remove_superseded_files(index).await?;
        index.save().await
    }

    async fn settle_superseded(&self, index: &mut PersistentIndex) -> Result<usize> {
        let purged = self.remove_superseded_files(index).await?;
        index.save().await?;
        Ok(purged)
    }

    async fn remove_superseded_files(&self, index: &mut PersistentIndex) -> Result<usize> {
        let owed: Vec<String> = index.superseded().cloned().collect();
        for location in &owed {
            self.remove_file(&index.entry_dir().join(location)).await?;
            index.clear_superseded(location);
        }
        Ok(owed.len())
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        match self.storage.remove(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io("remove entry", path, e)),
        }
    }

    /// Remove a dead entry's file and record outside the breaker.
    ///
    /// Cleanup after corruption or expiry is best effort: failures are
    /// logged and the breaker's counters are left as they were. The record
    /// is dropped regardless; a file that survives is deleted later.
    async fn discard(&self, index: &mut PersistentIndex, key: &str) {
        let Some(record) = index.supersede(key) else {
            return;
        };
        let path = index.entry_path(&record);
        match self.remove_file(&path).await {
            Ok(()) => index.clear_superseded(&record.location),
            Err(e) => warn!(key = %key, error = %e, "Failed to delete dead warm entry"),
        }
        if let Err(e) = index.save().await {
            warn!(error = %e, "Failed to save warm index after cleanup");
        }
        self.publish_sizes(index);
    }

    /// Drop a record so a stale value is never served; its file is deleted later
    fn forget(&self, index: &mut PersistentIndex, key: &str) {
        if index.supersede(key).is_some() {
            debug!(key = %key, "Dropped stale warm record");
            self.publish_sizes(index);
        }
    }

    fn publish_sizes(&self, index: &PersistentIndex) {
        self.counters.entries.store(index.len(), Ordering::Relaxed);
        self.counters.size_bytes.store(index.total_size_bytes(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::codec::CompressionKind;
    use crate::cache::index::INDEX_FILE_NAME;
    use crate::cache::storage::{MemoryStorage, TokioStorage};
    use crate::resilience::{CircuitBreakerConfig, CircuitState};
    use std::time::Duration;
    use tempfile::TempDir;

    fn breaker() -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new("warm_tier", CircuitBreakerConfig::default()))
    }

    fn entry(key: &str, size: usize) -> CacheEntry<String> {
        CacheEntry::new(key.to_string(), format!("value-{}", key), Duration::from_secs(60)).with_size(size)
    }

    async fn open_disk(dir: &Path, budget: usize) -> WarmTier<String> {
        WarmTier::open(
            dir,
            budget,
            breaker(),
            Arc::new(TokioStorage),
            EntryCodec::new(CompressionKind::Gzip.compressor()),
        )
        .await
    }

    #[tokio::test]
    async fn test_store_then_get() {
        let tmp = TempDir::new().unwrap();
        let tier = open_disk(tmp.path(), 10_000).await;

        assert!(tier.store(&entry("a", 100)).await);
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.size_bytes(), 100);
        assert!(tmp.path().join(location_for("a")).exists());

        match tier.get("a").await.unwrap() {
            WarmLookup::Hit(e) => {
                assert_eq!(e.payload, "value-a");
                assert_eq!(e.metadata.access_count, 1);
            }
            other => panic!("expected hit, got {:?}", other),
        }
        match tier.get("a").await.unwrap() {
            WarmLookup::Hit(e) => assert_eq!(e.metadata.access_count, 2),
            other => panic!("expected hit, got {:?}", other),
        }
        assert!(matches!(tier.get("b").await.unwrap(), WarmLookup::Miss));
    }

    #[tokio::test]
    async fn test_reopen_uses_saved_index() {
        let tmp = TempDir::new().unwrap();
        {
            let tier = open_disk(tmp.path(), 10_000).await;
            assert!(tier.store(&entry("persisted", 10)).await);
        }

        let tier = open_disk(tmp.path(), 10_000).await;
        assert_eq!(tier.len(), 1);
        assert!(tier.get("persisted").await.unwrap().is_hit());
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest_write() {
        let tmp = TempDir::new().unwrap();
        let tier = open_disk(tmp.path(), 250).await;

        assert!(tier.store(&entry("first", 100)).await);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(tier.store(&entry("second", 100)).await);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(tier.store(&entry("third", 100)).await);

        assert!(!tier.contains_key("first").await);
        assert!(tier.contains_key("second").await);
        assert!(tier.contains_key("third").await);
        assert!(!tmp.path().join(location_for("first")).exists());
        assert_eq!(tier.stats().evictions, 1);
        assert_eq!(tier.size_bytes(), 200);
    }

    #[tokio::test]
    async fn test_oversized_entry_not_stored() {
        let tmp = TempDir::new().unwrap();
        let tier = open_disk(tmp.path(), 100).await;

        assert!(tier.store(&entry("small", 50)).await);
        assert!(!tier.store(&entry("huge", 101)).await);
        assert!(tier.contains_key("small").await);
        assert_eq!(tier.stats().evictions, 0);
    }

    #[tokio::test]
    async fn test_expired_entry_deleted_on_read() {
        let tmp = TempDir::new().unwrap();
        let tier = open_disk(tmp.path(), 10_000).await;
        let short = CacheEntry::new("short".to_string(), "v".to_string(), Duration::from_millis(30)).with_size(1);
        assert!(tier.store(&short).await);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(matches!(tier.get("short").await.unwrap(), WarmLookup::Expired));
        assert!(!tmp.path().join(location_for("short")).exists());
        assert!(tier.is_empty());
        assert_eq!(tier.stats().expirations, 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_removed_without_counting_failure() {
        let tmp = TempDir::new().unwrap();
        let tier = open_disk(tmp.path(), 10_000).await;
        assert!(tier.store(&entry("victim", 10)).await);

        let path = tmp.path().join(location_for("victim"));
        tokio::fs::write(&path, b"garbage").await.unwrap();

        assert!(matches!(tier.get("victim").await.unwrap(), WarmLookup::Corrupt));
        assert!(!path.exists());
        assert!(!tier.contains_key("victim").await);
        assert_eq!(tier.breaker().snapshot().consecutive_failures, 0);
        assert_eq!(tier.stats().corruptions, 1);
    }

    #[tokio::test]
    async fn test_missing_file_heals_index() {
        let tmp = TempDir::new().unwrap();
        let tier = open_disk(tmp.path(), 10_000).await;
        assert!(tier.store(&entry("gone", 10)).await);
        tokio::fs::remove_file(tmp.path().join(location_for("gone"))).await.unwrap();

        assert!(matches!(tier.get("gone").await.unwrap(), WarmLookup::Corrupt));
        assert!(tier.is_empty());
        assert_eq!(tier.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_missing_directory_counts_as_io_failure() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("warm");
        let tier = open_disk(&dir, 10_000).await;
        for key in ["a", "b", "c", "d"] {
            assert!(tier.store(&entry(key, 10)).await);
        }

        tokio::fs::remove_dir_all(&dir).await.unwrap();

        for key in ["a", "b", "c"] {
            assert!(matches!(tier.get(key).await.unwrap(), WarmLookup::Failed));
        }
        assert_eq!(tier.breaker().state(), CircuitState::Open);
        assert!(matches!(tier.get("d").await.unwrap(), WarmLookup::Bypassed));

        let stats = tier.stats();
        assert_eq!(stats.io_errors, 3);
        assert_eq!(stats.corruptions, 0);
        assert_eq!(tier.len(), 4);
    }

    #[tokio::test]
    async fn test_bypassed_overwrite_deletes_old_file_after_recovery() {
        let tmp = TempDir::new().unwrap();
        let tier = open_disk(tmp.path(), 10_000).await;
        assert!(tier.store(&entry("k", 10)).await);

        tier.breaker().force_open();
        assert!(!tier.store(&entry("k", 10)).await);
        assert!(!tier.contains_key("k").await);
        assert!(tier.has_superseded().await);
        assert_eq!(tier.purge_superseded().await, 0);

        tier.breaker().reset();
        assert_eq!(tier.purge_superseded().await, 1);
        assert!(!tmp.path().join(location_for("k")).exists());
        assert!(!tier.has_superseded().await);

        let reopened = open_disk(tmp.path(), 10_000).await;
        assert!(reopened.is_empty());
    }

    #[tokio::test]
    async fn test_remove_and_sweep_temp_files() {
        let tmp = TempDir::new().unwrap();
        let tier = open_disk(tmp.path(), 10_000).await;
        assert!(tier.store(&entry("k", 10)).await);

        assert!(tier.remove("k").await);
        assert!(!tier.remove("k").await);
        assert!(!tmp.path().join(location_for("k")).exists());

        tokio::fs::write(tmp.path().join("orphan.entry.1234.tmp"), b"partial").await.unwrap();
        assert_eq!(tier.sweep_temp_files().await, 1);
        assert!(tmp.path().join(INDEX_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_sweep_expired() {
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
        let tier: WarmTier<String> =
            WarmTier::open("/warm", 10_000, breaker(), storage, EntryCodec::default()).await;

        let short = CacheEntry::new("short".to_string(), "v".to_string(), Duration::from_millis(20)).with_size(1);
        assert!(tier.store(&short).await);
        assert!(tier.store(&entry("long", 1)).await);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(tier.sweep_expired().await, vec!["short".to_string()]);
        assert_eq!(tier.len(), 1);
        assert!(tier.contains_key("long").await);
    }

    #[tokio::test]
    async fn test_open_circuit_skips_storage() {
        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
        let tier: WarmTier<String> =
            WarmTier::open("/warm", 10_000, breaker(), storage, EntryCodec::default()).await;
        assert!(tier.store(&entry("k", 10)).await);

        tier.breaker().force_open();
        assert!(matches!(tier.get("k").await.unwrap(), WarmLookup::Bypassed));
        assert!(!tier.store(&entry("other", 10)).await);
        assert_eq!(tier.stats().bypassed, 2);
    }
}
