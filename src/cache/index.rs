//! Persistent index of warm-tier entries
//!
//! Maps cache keys to the entry files that hold them. The index is a single
//! JSON document written with the temp-file-then-rename discipline, so a
//! crash mid-save leaves the previous index intact. If the document is
//! missing or unreadable it is re-derived by scanning the entry files.

use crate::cache::codec::EntryCodec;
use crate::cache::storage::{atomic_write, is_temp_file, StorageBackend};
use crate::cache::types::CacheKey;
use crate::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// File name of the index document inside the warm directory
pub const INDEX_FILE_NAME: &str = "index.json";

/// Extension of entry files
pub const ENTRY_EXTENSION: &str = "entry";

const INDEX_FORMAT_VERSION: u32 = 1;

/// Index metadata for one persisted entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub key: CacheKey,

    /// Entry file name, relative to the warm directory
    pub location: String,

    pub size_bytes: usize,

    pub created_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,

    /// Warm hits since the entry was written
    #[serde(default)]
    pub access_count: u64,

    #[serde(default)]
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl IndexRecord {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexDocument {
    version: u32,
    records: BTreeMap<CacheKey, IndexRecord>,
}

/// Entry file name for a key; hashing keeps arbitrary keys inside the directory
pub fn location_for(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("{}.{}", hex::encode(digest), ENTRY_EXTENSION)
}

/// In-memory copy of the index plus its backing file
#[derive(Debug)]
pub struct PersistentIndex {
    entry_dir: PathBuf,
    index_path: PathBuf,
    storage: Arc<dyn StorageBackend>,
    codec: EntryCodec,
    records: HashMap<CacheKey, IndexRecord>,
    /// Entry files whose records were dropped but whose deletion is still owed
    superseded: BTreeSet<String>,
}

impl PersistentIndex {
    /// Create an empty index for `entry_dir` without touching storage
    pub fn new(entry_dir: impl Into<PathBuf>, storage: Arc<dyn StorageBackend>, codec: EntryCodec) -> Self {
        let entry_dir = entry_dir.into();
        let index_path = entry_dir.join(INDEX_FILE_NAME);
        Self {
            entry_dir,
            index_path,
            storage,
            codec,
            records: HashMap::new(),
            superseded: BTreeSet::new(),
        }
    }

    /// Load the index from its backing file.
    ///
    /// A missing or unparseable index triggers [`Self::rebuild_from_disk`];
    /// only I/O errors other than "not found" are returned.
    pub async fn load(
        entry_dir: impl Into<PathBuf>,
        storage: Arc<dyn StorageBackend>,
        codec: EntryCodec,
    ) -> Result<Self> {
        let mut index = Self::new(entry_dir, storage, codec);

        match index.storage.read(&index.index_path).await {
            Ok(bytes) => match serde_json::from_slice::<IndexDocument>(&bytes) {
                Ok(doc) if doc.version == INDEX_FORMAT_VERSION => {
                    index.records = doc.records.into_iter().collect();
                    info!(
                        path = %index.index_path.display(),
                        entries = index.records.len(),
                        "Loaded warm index"
                    );
                }
                Ok(doc) => {
                    warn!(version = doc.version, "Unsupported index version, rebuilding from disk");
                    index.rebuild_from_disk().await?;
                }
                Err(e) => {
                    warn!(error = %e, "Index file is corrupt, rebuilding from disk");
                    index.rebuild_from_disk().await?;
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %index.index_path.display(), "No index file, rebuilding from disk");
                index.rebuild_from_disk().await?;
            }
            Err(e) => return Err(CacheError::io("read index", &index.index_path, e)),
        }

        Ok(index)
    }

    /// Re-derive the index from the entry files and persist it.
    ///
    /// Files that cannot be parsed are skipped and logged, never deleted;
    /// superseded files are skipped too. A failed save is logged and the
    /// rebuilt records are kept. Returns the number of recovered records.
    pub async fn rebuild_from_disk(&mut self) -> Result<usize> {
        let files = match self.storage.list(&self.entry_dir).await {
            Ok(files) => files,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(CacheError::io("list entry directory", &self.entry_dir, e)),
        };

        let mut rebuilt: HashMap<CacheKey, IndexRecord> = HashMap::new();
        let mut skipped = 0usize;

        for path in files {
            if is_temp_file(&path) || path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let Some(location) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            if self.superseded.contains(&location) {
                continue;
            }

            let bytes = match self.storage.read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable entry file");
                    skipped += 1;
                    continue;
                }
            };

            let header = match self.codec.decode_header(&bytes) {
                Ok(header) => header,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unparseable entry file");
                    skipped += 1;
                    continue;
                }
            };

            let record = IndexRecord {
                key: header.key,
                location,
                size_bytes: header.metadata.size_bytes,
                created_at: header.metadata.created_at,
                expires_at: header.metadata.expires_at,
                access_count: 0,
                last_accessed_at: None,
            };

            // Two files claiming one key: keep the newer write.
            let keep_existing = rebuilt
                .get(&record.key)
                .map(|existing| existing.created_at >= record.created_at)
                .unwrap_or(false);
            if !keep_existing {
                rebuilt.insert(record.key.clone(), record);
            }
        }

        self.records = rebuilt;
        info!(
            dir = %self.entry_dir.display(),
            recovered = self.records.len(),
            skipped,
            "Rebuilt warm index from disk"
        );

        if let Err(e) = self.save().await {
            warn!(error = %e, "Failed to persist rebuilt index, keeping it in memory");
        }
        Ok(self.records.len())
    }

    /// Persist the in-memory index atomically
    pub async fn save(&self) -> Result<()> {
        let doc = IndexDocument {
            version: INDEX_FORMAT_VERSION,
            records: self
                .records
                .iter()
                .map(|(k, r)| (k.clone(), r.clone()))
                .collect(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)?;

        atomic_write(self.storage.as_ref(), &self.index_path, &bytes)
            .await
            .map_err(|e| CacheError::io("save index", &self.index_path, e))?;

        debug!(entries = doc.records.len(), "Saved warm index");
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&IndexRecord> {
        self.records.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut IndexRecord> {
        self.records.get_mut(key)
    }

    /// Insert or replace a record, returning the previous one
    pub fn put(&mut self, record: IndexRecord) -> Option<IndexRecord> {
        self.superseded.remove(&record.location);
        self.records.insert(record.key.clone(), record)
    }

    pub fn remove(&mut self, key: &str) -> Option<IndexRecord> {
        self.records.remove(key)
    }

    /// Drop a record whose file could not be deleted yet.
    ///
    /// The file stays owed until [`Self::clear_superseded`] is called for
    /// its location, or a new record claims the same location.
    pub fn supersede(&mut self, key: &str) -> Option<IndexRecord> {
        let record = self.records.remove(key)?;
        self.superseded.insert(record.location.clone());
        Some(record)
    }

    /// Locations of dropped records whose files still need deleting
    pub fn superseded(&self) -> impl Iterator<Item = &String> {
        self.superseded.iter()
    }

    pub fn clear_superseded(&mut self, location: &str) {
        self.superseded.remove(location);
    }

    pub fn has_superseded(&self) -> bool {
        !self.superseded.is_empty()
    }

    /// Number of indexed entries
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of the recorded entry sizes
    pub fn total_size_bytes(&self) -> usize {
        self.records.values().map(|r| r.size_bytes).sum()
    }

    pub fn records(&self) -> impl Iterator<Item = &IndexRecord> {
        self.records.values()
    }

    /// Keys ordered oldest write first
    pub fn keys_by_age(&self) -> Vec<CacheKey> {
        let mut records: Vec<&IndexRecord> = self.records.values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));
        records.into_iter().map(|r| r.key.clone()).collect()
    }

    /// Absolute path of a record's entry file
    pub fn entry_path(&self, record: &IndexRecord) -> PathBuf {
        self.entry_dir.join(&record.location)
    }

    pub fn entry_dir(&self) -> &Path {
        &self.entry_dir
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }
}
