//! Filesystem abstraction for the persistent tier
//!
//! The warm tier and its index never call `tokio::fs` directly; they go
//! through a [`StorageBackend`] so the engine can be pointed at a different
//! medium and so tests can observe or fail every call.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::fs;

/// Minimal async filesystem surface used by the persistent tier
#[async_trait]
pub trait StorageBackend: Send + Sync + Debug {
    /// Read a whole file
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Create or truncate a file and write `data` to it
    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Atomically replace `to` with `from`
    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Delete a file
    async fn remove(&self, path: &Path) -> io::Result<()>;

    /// List regular files directly inside `dir`
    async fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    /// Create a directory and its parents
    async fn create_dir_all(&self, dir: &Path) -> io::Result<()>;
}

/// Production backend on top of `tokio::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioStorage;

#[async_trait]
impl StorageBackend for TokioStorage {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        fs::write(path, data).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path).await
    }

    async fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    async fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir).await
    }
}

/// Volatile backend keeping files in memory.
///
/// Mirrors the filesystem rules the warm tier relies on: writes into a
/// directory that was never created fail with `NotFound`, and `rename`
/// replaces the destination in one step.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: Mutex<MemoryFs>,
}

#[derive(Debug, Default)]
struct MemoryFs {
    dirs: BTreeSet<PathBuf>,
    files: BTreeMap<PathBuf, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryFs> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))
}

impl MemoryFs {
    fn has_parent_dir(&self, path: &Path) -> bool {
        path.parent().map(|p| self.dirs.contains(p)).unwrap_or(false)
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.lock().files.get(path).cloned().ok_or_else(|| not_found(path))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut fs = self.lock();
        if !fs.has_parent_dir(path) {
            return Err(not_found(path));
        }
        fs.files.insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut fs = self.lock();
        if !fs.has_parent_dir(to) {
            return Err(not_found(to));
        }
        let data = fs.files.remove(from).ok_or_else(|| not_found(from))?;
        fs.files.insert(to.to_path_buf(), data);
        Ok(())
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        self.lock().files.remove(path).map(|_| ()).ok_or_else(|| not_found(path))
    }

    async fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let fs = self.lock();
        if !fs.dirs.contains(dir) {
            return Err(not_found(dir));
        }
        Ok(fs
            .files
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .cloned()
            .collect())
    }

    async fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        let mut fs = self.lock();
        for ancestor in dir.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            fs.dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }
}

/// Suffix marking in-flight writes; such files are never valid entries
pub const TEMP_SUFFIX: &str = ".tmp";

/// Unique sibling path used for the write-then-rename discipline
pub fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}.{}{}", file_name, uuid::Uuid::new_v4(), TEMP_SUFFIX))
}

/// True for files left behind by an interrupted write
pub fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(TEMP_SUFFIX))
        .unwrap_or(false)
}

/// Write `data` to `path` so readers see either the old or the new content.
///
/// The data goes to a unique temporary sibling first and is renamed into
/// place. On failure the temporary file is removed (best effort) and the
/// original error is returned.
pub async fn atomic_write(
    storage: &dyn StorageBackend,
    path: &Path,
    data: &[u8],
) -> io::Result<()> {
    let temp = temp_path_for(path);

    if let Err(e) = storage.write(&temp, data).await {
        let _ = storage.remove(&temp).await;
        return Err(e);
    }

    if let Err(e) = storage.rename(&temp, path).await {
        let _ = storage.remove(&temp).await;
        return Err(e);
    }

    Ok(())
}
