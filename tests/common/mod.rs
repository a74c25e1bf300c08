//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use ouroboros_cache::cache::{MemoryStorage, StorageBackend, TokioStorage};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Storage double that counts every call and can be switched into failure mode.
///
/// While failing, every operation (or only the one chosen with
/// [`FaultyStorage::fail_only`]) returns `PermissionDenied` without reaching
/// the wrapped backend.
#[derive(Debug)]
pub struct FaultyStorage {
    inner: Arc<dyn StorageBackend>,
    failing: AtomicBool,
    failing_op: Mutex<Option<&'static str>>,
    calls: AtomicUsize,
}

impl FaultyStorage {
    pub fn wrap(inner: Arc<dyn StorageBackend>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failing: AtomicBool::new(false),
            failing_op: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    /// In-memory backend; safe to use with paused tokio time
    pub fn in_memory() -> Arc<Self> {
        Self::wrap(Arc::new(MemoryStorage::new()))
    }

    pub fn on_disk() -> Arc<Self> {
        Self::wrap(Arc::new(TokioStorage))
    }

    /// Fail every operation, or none; clears any [`Self::fail_only`] choice
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
        *self.failing_op.lock().unwrap() = None;
    }

    /// Fail only operations named `op` (e.g. `"rename"`)
    pub fn fail_only(&self, op: &'static str) {
        *self.failing_op.lock().unwrap() = Some(op);
    }

    /// Calls observed since the last reset
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    fn check(&self, op: &'static str, path: &Path) -> io::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let op_fails = *self.failing_op.lock().unwrap() == Some(op);
        if self.failing.load(Ordering::SeqCst) || op_fails {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("injected failure: {} {}", op, path.display()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FaultyStorage {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.check("read", path)?;
        self.inner.read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.check("write", path)?;
        self.inner.write(path, data).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.check("rename", from)?;
        self.inner.rename(from, to).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        self.check("remove", path)?;
        self.inner.remove(path).await
    }

    async fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        self.check("list", dir)?;
        self.inner.list(dir).await
    }

    async fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        self.check("create_dir_all", dir)?;
        self.inner.create_dir_all(dir).await
    }
}

/// Payload of `len` bytes; serializes to `len + 2` bytes of JSON
pub fn payload(len: usize) -> String {
    "x".repeat(len)
}
