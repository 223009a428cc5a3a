//! Storage wrapper that fails on demand

use crate::storage::{BlobReader, BlobWriter, Storage, StorageError, StorageResult};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Faults {
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_appends: AtomicBool,
    fail_commits: AtomicBool,
    fail_renames: AtomicBool,
    fail_removes: AtomicBool,
    fail_remove_of: Mutex<HashSet<String>>,
    calls: AtomicUsize,
    renames: AtomicUsize,
}

fn injected(what: &str, name: &str) -> StorageError {
    StorageError::Other(format!("injected {} failure on {}", what, name))
}

/// Wraps a storage and injects failures into selected operations.
///
/// Clones share the same faults and counters, so a test can keep a handle
/// after moving a clone into a keystore.
pub struct FaultyStorage<S> {
    inner: Arc<S>,
    faults: Arc<Faults>,
}

impl<S> Clone for FaultyStorage<S> {
    fn clone(&self) -> Self {
        FaultyStorage {
            inner: Arc::clone(&self.inner),
            faults: Arc::clone(&self.faults),
        }
    }
}

impl<S: Storage> FaultyStorage<S> {
    pub fn new(inner: S) -> Self {
        FaultyStorage {
            inner: Arc::new(inner),
            faults: Arc::new(Faults::default()),
        }
    }

    /// The wrapped storage
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fail `open_for_read` and `exists`
    pub fn fail_reads(&self, fail: bool) {
        self.faults.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Fail `open_for_write`
    pub fn fail_writes(&self, fail: bool) {
        self.faults.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Let `open_for_write` through but fail every append to the writer
    pub fn fail_appends(&self, fail: bool) {
        self.faults.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Let writes through but fail their commit
    pub fn fail_commits(&self, fail: bool) {
        self.faults.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Fail `rename`
    pub fn fail_renames(&self, fail: bool) {
        self.faults.fail_renames.store(fail, Ordering::SeqCst);
    }

    /// Fail every `remove`
    pub fn fail_removes(&self, fail: bool) {
        self.faults.fail_removes.store(fail, Ordering::SeqCst);
    }

    /// Fail `remove` of one object name
    pub fn fail_remove_of(&self, name: &str) {
        if let Ok(mut names) = self.faults.fail_remove_of.lock() {
            names.insert(name.to_string());
        }
    }

    /// Clear every injected fault. Counters are kept.
    pub fn clear_faults(&self) {
        self.fail_reads(false);
        self.fail_writes(false);
        self.fail_appends(false);
        self.fail_commits(false);
        self.fail_renames(false);
        self.fail_removes(false);
        if let Ok(mut names) = self.faults.fail_remove_of.lock() {
            names.clear();
        }
    }

    /// Storage calls made so far
    pub fn calls(&self) -> usize {
        self.faults.calls.load(Ordering::SeqCst)
    }

    /// Successful renames so far
    pub fn renames(&self) -> usize {
        self.faults.renames.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.faults.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn remove_fails(&self, name: &str) -> bool {
        self.faults.fail_removes.load(Ordering::SeqCst)
            || self
                .faults
                .fail_remove_of
                .lock()
                .map(|names| names.contains(name))
                .unwrap_or(true)
    }
}

struct FaultyWriter {
    inner: Box<dyn BlobWriter>,
    name: String,
    fail_append: bool,
    fail_commit: bool,
}

impl BlobWriter for FaultyWriter {
    fn write(&mut self, bytes: &[u8]) -> StorageResult<()> {
        if self.fail_append {
            return Err(injected("append", &self.name));
        }
        self.inner.write(bytes)
    }

    fn commit(self: Box<Self>) -> StorageResult<()> {
        if self.fail_commit {
            return Err(injected("commit", &self.name));
        }
        self.inner.commit()
    }
}

impl<S: Storage> Storage for FaultyStorage<S> {
    fn open_for_write(&self, name: &str, max_size: usize) -> StorageResult<Box<dyn BlobWriter>> {
        self.count();
        if self.faults.fail_writes.load(Ordering::SeqCst) {
            return Err(injected("write", name));
        }
        let inner = self.inner.open_for_write(name, max_size)?;
        Ok(Box::new(FaultyWriter {
            inner,
            name: name.to_string(),
            fail_append: self.faults.fail_appends.load(Ordering::SeqCst),
            fail_commit: self.faults.fail_commits.load(Ordering::SeqCst),
        }))
    }

    fn open_for_read(&self, name: &str) -> StorageResult<Box<dyn BlobReader>> {
        self.count();
        if self.faults.fail_reads.load(Ordering::SeqCst) {
            return Err(injected("read", name));
        }
        self.inner.open_for_read(name)
    }

    fn remove(&self, name: &str) -> StorageResult<()> {
        self.count();
        if self.remove_fails(name) {
            return Err(injected("remove", name));
        }
        self.inner.remove(name)
    }

    fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        self.count();
        if self.faults.fail_renames.load(Ordering::SeqCst) {
            return Err(injected("rename", from));
        }
        self.inner.rename(from, to)?;
        self.faults.renames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn list_names(&self) -> StorageResult<Vec<String>> {
        self.count();
        self.inner.list_names()
    }

    fn exists(&self, name: &str) -> StorageResult<bool> {
        self.count();
        if self.faults.fail_reads.load(Ordering::SeqCst) {
            return Err(injected("read", name));
        }
        self.inner.exists(name)
    }

    fn atomic_create(&self) -> bool {
        self.inner.atomic_create()
    }
}
