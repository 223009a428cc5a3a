//! Storage collaborator
//!
//! Named-blob storage the keystore persists records into. Backends create,
//! read, remove and rename objects identified by `/`-separated names.

use std::sync::{Arc, PoisonError};
use thiserror::Error;

pub mod encrypted;
pub mod file;
pub mod memory;

pub use encrypted::EncryptedStorage;
pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Insufficient space: requested {requested} bytes, {available} available")]
    InsufficientSpace { requested: u64, available: u64 },

    #[error("Invalid object name: {0}")]
    InvalidName(String),

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Helper to convert poison errors into StorageError
pub(crate) fn handle_poison<T>(_err: PoisonError<T>) -> StorageError {
    StorageError::Other("Lock poisoned: a thread panicked while holding the lock".to_string())
}

/// Sequential writer for a newly created object.
///
/// Nothing is guaranteed to be visible under the object name until
/// [`BlobWriter::commit`] returns. Dropping the writer abandons the write.
pub trait BlobWriter: Send {
    /// Append bytes to the object
    fn write(&mut self, bytes: &[u8]) -> StorageResult<()>;

    /// Finish the write
    fn commit(self: Box<Self>) -> StorageResult<()>;
}

/// Sequential reader over a stored object
pub trait BlobReader: Send {
    /// Read up to `buf.len()` bytes, returning 0 at end of object
    fn read(&mut self, buf: &mut [u8]) -> StorageResult<usize>;
}

/// Abstract named-object storage
pub trait Storage: Send + Sync {
    /// Create a new object for writing, reserving room for `max_size` bytes.
    ///
    /// Fails with `AlreadyExists` if an object with that name exists and with
    /// `InsufficientSpace` if `max_size` bytes cannot be reserved.
    fn open_for_write(&self, name: &str, max_size: usize) -> StorageResult<Box<dyn BlobWriter>>;

    /// Open an existing object for reading
    fn open_for_read(&self, name: &str) -> StorageResult<Box<dyn BlobReader>>;

    /// Remove an object
    fn remove(&self, name: &str) -> StorageResult<()>;

    /// Rename an object. The target must not exist.
    fn rename(&self, from: &str, to: &str) -> StorageResult<()>;

    /// List the names of all stored objects
    fn list_names(&self) -> StorageResult<Vec<String>>;

    /// Check whether an object exists
    fn exists(&self, name: &str) -> StorageResult<bool> {
        match self.open_for_read(name) {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Whether a committed write is all-or-nothing under the target name
    fn atomic_create(&self) -> bool {
        false
    }
}

impl<S: Storage + ?Sized> Storage for Arc<S> {
    fn open_for_write(&self, name: &str, max_size: usize) -> StorageResult<Box<dyn BlobWriter>> {
        (**self).open_for_write(name, max_size)
    }

    fn open_for_read(&self, name: &str) -> StorageResult<Box<dyn BlobReader>> {
        (**self).open_for_read(name)
    }

    fn remove(&self, name: &str) -> StorageResult<()> {
        (**self).remove(name)
    }

    fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        (**self).rename(from, to)
    }

    fn list_names(&self) -> StorageResult<Vec<String>> {
        (**self).list_names()
    }

    fn exists(&self, name: &str) -> StorageResult<bool> {
        (**self).exists(name)
    }

    fn atomic_create(&self) -> bool {
        (**self).atomic_create()
    }
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn open_for_write(&self, name: &str, max_size: usize) -> StorageResult<Box<dyn BlobWriter>> {
        (**self).open_for_write(name, max_size)
    }

    fn open_for_read(&self, name: &str) -> StorageResult<Box<dyn BlobReader>> {
        (**self).open_for_read(name)
    }

    fn remove(&self, name: &str) -> StorageResult<()> {
        (**self).remove(name)
    }

    fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        (**self).rename(from, to)
    }

    fn list_names(&self) -> StorageResult<Vec<String>> {
        (**self).list_names()
    }

    fn exists(&self, name: &str) -> StorageResult<bool> {
        (**self).exists(name)
    }

    fn atomic_create(&self) -> bool {
        (**self).atomic_create()
    }
}

/// Read a whole object, failing once more than `limit` bytes are present.
///
/// Returns `Ok(None)` when the object is larger than `limit`.
pub fn read_to_end(
    reader: &mut dyn BlobReader,
    limit: usize,
) -> StorageResult<Option<zeroize::Zeroizing<Vec<u8>>>> {
    let mut out = zeroize::Zeroizing::new(Vec::with_capacity(limit.min(4096)));
    let mut chunk = zeroize::Zeroizing::new([0u8; 512]);

    loop {
        let n = reader.read(&mut chunk[..])?;
        if n == 0 {
            return Ok(Some(out));
        }
        if out.len() + n > limit {
            return Ok(None);
        }
        out.extend_from_slice(&chunk[..n]);
    }
}
