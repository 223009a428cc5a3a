//! In-memory storage (non-persistent, for tests and in-process keystores)

use super::{handle_poison, BlobReader, BlobWriter, Storage, StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use zeroize::Zeroizing;

type Objects = Arc<RwLock<HashMap<String, Zeroizing<Vec<u8>>>>>;

/// In-memory object store with optional byte capacity.
///
/// Creation is atomic: bytes are buffered in the writer and the object only
/// appears when the writer is committed.
#[derive(Clone)]
pub struct MemoryStorage {
    objects: Objects,
    capacity: Option<u64>,
}

impl MemoryStorage {
    /// Create an unbounded memory storage
    pub fn new() -> Self {
        MemoryStorage {
            objects: Arc::new(RwLock::new(HashMap::new())),
            capacity: None,
        }
    }

    /// Create a memory storage holding at most `capacity` bytes
    pub fn with_capacity(capacity: u64) -> Self {
        MemoryStorage {
            objects: Arc::new(RwLock::new(HashMap::new())),
            capacity: Some(capacity),
        }
    }

    /// Total bytes currently stored
    pub fn used_bytes(&self) -> StorageResult<u64> {
        let objects = self.objects.read().map_err(handle_poison)?;
        Ok(used(&objects))
    }

    /// Number of stored objects
    pub fn len(&self) -> StorageResult<usize> {
        Ok(self.objects.read().map_err(handle_poison)?.len())
    }

    /// Whether no objects are stored
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Overwrite raw object bytes, bypassing create-only semantics.
    ///
    /// Only useful to simulate on-media corruption.
    pub fn put_raw(&self, name: &str, bytes: &[u8]) -> StorageResult<()> {
        self.objects
            .write()
            .map_err(handle_poison)?
            .insert(name.to_string(), Zeroizing::new(bytes.to_vec()));
        Ok(())
    }

    /// Raw object bytes, if present
    pub fn get_raw(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .objects
            .read()
            .map_err(handle_poison)?
            .get(name)
            .map(|b| b.to_vec()))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn used(objects: &HashMap<String, Zeroizing<Vec<u8>>>) -> u64 {
    objects.values().map(|b| b.len() as u64).sum()
}

fn check_name(name: &str) -> StorageResult<()> {
    if name.is_empty() {
        return Err(StorageError::InvalidName("empty object name".to_string()));
    }
    Ok(())
}

struct MemoryWriter {
    objects: Objects,
    capacity: Option<u64>,
    name: String,
    max_size: usize,
    buffer: Zeroizing<Vec<u8>>,
}

impl BlobWriter for MemoryWriter {
    fn write(&mut self, bytes: &[u8]) -> StorageResult<()> {
        let requested = self.buffer.len() + bytes.len();
        if requested > self.max_size {
            return Err(StorageError::InsufficientSpace {
                requested: requested as u64,
                available: self.max_size as u64,
            });
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> StorageResult<()> {
        let mut objects = self.objects.write().map_err(handle_poison)?;

        if objects.contains_key(&self.name) {
            return Err(StorageError::AlreadyExists(self.name.clone()));
        }

        if let Some(capacity) = self.capacity {
            let available = capacity.saturating_sub(used(&objects));
            if self.buffer.len() as u64 > available {
                return Err(StorageError::InsufficientSpace {
                    requested: self.buffer.len() as u64,
                    available,
                });
            }
        }

        let data = std::mem::take(&mut self.buffer);
        objects.insert(self.name.clone(), data);
        Ok(())
    }
}

struct MemoryReader {
    data: Zeroizing<Vec<u8>>,
    pos: usize,
}

impl BlobReader for MemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> StorageResult<usize> {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Storage for MemoryStorage {
    fn open_for_write(&self, name: &str, max_size: usize) -> StorageResult<Box<dyn BlobWriter>> {
        check_name(name)?;
        let objects = self.objects.read().map_err(handle_poison)?;

        if objects.contains_key(name) {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }

        if let Some(capacity) = self.capacity {
            let available = capacity.saturating_sub(used(&objects));
            if max_size as u64 > available {
                return Err(StorageError::InsufficientSpace {
                    requested: max_size as u64,
                    available,
                });
            }
        }

        Ok(Box::new(MemoryWriter {
            objects: Arc::clone(&self.objects),
            capacity: self.capacity,
            name: name.to_string(),
            max_size,
            buffer: Zeroizing::new(Vec::with_capacity(max_size)),
        }))
    }

    fn open_for_read(&self, name: &str) -> StorageResult<Box<dyn BlobReader>> {
        let objects = self.objects.read().map_err(handle_poison)?;
        let data = objects
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        Ok(Box::new(MemoryReader { data, pos: 0 }))
    }

    fn remove(&self, name: &str) -> StorageResult<()> {
        self.objects
            .write()
            .map_err(handle_poison)?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        check_name(to)?;
        let mut objects = self.objects.write().map_err(handle_poison)?;

        if objects.contains_key(to) {
            return Err(StorageError::AlreadyExists(to.to_string()));
        }
        let data = objects
            .remove(from)
            .ok_or_else(|| StorageError::NotFound(from.to_string()))?;
        objects.insert(to.to_string(), data);
        Ok(())
    }

    fn list_names(&self) -> StorageResult<Vec<String>> {
        let mut names: Vec<String> = self
            .objects
            .read()
            .map_err(handle_poison)?
            .keys()
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    fn exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.objects.read().map_err(handle_poison)?.contains_key(name))
    }

    fn atomic_create(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(storage: &MemoryStorage, name: &str, bytes: &[u8]) -> StorageResult<()> {
        let mut w = storage.open_for_write(name, bytes.len())?;
        w.write(bytes)?;
        w.commit()
    }

    #[test]
    fn test_write_then_read() {
        let storage = MemoryStorage::new();
        put(&storage, "ns/key", b"hello").unwrap();

        let mut r = storage.open_for_read("ns/key").unwrap();
        let mut buf = [0u8; 16];
        let n = r.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(r.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_uncommitted_write_is_invisible() {
        let storage = MemoryStorage::new();
        let mut w = storage.open_for_write("k", 4).unwrap();
        w.write(b"abcd").unwrap();
        assert!(!storage.exists("k").unwrap());
        drop(w);
        assert!(!storage.exists("k").unwrap());
    }

    #[test]
    fn test_create_only() {
        let storage = MemoryStorage::new();
        put(&storage, "k", b"one").unwrap();
        assert!(matches!(
            storage.open_for_write("k", 3),
            Err(StorageError::AlreadyExists(_))
        ));
        assert_eq!(storage.get_raw("k").unwrap().unwrap(), b"one");
    }

    #[test]
    fn test_write_past_max_size() {
        let storage = MemoryStorage::new();
        let mut w = storage.open_for_write("k", 2).unwrap();
        assert!(matches!(
            w.write(b"abc"),
            Err(StorageError::InsufficientSpace { requested: 3, available: 2 })
        ));
    }

    #[test]
    fn test_capacity_exhausted() {
        let storage = MemoryStorage::with_capacity(10);
        put(&storage, "a", &[0u8; 8]).unwrap();
        assert!(matches!(
            storage.open_for_write("b", 3),
            Err(StorageError::InsufficientSpace { requested: 3, available: 2 })
        ));
        put(&storage, "b", &[0u8; 2]).unwrap();
        assert_eq!(storage.used_bytes().unwrap(), 10);
    }

    #[test]
    fn test_remove_and_not_found() {
        let storage = MemoryStorage::new();
        put(&storage, "k", b"x").unwrap();
        storage.remove("k").unwrap();
        assert!(matches!(storage.remove("k"), Err(StorageError::NotFound(_))));
        assert!(matches!(storage.open_for_read("k"), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_rename_does_not_clobber() {
        let storage = MemoryStorage::new();
        put(&storage, "a", b"1").unwrap();
        put(&storage, "b", b"2").unwrap();

        assert!(matches!(storage.rename("a", "b"), Err(StorageError::AlreadyExists(_))));
        assert!(matches!(storage.rename("c", "d"), Err(StorageError::NotFound(_))));

        storage.rename("a", "c").unwrap();
        assert_eq!(storage.list_names().unwrap(), vec!["b".to_string(), "c".to_string()]);
    }
}
