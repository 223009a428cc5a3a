//! Directory-backed storage
//!
//! Object names map to relative paths under a root directory, so
//! `"main/AESKey"` is stored as `<root>/main/AESKey`. Files are created
//! in place: a crash mid-write can leave a partial file under the target
//! name, which is why [`Storage::atomic_create`] reports `false` here and
//! the keystore writes through a temporary name.
//!
//! Names are compared the way the filesystem compares paths. On a
//! case-insensitive filesystem `"main/K"` and `"main/k"` are one file: a
//! create under the other casing fails with `AlreadyExists`, and a keystore
//! load under it sees a record for a different name and reports it as
//! corrupt.

use super::{BlobReader, BlobWriter, Storage, StorageError, StorageResult};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// File storage rooted at a directory, with an optional byte quota
pub struct FileStorage {
    root: PathBuf,
    quota: Option<u64>,
}

impl FileStorage {
    /// Create a file storage at the given root, creating the directory
    pub fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(FileStorage { root, quota: None })
    }

    /// Create a file storage that refuses to grow past `quota` bytes
    pub fn with_quota(root: impl Into<PathBuf>, quota: u64) -> StorageResult<Self> {
        let mut storage = Self::new(root)?;
        storage.quota = Some(quota);
        Ok(storage)
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Total bytes stored under the root
    pub fn used_bytes(&self) -> StorageResult<u64> {
        dir_size(&self.root)
    }

    fn object_path(&self, name: &str) -> StorageResult<PathBuf> {
        let mut path = self.root.clone();
        for component in name.split('/') {
            if component.is_empty()
                || component == "."
                || component == ".."
                || component.contains('\\')
                || component.contains('\0')
            {
                return Err(StorageError::InvalidName(name.to_string()));
            }
            path.push(component);
        }
        Ok(path)
    }
}

fn map_io(err: std::io::Error, name: &str) -> StorageError {
    match err.kind() {
        ErrorKind::NotFound => StorageError::NotFound(name.to_string()),
        ErrorKind::AlreadyExists => StorageError::AlreadyExists(name.to_string()),
        _ => StorageError::Io(err),
    }
}

/// Metadata of `path`, or `None` if nothing is there
fn stat(path: &Path) -> StorageResult<Option<fs::Metadata>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::Io(e)),
    }
}

fn is_file(path: &Path) -> StorageResult<bool> {
    Ok(stat(path)?.map_or(false, |meta| meta.is_file()))
}

fn dir_size(dir: &Path) -> StorageResult<u64> {
    let mut total = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            total += dir_size(&entry.path())?;
        } else if file_type.is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

fn collect_names(dir: &Path, prefix: &str, names: &mut Vec<String>) -> StorageResult<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let name = if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", prefix, file_name)
        };

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_names(&entry.path(), &name, names)?;
        } else if file_type.is_file() {
            names.push(name);
        }
    }
    Ok(())
}

struct FileWriter {
    file: File,
    name: String,
    written: usize,
    max_size: usize,
}

impl BlobWriter for FileWriter {
    fn write(&mut self, bytes: &[u8]) -> StorageResult<()> {
        let requested = self.written + bytes.len();
        if requested > self.max_size {
            return Err(StorageError::InsufficientSpace {
                requested: requested as u64,
                available: self.max_size as u64,
            });
        }
        self.file.write_all(bytes).map_err(|e| map_io(e, &self.name))?;
        self.written = requested;
        Ok(())
    }

    fn commit(self: Box<Self>) -> StorageResult<()> {
        self.file.sync_all().map_err(|e| map_io(e, &self.name))
    }
}

struct FileReader {
    file: File,
    name: String,
}

impl BlobReader for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> StorageResult<usize> {
        self.file.read(buf).map_err(|e| map_io(e, &self.name))
    }
}

impl Storage for FileStorage {
    fn open_for_write(&self, name: &str, max_size: usize) -> StorageResult<Box<dyn BlobWriter>> {
        let path = self.object_path(name)?;

        if stat(&path)?.is_some() {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }

        if let Some(quota) = self.quota {
            let available = quota.saturating_sub(self.used_bytes()?);
            if max_size as u64 > available {
                return Err(StorageError::InsufficientSpace {
                    requested: max_size as u64,
                    available,
                });
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| map_io(e, name))?;

        Ok(Box::new(FileWriter {
            file,
            name: name.to_string(),
            written: 0,
            max_size,
        }))
    }

    fn open_for_read(&self, name: &str) -> StorageResult<Box<dyn BlobReader>> {
        let path = self.object_path(name)?;
        if !is_file(&path)? {
            return Err(StorageError::NotFound(name.to_string()));
        }
        let file = File::open(&path).map_err(|e| map_io(e, name))?;
        Ok(Box::new(FileReader {
            file,
            name: name.to_string(),
        }))
    }

    fn remove(&self, name: &str) -> StorageResult<()> {
        let path = self.object_path(name)?;
        if !is_file(&path)? {
            return Err(StorageError::NotFound(name.to_string()));
        }
        fs::remove_file(&path).map_err(|e| map_io(e, name))
    }

    fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        let from_path = self.object_path(from)?;
        let to_path = self.object_path(to)?;

        if !is_file(&from_path)? {
            return Err(StorageError::NotFound(from.to_string()));
        }
        if stat(&to_path)?.is_some() {
            return Err(StorageError::AlreadyExists(to.to_string()));
        }
        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&from_path, &to_path).map_err(|e| map_io(e, from))
    }

    fn list_names(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        collect_names(&self.root, "", &mut names)?;
        names.sort();
        Ok(names)
    }

    fn exists(&self, name: &str) -> StorageResult<bool> {
        is_file(&self.object_path(name)?)
    }
}
