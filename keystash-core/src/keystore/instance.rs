//! In-process keystore bound to one storage handle
//!
//! Records are stored as `"{instance}/{key}"`. When the storage cannot
//! create objects atomically, a record is first written to
//! `"{instance}/~{key}"` and renamed into place once complete, so a reader
//! never sees a half-written record under the key's own name.

use super::error::{KeystoreError, KeystoreResult};
use super::record::{self, MAX_RECORD_LEN};
use super::transfer;
use super::validation::{validate_instance_name, validate_name, validate_size};
use super::Keystore;
use crate::config::{Config, StorageBackend};
use crate::metrics::{
    record_counter, record_failure, OperationCounters, OperationsSnapshot, Timer, DELETE_OPS,
    LOAD_OPS, STORE_OPS, WIPE_OPS,
};
use crate::storage::{
    read_to_end, EncryptedStorage, FileStorage, MemoryStorage, Storage, StorageError,
};
use tracing::{debug, error, info, warn};

/// Prefix marking an in-flight record write
const TEMP_PREFIX: char = '~';

/// Keystore instance over a storage collaborator
pub struct KeystoreInstance {
    name: String,
    storage: Box<dyn Storage>,
    counters: OperationCounters,
}

impl std::fmt::Debug for KeystoreInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeystoreInstance")
            .field("name", &self.name)
            .field("atomic_create", &self.storage.atomic_create())
            .finish()
    }
}

/// Map a storage error on `key` to a keystore error naming the key
fn key_error(err: StorageError, key: &str) -> KeystoreError {
    match err {
        StorageError::NotFound(_) => KeystoreError::NotFound(key.to_string()),
        StorageError::AlreadyExists(_) => KeystoreError::AlreadyExists(key.to_string()),
        other => other.into(),
    }
}

fn write_object(storage: &dyn Storage, object: &str, bytes: &[u8]) -> Result<(), StorageError> {
    let mut writer = storage.open_for_write(object, bytes.len())?;
    writer.write(bytes)?;
    writer.commit()
}

impl KeystoreInstance {
    /// Bind a keystore named `name` to `storage`
    pub fn new<S: Storage + 'static>(name: impl Into<String>, storage: S) -> KeystoreResult<Self> {
        let name = name.into();
        validate_instance_name(&name)?;
        debug!(instance = %name, atomic = storage.atomic_create(), "Opened keystore");
        Ok(KeystoreInstance {
            name,
            storage: Box::new(storage),
            counters: OperationCounters::new(),
        })
    }

    /// Build the storage stack described by `config` and bind a keystore to it
    pub fn from_config(config: &Config) -> KeystoreResult<Self> {
        config
            .validate()
            .map_err(|e| KeystoreError::InvalidParameter(e.to_string()))?;

        let storage: Box<dyn Storage> = match config.storage.backend {
            StorageBackend::Memory => match config.storage.capacity_bytes {
                Some(capacity) => Box::new(MemoryStorage::with_capacity(capacity)),
                None => Box::new(MemoryStorage::new()),
            },
            StorageBackend::File => {
                let root = &config.storage.root_dir;
                match config.storage.capacity_bytes {
                    Some(quota) => Box::new(FileStorage::with_quota(root, quota)?),
                    None => Box::new(FileStorage::new(root)?),
                }
            }
        };

        let storage: Box<dyn Storage> = if config.storage.encrypted {
            let passphrase = config
                .passphrase()
                .map_err(|e| KeystoreError::InvalidParameter(e.to_string()))?;
            Box::new(EncryptedStorage::from_passphrase(storage, &passphrase)?)
        } else {
            storage
        };

        info!(
            instance = %config.keystore.instance_name,
            backend = ?config.storage.backend,
            encrypted = config.storage.encrypted,
            "Keystore configured"
        );
        Self::new(config.keystore.instance_name.clone(), storage)
    }

    /// The storage this keystore writes to
    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// Operation counts since this instance was opened
    pub fn stats(&self) -> OperationsSnapshot {
        self.counters.snapshot()
    }

    fn object_name(&self, key: &str) -> String {
        format!("{}/{}", self.name, key)
    }

    fn temp_name(&self, key: &str) -> String {
        format!("{}/{}{}", self.name, TEMP_PREFIX, key)
    }

    fn prefix(&self) -> String {
        format!("{}/", self.name)
    }

    fn record_error(&self, operation: &'static str, key: &str, err: &KeystoreError) {
        self.counters.inc_failed();
        record_failure(operation, err.kind());
        match err {
            KeystoreError::NotFound(_) => {
                debug!(instance = %self.name, key, operation, "Key not found")
            }
            KeystoreError::InvalidParameter(_)
            | KeystoreError::AlreadyExists(_)
            | KeystoreError::BufferTooSmall { .. } => {
                warn!(instance = %self.name, key, operation, error = %err, "Keystore request rejected")
            }
            _ => error!(instance = %self.name, key, operation, error = %err, "Keystore operation failed"),
        }
    }

    /// Store a new key
    pub fn store(&self, name: &str, data: &[u8]) -> KeystoreResult<()> {
        let timer = Timer::new("store");
        let result = self.store_record(name, data);
        timer.stop();

        match &result {
            Ok(()) => {
                self.counters.inc_stored();
                record_counter(STORE_OPS, 1);
                debug!(instance = %self.name, key = name, len = data.len(), "Stored key");
            }
            Err(e) => self.record_error("store", name, e),
        }
        result
    }

    fn store_record(&self, name: &str, data: &[u8]) -> KeystoreResult<()> {
        validate_name(name)?;
        validate_size(data.len())?;

        let object = self.object_name(name);
        if self.storage.exists(&object)? {
            return Err(KeystoreError::AlreadyExists(name.to_string()));
        }

        let encoded = record::encode(name, data)?;

        if self.storage.atomic_create() {
            return write_object(self.storage.as_ref(), &object, &encoded)
                .map_err(|e| key_error(e, name));
        }

        let temp = self.temp_name(name);
        match self.storage.remove(&temp) {
            Ok(()) => debug!(instance = %self.name, key = name, "Removed stale temporary record"),
            Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let result = write_object(self.storage.as_ref(), &temp, &encoded)
            .and_then(|()| self.storage.rename(&temp, &object));

        if let Err(e) = result {
            match self.storage.remove(&temp) {
                Ok(()) | Err(StorageError::NotFound(_)) => {}
                Err(cleanup) => warn!(
                    instance = %self.name,
                    key = name,
                    error = %cleanup,
                    "Failed to remove temporary record"
                ),
            }
            return Err(key_error(e, name));
        }

        Ok(())
    }

    /// Load a key into `out`, returning its length
    pub fn load(&self, name: &str, out: &mut [u8]) -> KeystoreResult<usize> {
        let timer = Timer::new("load");
        let result = self.load_record(name, out);
        timer.stop();

        match &result {
            Ok(len) => {
                self.counters.inc_loaded();
                record_counter(LOAD_OPS, 1);
                debug!(instance = %self.name, key = name, len, "Loaded key");
            }
            Err(e) => self.record_error("load", name, e),
        }
        result
    }

    fn load_record(&self, name: &str, out: &mut [u8]) -> KeystoreResult<usize> {
        validate_name(name)?;

        let object = self.object_name(name);
        let mut reader = self
            .storage
            .open_for_read(&object)
            .map_err(|e| key_error(e, name))?;
        let bytes = read_to_end(reader.as_mut(), MAX_RECORD_LEN)?.ok_or_else(|| {
            KeystoreError::CorruptRecord(format!(
                "record for '{}' exceeds {} bytes",
                name, MAX_RECORD_LEN
            ))
        })?;

        let record = record::decode(&bytes)?;
        if record.name() != name {
            return Err(KeystoreError::CorruptRecord(format!(
                "object for '{}' holds record '{}'",
                name,
                record.name()
            )));
        }

        if record.len() > out.len() {
            return Err(KeystoreError::BufferTooSmall {
                required: record.len(),
                capacity: out.len(),
            });
        }

        out[..record.len()].copy_from_slice(record.data());
        Ok(record.len())
    }

    /// Delete a key
    pub fn delete(&self, name: &str) -> KeystoreResult<()> {
        let timer = Timer::new("delete");
        let result = validate_name(name).and_then(|()| {
            self.storage
                .remove(&self.object_name(name))
                .map_err(|e| key_error(e, name))
        });
        timer.stop();

        match &result {
            Ok(()) => {
                self.counters.inc_deleted();
                record_counter(DELETE_OPS, 1);
                debug!(instance = %self.name, key = name, "Deleted key");
            }
            Err(e) => self.record_error("delete", name, e),
        }
        result
    }

    /// Remove every object in this keystore's namespace.
    ///
    /// Removal continues past failures; the first failure is returned.
    /// Returns the number of objects removed.
    pub fn wipe(&self) -> KeystoreResult<usize> {
        let timer = Timer::new("wipe");
        let result = self.wipe_namespace();
        timer.stop();

        match &result {
            Ok(removed) => {
                self.counters.inc_wiped();
                record_counter(WIPE_OPS, 1);
                info!(instance = %self.name, removed, "Wiped keystore");
            }
            Err(e) => self.record_error("wipe", "*", e),
        }
        result
    }

    fn wipe_namespace(&self) -> KeystoreResult<usize> {
        let prefix = self.prefix();
        let mut removed = 0;
        let mut first_error = None;

        for object in self
            .storage
            .list_names()?
            .into_iter()
            .filter(|n| n.starts_with(&prefix))
        {
            match self.storage.remove(&object) {
                Ok(()) => removed += 1,
                Err(StorageError::NotFound(_)) => {}
                Err(e) => {
                    warn!(instance = %self.name, object = %object, error = %e, "Failed to remove object");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(removed),
        }
    }

    /// Whether a key is stored under `name`
    pub fn contains(&self, name: &str) -> KeystoreResult<bool> {
        validate_name(name)?;
        Ok(self.storage.exists(&self.object_name(name))?)
    }

    /// Names of all stored keys, sorted
    pub fn list_keys(&self) -> KeystoreResult<Vec<String>> {
        let prefix = self.prefix();
        let mut keys: Vec<String> = self
            .storage
            .list_names()?
            .into_iter()
            .filter_map(|n| n.strip_prefix(&prefix).map(str::to_string))
            .filter(|k| !k.starts_with(TEMP_PREFIX) && !k.contains('/'))
            .collect();
        keys.sort();
        Ok(keys)
    }
}

impl Keystore for KeystoreInstance {
    fn instance_name(&self) -> &str {
        &self.name
    }

    fn store_key(&self, name: &str, data: &[u8]) -> KeystoreResult<()> {
        self.store(name, data)
    }

    fn load_key(&self, name: &str, out: &mut [u8]) -> KeystoreResult<usize> {
        self.load(name, out)
    }

    fn delete_key(&self, name: &str) -> KeystoreResult<()> {
        self.delete(name)
    }

    fn wipe_keystore(&self) -> KeystoreResult<()> {
        self.wipe().map(|_| ())
    }

    fn copy_key(&self, name: &str, dst: &dyn Keystore) -> KeystoreResult<()> {
        transfer::copy_key(self, name, dst)
    }

    fn move_key(&self, name: &str, dst: &dyn Keystore) -> KeystoreResult<()> {
        transfer::move_key(self, name, dst)
    }
}
