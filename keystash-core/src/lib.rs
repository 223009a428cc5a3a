//! keystash: a keystore for opaque key blobs over pluggable, optionally
//! encrypted storage.
//!
//! ```
//! use keystash_core::{Keystore, KeystoreInstance, MemoryStorage};
//!
//! let a = KeystoreInstance::new("a", MemoryStorage::new()).unwrap();
//! let b = KeystoreInstance::new("b", MemoryStorage::new()).unwrap();
//!
//! a.store_key("AESKey", &[0x42; 16]).unwrap();
//! a.move_key("AESKey", &b).unwrap();
//!
//! let mut out = [0u8; 16];
//! assert_eq!(b.load_key("AESKey", &mut out).unwrap(), 16);
//! ```

pub mod config;
pub mod keystore;
pub mod logging;
pub mod metrics;
pub mod storage;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{Config, ConfigError};
pub use keystore::{
    Keystore, KeystoreError, KeystoreInstance, KeystoreResult, KeystoreServer, RemoteKeystore,
    MAX_KEY_LEN, MAX_KEY_NAME_LEN,
};
pub use logging::{init_logging, LogLevel};
pub use storage::{EncryptedStorage, FileStorage, MemoryStorage, Storage, StorageError};
