//! Keystore module
//!
//! Named, create-only storage of opaque key blobs on top of a [`Storage`]
//! collaborator. Each [`KeystoreInstance`] owns one storage handle and keeps
//! its records under its own instance-name prefix. Keys move between
//! keystores through [`transfer::copy_key`] and [`transfer::move_key`],
//! which work across in-process and remote keystores alike.
//!
//! [`Storage`]: crate::storage::Storage

pub mod error;
pub mod instance;
pub mod record;
pub mod remote;
pub mod transfer;
pub mod validation;

pub use error::{KeystoreError, KeystoreResult};
pub use instance::KeystoreInstance;
pub use record::KeyRecord;
pub use remote::{KeystoreServer, RemoteKeystore};
pub use transfer::MoveState;

use zeroize::Zeroizing;

/// Width of the persisted name field, terminator included
pub const MAX_KEY_NAME_LEN: usize = 16;

/// Largest key blob accepted by `store_key`
pub const MAX_KEY_LEN: usize = 2048;

/// Width of the persisted size field
pub const KEY_INT_PROPERTY_LEN: usize = 4;

/// Longest instance name
pub const MAX_INSTANCE_NAME_LEN: usize = 32;

/// Abstract keystore trait
///
/// Implemented by the in-process [`KeystoreInstance`] and by the
/// [`RemoteKeystore`] client. Every failure is reported through
/// [`KeystoreError`]; no operation panics on bad input.
pub trait Keystore: Send + Sync {
    /// Name of the namespace this keystore manages
    fn instance_name(&self) -> &str;

    /// Store a new key. Fails with `AlreadyExists` if the name is taken.
    fn store_key(&self, name: &str, data: &[u8]) -> KeystoreResult<()>;

    /// Load a key into `out`, returning its length.
    ///
    /// Fails with `BufferTooSmall` and leaves `out` untouched when the
    /// stored key does not fit.
    fn load_key(&self, name: &str, out: &mut [u8]) -> KeystoreResult<usize>;

    /// Delete a key
    fn delete_key(&self, name: &str) -> KeystoreResult<()>;

    /// Remove every key in this keystore
    fn wipe_keystore(&self) -> KeystoreResult<()>;

    /// Copy a key into `dst` under the same name
    fn copy_key(&self, name: &str, dst: &dyn Keystore) -> KeystoreResult<()>;

    /// Move a key into `dst` under the same name
    fn move_key(&self, name: &str, dst: &dyn Keystore) -> KeystoreResult<()>;

    /// Load a key into a freshly allocated buffer
    fn load_key_vec(&self, name: &str) -> KeystoreResult<Zeroizing<Vec<u8>>> {
        let mut buf = Zeroizing::new(vec![0u8; MAX_KEY_LEN]);
        let len = self.load_key(name, &mut buf)?;
        buf.truncate(len);
        Ok(buf)
    }
}

impl<K: Keystore + ?Sized> Keystore for std::sync::Arc<K> {
    fn instance_name(&self) -> &str {
        (**self).instance_name()
    }

    fn store_key(&self, name: &str, data: &[u8]) -> KeystoreResult<()> {
        (**self).store_key(name, data)
    }

    fn load_key(&self, name: &str, out: &mut [u8]) -> KeystoreResult<usize> {
        (**self).load_key(name, out)
    }

    fn delete_key(&self, name: &str) -> KeystoreResult<()> {
        (**self).delete_key(name)
    }

    fn wipe_keystore(&self) -> KeystoreResult<()> {
        (**self).wipe_keystore()
    }

    fn copy_key(&self, name: &str, dst: &dyn Keystore) -> KeystoreResult<()> {
        (**self).copy_key(name, dst)
    }

    fn move_key(&self, name: &str, dst: &dyn Keystore) -> KeystoreResult<()> {
        (**self).move_key(name, dst)
    }
}

impl<K: Keystore + ?Sized> Keystore for Box<K> {
    fn instance_name(&self) -> &str {
        (**self).instance_name()
    }

    fn store_key(&self, name: &str, data: &[u8]) -> KeystoreResult<()> {
        (**self).store_key(name, data)
    }

    fn load_key(&self, name: &str, out: &mut [u8]) -> KeystoreResult<usize> {
        (**self).load_key(name, out)
    }

    fn delete_key(&self, name: &str) -> KeystoreResult<()> {
        (**self).delete_key(name)
    }

    fn wipe_keystore(&self) -> KeystoreResult<()> {
        (**self).wipe_keystore()
    }

    fn copy_key(&self, name: &str, dst: &dyn Keystore) -> KeystoreResult<()> {
        (**self).copy_key(name, dst)
    }

    fn move_key(&self, name: &str, dst: &dyn Keystore) -> KeystoreResult<()> {
        (**self).move_key(name, dst)
    }
}
