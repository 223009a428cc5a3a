//! Encryption at rest for any storage backend
//!
//! Encrypted Object Format:
//! ```text
//! [Magic: 8 bytes "KSENC001"]
//! [Nonce: 12 bytes]
//! [Ciphertext + AEAD tag: variable]
//! ```
//!
//! The namespace of the object name (everything before the last `/`) is
//! authenticated as associated data, so an object copied under another
//! instance's namespace fails to decrypt. Renames must stay inside one
//! namespace.
//!
//! The key is either supplied directly or derived from a passphrase with
//! Argon2id. The derivation salt lives in the reserved object `.kdf-salt`
//! of the wrapped storage so a reopened storage derives the same key.

use super::{read_to_end, BlobReader, BlobWriter, Storage, StorageError, StorageResult};
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use argon2::{Argon2, Params};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Magic header for encrypted objects
const MAGIC_HEADER: &[u8; 8] = b"KSENC001";

/// Nonce length for AES-GCM (12 bytes = 96 bits)
const NONCE_LEN: usize = 12;

/// AEAD tag length
const TAG_LEN: usize = 16;

/// Bytes added to every object: magic(8) + nonce(12) + tag(16)
pub const ENCRYPTION_OVERHEAD: usize = MAGIC_HEADER.len() + NONCE_LEN + TAG_LEN;

/// Salt length for Argon2 KDF (16 bytes = 128 bits)
const SALT_LEN: usize = 16;

/// Reserved object holding the KDF salt
pub const SALT_OBJECT: &str = ".kdf-salt";

/// Reserved name the salt is written under before being renamed into place
const SALT_TEMP_OBJECT: &str = ".kdf-salt.tmp";

/// Largest ciphertext object read back
const MAX_OBJECT_LEN: usize = 1 << 24;

/// Storage decorator encrypting every object with AES-256-GCM
pub struct EncryptedStorage<S: Storage> {
    inner: S,
    cipher: Aes256Gcm,
}

impl<S: Storage> EncryptedStorage<S> {
    /// Wrap `inner` using a raw 256-bit key
    pub fn new(inner: S, key: &[u8; 32]) -> StorageResult<Self> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| StorageError::Other(format!("Invalid key: {}", e)))?;
        Ok(EncryptedStorage { inner, cipher })
    }

    /// Wrap `inner` using a key derived from a passphrase.
    ///
    /// The salt is created on first use and reused afterwards.
    pub fn from_passphrase(inner: S, passphrase: &SecretString) -> StorageResult<Self> {
        let salt = load_or_create_salt(&inner)?;
        let key = derive_key_from_password(passphrase.expose_secret(), &salt)?;
        Self::new(inner, &key)
    }

    /// The wrapped storage
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn decrypt(&self, name: &str, data: &[u8]) -> StorageResult<Zeroizing<Vec<u8>>> {
        if data.len() < ENCRYPTION_OVERHEAD {
            return Err(StorageError::Integrity("Truncated object".to_string()));
        }
        if &data[..MAGIC_HEADER.len()] != MAGIC_HEADER {
            return Err(StorageError::Integrity("Invalid magic header".to_string()));
        }

        let nonce_start = MAGIC_HEADER.len();
        let nonce = Nonce::from_slice(&data[nonce_start..nonce_start + NONCE_LEN]);
        let payload = Payload {
            msg: &data[nonce_start + NONCE_LEN..],
            aad: namespace(name).as_bytes(),
        };

        // AEAD tag mismatch = wrong key, wrong namespace or corrupted object
        self.cipher
            .decrypt(nonce, payload)
            .map(Zeroizing::new)
            .map_err(|_| StorageError::Integrity("Authentication failed".to_string()))
    }
}

fn reserved(name: &str) -> StorageResult<()> {
    if name == SALT_OBJECT || name == SALT_TEMP_OBJECT {
        return Err(StorageError::InvalidName(format!("{} is reserved", name)));
    }
    Ok(())
}

fn namespace(name: &str) -> &str {
    name.rsplit_once('/').map_or("", |(ns, _)| ns)
}

fn load_or_create_salt<S: Storage>(inner: &S) -> StorageResult<[u8; SALT_LEN]> {
    let bytes = match inner.open_for_read(SALT_OBJECT) {
        Ok(mut reader) => read_to_end(reader.as_mut(), SALT_LEN)?
            .ok_or_else(|| StorageError::Integrity("Salt object too large".to_string()))?,
        Err(StorageError::NotFound(_)) => return create_salt(inner),
        Err(e) => return Err(e),
    };

    if bytes.len() == SALT_LEN {
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes);
        return Ok(salt);
    }

    // A short salt with no objects next to it is a creation that never finished
    let has_objects = inner
        .list_names()?
        .iter()
        .any(|n| reserved(n).is_ok());
    if has_objects {
        return Err(StorageError::Integrity("Salt object truncated".to_string()));
    }

    warn!(len = bytes.len(), "replacing truncated key derivation salt");
    inner.remove(SALT_OBJECT)?;
    create_salt(inner)
}

fn create_salt<S: Storage>(inner: &S) -> StorageResult<[u8; SALT_LEN]> {
    debug!("creating key derivation salt");
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);

    if inner.atomic_create() {
        write_salt(inner, SALT_OBJECT, &salt)?;
        return Ok(salt);
    }

    match inner.remove(SALT_TEMP_OBJECT) {
        Ok(()) | Err(StorageError::NotFound(_)) => {}
        Err(e) => return Err(e),
    }

    let result = write_salt(inner, SALT_TEMP_OBJECT, &salt)
        .and_then(|()| inner.rename(SALT_TEMP_OBJECT, SALT_OBJECT));

    if let Err(e) = result {
        match inner.remove(SALT_TEMP_OBJECT) {
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(cleanup) => warn!(error = %cleanup, "Failed to remove temporary salt"),
        }
        return Err(e);
    }

    Ok(salt)
}

fn write_salt<S: Storage>(inner: &S, name: &str, salt: &[u8; SALT_LEN]) -> StorageResult<()> {
    let mut writer = inner.open_for_write(name, SALT_LEN)?;
    writer.write(salt)?;
    writer.commit()
}

/// Derive 256-bit encryption key from password using Argon2id
fn derive_key_from_password(password: &str, salt: &[u8]) -> StorageResult<Zeroizing<[u8; 32]>> {
    let params = Params::new(
        19 * 1024, // 19 MiB memory cost
        2,         // 2 iterations
        1,         // 1 lane
        Some(32),
    )
    .map_err(|e| StorageError::Other(format!("Invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|e| StorageError::Other(format!("Key derivation failed: {}", e)))?;

    Ok(key)
}

struct EncryptedWriter {
    inner: Box<dyn BlobWriter>,
    cipher: Aes256Gcm,
    namespace: String,
    buffer: Zeroizing<Vec<u8>>,
    max_size: usize,
}

impl BlobWriter for EncryptedWriter {
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

    fn commit(self: Box<Self>) -> StorageResult<()> {
        let EncryptedWriter {
            mut inner,
            cipher,
            namespace,
            buffer,
            ..
        } = *self;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: buffer.as_slice(),
                    aad: namespace.as_bytes(),
                },
            )
            .map_err(|e| StorageError::Other(format!("Encryption failed: {}", e)))?;

        inner.write(MAGIC_HEADER)?;
        inner.write(&nonce_bytes)?;
        inner.write(&ciphertext)?;
        inner.commit()
    }
}

struct PlainReader {
    data: Zeroizing<Vec<u8>>,
    pos: usize,
}

impl BlobReader for PlainReader {
    fn read(&mut self, buf: &mut [u8]) -> StorageResult<usize> {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl<S: Storage> Storage for EncryptedStorage<S> {
    fn open_for_write(&self, name: &str, max_size: usize) -> StorageResult<Box<dyn BlobWriter>> {
        reserved(name)?;
        let inner = self
            .inner
            .open_for_write(name, max_size + ENCRYPTION_OVERHEAD)?;
        Ok(Box::new(EncryptedWriter {
            inner,
            cipher: self.cipher.clone(),
            namespace: namespace(name).to_string(),
            buffer: Zeroizing::new(Vec::with_capacity(max_size)),
            max_size,
        }))
    }

    fn open_for_read(&self, name: &str) -> StorageResult<Box<dyn BlobReader>> {
        reserved(name)?;
        let mut reader = self.inner.open_for_read(name)?;
        let encrypted = read_to_end(reader.as_mut(), MAX_OBJECT_LEN)?
            .ok_or_else(|| StorageError::Integrity(format!("Object too large: {}", name)))?;
        let data = self.decrypt(name, &encrypted)?;
        Ok(Box::new(PlainReader { data, pos: 0 }))
    }

    fn remove(&self, name: &str) -> StorageResult<()> {
        reserved(name)?;
        self.inner.remove(name)
    }

    fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        reserved(from)?;
        reserved(to)?;
        if namespace(from) != namespace(to) {
            return Err(StorageError::InvalidName(format!(
                "{} cannot be renamed out of its namespace to {}",
                from, to
            )));
        }
        self.inner.rename(from, to)
    }

    fn list_names(&self) -> StorageResult<Vec<String>> {
        Ok(self
            .inner
            .list_names()?
            .into_iter()
            .filter(|n| reserved(n).is_ok())
            .collect())
    }

    fn exists(&self, name: &str) -> StorageResult<bool> {
        reserved(name)?;
        self.inner.exists(name)
    }

    fn atomic_create(&self) -> bool {
        self.inner.atomic_create()
    }
}
