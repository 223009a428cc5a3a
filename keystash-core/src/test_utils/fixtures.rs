//! Key material and keystore fixtures

use super::deterministic_rng::deterministic_bytes_with_seed;
use crate::keystore::KeystoreInstance;
use crate::storage::MemoryStorage;

/// Length of the AES key fixture
pub const AES_KEY_LEN: usize = 16;

/// A fixed-seed AES-128 key blob
pub fn aes_key() -> Vec<u8> {
    deterministic_bytes_with_seed(AES_KEY_LEN, 1)
}

/// Private and public halves of a key-pair blob, of different lengths
pub fn key_pair() -> (Vec<u8>, Vec<u8>) {
    (
        deterministic_bytes_with_seed(1190, 2),
        deterministic_bytes_with_seed(294, 3),
    )
}

/// A key blob of `len` bytes, distinct per `seed`
pub fn key_blob(len: usize, seed: u64) -> Vec<u8> {
    deterministic_bytes_with_seed(len, seed)
}

/// A keystore over its own memory storage, with a handle to that storage
pub fn memory_keystore(name: &str) -> (KeystoreInstance, MemoryStorage) {
    let storage = MemoryStorage::new();
    let keystore = match KeystoreInstance::new(name, storage.clone()) {
        Ok(keystore) => keystore,
        Err(e) => panic!("Failed to open test keystore '{}': {}", name, e),
    };
    (keystore, storage)
}
