/*
    persistence.rs - Keystores surviving drop and reopen

    File-backed keystores, with and without at-rest encryption, and
    keystores built from configuration.
*/

use keystash_core::config::{Config, StorageBackend};
use keystash_core::keystore::{KeystoreError, KeystoreInstance};
use keystash_core::storage::{EncryptedStorage, FileStorage};
use keystash_core::test_utils::{assert_key_absent, assert_key_eq, key_pair};
use keystash_core::Keystore;
use secrecy::SecretString;
use tempfile::TempDir;

fn passphrase(s: &str) -> SecretString {
    SecretString::new(s.to_string())
}

#[test]
fn test_file_keystore_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let (private, public) = key_pair();

    {
        let keystore =
            KeystoreInstance::new("disk", FileStorage::new(temp_dir.path()).unwrap()).unwrap();
        keystore.store_key("PrvKey", &private).unwrap();
        keystore.store_key("PubKey", &public).unwrap();
    }

    let keystore =
        KeystoreInstance::new("disk", FileStorage::new(temp_dir.path()).unwrap()).unwrap();
    assert_key_eq(&keystore, "PrvKey", &private);
    assert_key_eq(&keystore, "PubKey", &public);
    assert!(matches!(
        keystore.store_key("PrvKey", &private),
        Err(KeystoreError::AlreadyExists(_))
    ));
}

#[test]
fn test_encrypted_keystore_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let (private, _) = key_pair();

    {
        let storage = EncryptedStorage::from_passphrase(
            FileStorage::new(temp_dir.path()).unwrap(),
            &passphrase("correct horse"),
        )
        .unwrap();
        let keystore = KeystoreInstance::new("vault", storage).unwrap();
        keystore.store_key("PrvKey", &private).unwrap();
    }

    // Nothing on disk holds the plaintext
    let raw = std::fs::read(temp_dir.path().join("vault").join("PrvKey")).unwrap();
    assert!(!raw.windows(32).any(|w| w == &private[..32]));

    let storage = EncryptedStorage::from_passphrase(
        FileStorage::new(temp_dir.path()).unwrap(),
        &passphrase("correct horse"),
    )
    .unwrap();
    let keystore = KeystoreInstance::new("vault", storage).unwrap();
    assert_key_eq(&keystore, "PrvKey", &private);
}

#[test]
fn test_wrong_passphrase_reads_as_corrupt() {
    let temp_dir = TempDir::new().unwrap();

    {
        let storage = EncryptedStorage::from_passphrase(
            FileStorage::new(temp_dir.path()).unwrap(),
            &passphrase("right"),
        )
        .unwrap();
        KeystoreInstance::new("vault", storage)
            .unwrap()
            .store_key("AESKey", &[1u8; 16])
            .unwrap();
    }

    let storage = EncryptedStorage::from_passphrase(
        FileStorage::new(temp_dir.path()).unwrap(),
        &passphrase("wrong"),
    )
    .unwrap();
    let keystore = KeystoreInstance::new("vault", storage).unwrap();
    assert!(matches!(
        keystore.load_key_vec("AESKey"),
        Err(KeystoreError::CorruptRecord(_))
    ));

    // Wipe does not need to decrypt
    keystore.wipe_keystore().unwrap();
    assert_key_absent(&keystore, "AESKey");
}

#[test]
fn test_quota_exhaustion() {
    let temp_dir = TempDir::new().unwrap();
    let keystore =
        KeystoreInstance::new("small", FileStorage::with_quota(temp_dir.path(), 100).unwrap())
            .unwrap();

    keystore.store_key("A", &[1u8; 40]).unwrap();
    assert!(matches!(
        keystore.store_key("B", &[2u8; 60]),
        Err(KeystoreError::InsufficientSpace(_))
    ));
    assert_key_absent(&keystore, "B");

    keystore.delete_key("A").unwrap();
    keystore.store_key("B", &[2u8; 60]).unwrap();
}

#[test]
fn test_keystore_from_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("keystash.toml");
    let root = temp_dir.path().join("store");

    let mut config = Config::default();
    config.keystore.instance_name = "configured".to_string();
    config.storage.backend = StorageBackend::File;
    config.storage.root_dir = root.clone();
    config.storage.encrypted = true;
    config.storage.passphrase_env = "KEYSTASH_PERSISTENCE_TEST_PASSPHRASE".to_string();
    config.save_to_file(&config_path).unwrap();

    std::env::set_var("KEYSTASH_PERSISTENCE_TEST_PASSPHRASE", "from the environment");

    let loaded = Config::from_file(&config_path).unwrap();
    {
        let keystore = KeystoreInstance::from_config(&loaded).unwrap();
        keystore.store_key("AESKey", &[9u8; 16]).unwrap();
    }

    let keystore = KeystoreInstance::from_config(&loaded).unwrap();
    assert_eq!(keystore.instance_name(), "configured");
    assert_key_eq(&keystore, "AESKey", &[9u8; 16]);
    assert!(root.join("configured").join("AESKey").is_file());
}
