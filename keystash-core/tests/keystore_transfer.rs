/*
    keystore_transfer.rs - Copy and move between keystores

    Covers transfers between instances on separate storage, on one shared
    storage, and across a served keystore.
*/

use keystash_core::keystore::{transfer, KeystoreError, KeystoreInstance, KeystoreServer};
use keystash_core::storage::{FileStorage, MemoryStorage, Storage};
use keystash_core::test_utils::{
    aes_key, assert_key_absent, assert_key_eq, memory_keystore, FaultyStorage,
};
use keystash_core::Keystore;
use std::sync::Arc;
use tempfile::TempDir;

/// Copy leaves the key in both keystores
#[test]
fn test_copy_aes_key() {
    let (a, _) = memory_keystore("src");
    let (b, _) = memory_keystore("dst");
    let key = aes_key();

    a.store_key("AESKey", &key).unwrap();
    a.copy_key("AESKey", &b).unwrap();

    assert_key_eq(&a, "AESKey", &key);
    assert_key_eq(&b, "AESKey", &key);
}

/// Move leaves the key only in the destination
#[test]
fn test_move_key() {
    let (a, _) = memory_keystore("src");
    let (b, _) = memory_keystore("dst");

    a.store_key("KeyMov", b"to be moved").unwrap();
    a.move_key("KeyMov", &b).unwrap();

    assert_key_eq(&b, "KeyMov", b"to be moved");
    assert_key_absent(&a, "KeyMov");
}

#[test]
fn test_transfer_missing_key() {
    let (a, _) = memory_keystore("src");
    let (b, _) = memory_keystore("dst");

    assert!(matches!(a.copy_key("KeyCpy", &b), Err(KeystoreError::NotFound(_))));
    assert!(matches!(a.move_key("KeyMov", &b), Err(KeystoreError::NotFound(_))));
    assert!(b.list_keys().unwrap().is_empty());
}

#[test]
fn test_transfer_invalid_name() {
    let (a, _) = memory_keystore("src");
    let (b, _) = memory_keystore("dst");

    assert!(matches!(a.copy_key("", &b), Err(KeystoreError::InvalidParameter(_))));
    assert!(matches!(
        a.move_key(&"x".repeat(16), &b),
        Err(KeystoreError::InvalidParameter(_))
    ));
}

/// A collision in the destination leaves both sides untouched
#[test]
fn test_move_into_occupied_destination() {
    let (a, _) = memory_keystore("src");
    let (b, _) = memory_keystore("dst");

    a.store_key("KeyMov", b"source copy").unwrap();
    b.store_key("KeyMov", b"existing").unwrap();

    assert!(matches!(a.move_key("KeyMov", &b), Err(KeystoreError::AlreadyExists(_))));
    assert_key_eq(&a, "KeyMov", b"source copy");
    assert_key_eq(&b, "KeyMov", b"existing");
}

/// A full destination aborts the move before the source is touched
#[test]
fn test_move_into_full_destination() {
    let (a, _) = memory_keystore("src");
    let b = KeystoreInstance::new("dst", MemoryStorage::with_capacity(8)).unwrap();

    a.store_key("KeyMov", &aes_key()).unwrap();
    assert!(matches!(
        a.move_key("KeyMov", &b),
        Err(KeystoreError::InsufficientSpace(_))
    ));
    assert_key_eq(&a, "KeyMov", &aes_key());
}

/// Source delete failing after the destination write is reported, not undone
#[test]
fn test_partial_move() {
    let temp_dir = TempDir::new().unwrap();
    let faulty = FaultyStorage::new(FileStorage::new(temp_dir.path()).unwrap());
    let a = KeystoreInstance::new("src", faulty.clone()).unwrap();
    let (b, _) = memory_keystore("dst");

    a.store_key("KeyMov", b"duplicated").unwrap();
    faulty.fail_removes(true);

    let err = a.move_key("KeyMov", &b).unwrap_err();
    assert!(matches!(err, KeystoreError::PartialMove { ref name, .. } if name == "KeyMov"));

    assert_key_eq(&a, "KeyMov", b"duplicated");
    assert_key_eq(&b, "KeyMov", b"duplicated");

    // Manual cleanup once the fault clears
    faulty.clear_faults();
    a.delete_key("KeyMov").unwrap();
    assert_key_absent(&a, "KeyMov");
}

/// Two keystores sharing one storage root stay separate
#[test]
fn test_instances_share_storage_root() {
    let temp_dir = TempDir::new().unwrap();
    let storage = Arc::new(FileStorage::new(temp_dir.path()).unwrap());
    let a = KeystoreInstance::new("alpha", Arc::clone(&storage)).unwrap();
    let b = KeystoreInstance::new("beta", Arc::clone(&storage)).unwrap();

    a.store_key("AESKey", b"alpha key").unwrap();
    b.store_key("AESKey", b"beta key").unwrap();
    a.copy_key("AESKey", &b).unwrap_err();

    a.store_key("KeyMov", b"crossing").unwrap();
    transfer::move_key(&a, "KeyMov", &b).unwrap();

    assert_eq!(
        storage.list_names().unwrap(),
        vec![
            "alpha/AESKey".to_string(),
            "beta/AESKey".to_string(),
            "beta/KeyMov".to_string(),
        ]
    );
}

/// Local and served keystores mix freely
#[test]
fn test_transfer_through_server() {
    let (local, _) = memory_keystore("local");
    let (served, _) = memory_keystore("served");
    let server = KeystoreServer::spawn(served).unwrap();
    let remote = server.client();

    local.store_key("AESKey", &aes_key()).unwrap();
    local.copy_key("AESKey", &remote).unwrap();
    assert_key_eq(&remote, "AESKey", &aes_key());

    remote.move_key("AESKey", &local).unwrap_err();
    local.delete_key("AESKey").unwrap();
    remote.move_key("AESKey", &local).unwrap();

    assert_key_eq(&local, "AESKey", &aes_key());
    assert_key_absent(&remote, "AESKey");
}
