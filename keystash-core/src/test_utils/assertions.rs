//! Assertions over keystore results

use crate::keystore::{Keystore, KeystoreError};
use std::fmt::Debug;

/// Assert that a Result is Ok and return the value
pub fn assert_ok<T, E: Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that `name` loads from `keystore` as exactly `expected`
pub fn assert_key_eq(keystore: &dyn Keystore, name: &str, expected: &[u8]) {
    match keystore.load_key_vec(name) {
        Ok(data) => assert_eq!(
            data.as_slice(),
            expected,
            "Key '{}' in '{}' differs",
            name,
            keystore.instance_name()
        ),
        Err(e) => panic!(
            "Expected key '{}' in '{}', got {:?}",
            name,
            keystore.instance_name(),
            e
        ),
    }
}

/// Assert that `name` is absent from `keystore`
pub fn assert_key_absent(keystore: &dyn Keystore, name: &str) {
    match keystore.load_key_vec(name) {
        Err(KeystoreError::NotFound(_)) => {}
        other => panic!(
            "Expected '{}' to be absent from '{}', got {:?}",
            name,
            keystore.instance_name(),
            other.map(|d| d.len())
        ),
    }
}

/// Assert that a result is an `InvalidParameter` error
pub fn assert_invalid<T: Debug>(result: Result<T, KeystoreError>) {
    match result {
        Err(KeystoreError::InvalidParameter(_)) => {}
        other => panic!("Expected InvalidParameter, got {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::memory_keystore;

    #[test]
    fn test_key_assertions() {
        let (keystore, _) = memory_keystore("asserts");
        keystore.store("K", b"v").unwrap();

        assert_key_eq(&keystore, "K", b"v");
        assert_key_absent(&keystore, "Missing");
        assert_invalid(keystore.store("", b"v"));
        assert_eq!(assert_ok::<_, KeystoreError>(Ok(3)), 3);
    }

    #[test]
    #[should_panic(expected = "absent")]
    fn test_absent_assertion_fails_on_present_key() {
        let (keystore, _) = memory_keystore("asserts");
        keystore.store("K", b"v").unwrap();
        assert_key_absent(&keystore, "K");
    }
}
