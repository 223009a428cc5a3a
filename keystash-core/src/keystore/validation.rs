//! Name and size checks run before any storage I/O

use super::error::{KeystoreError, KeystoreResult};
use super::{MAX_INSTANCE_NAME_LEN, MAX_KEY_LEN, MAX_KEY_NAME_LEN};

/// Characters allowed in key and instance names besides ASCII alphanumerics
const NAME_PUNCTUATION: &[char] = &['-', '_', '.'];

fn validate_identifier(kind: &str, name: &str, max_len: usize) -> KeystoreResult<()> {
    if name.is_empty() {
        return Err(KeystoreError::InvalidParameter(format!("{} is empty", kind)));
    }

    if name.len() > max_len {
        return Err(KeystoreError::InvalidParameter(format!(
            "{} '{}' is {} bytes, at most {} allowed",
            kind,
            name,
            name.len(),
            max_len
        )));
    }

    if name.starts_with('.') {
        return Err(KeystoreError::InvalidParameter(format!(
            "{} must not start with '.'",
            kind
        )));
    }

    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || NAME_PUNCTUATION.contains(c)))
    {
        return Err(KeystoreError::InvalidParameter(format!(
            "{} contains invalid character {:?}",
            kind, c
        )));
    }

    Ok(())
}

/// Validate a key name.
///
/// Names are 1 to `MAX_KEY_NAME_LEN - 1` bytes of ASCII alphanumerics,
/// `-`, `_` and `.`, not starting with `.`. One slot of `MAX_KEY_NAME_LEN`
/// is kept for the terminator in the persisted name field.
pub fn validate_name(name: &str) -> KeystoreResult<()> {
    validate_identifier("key name", name, MAX_KEY_NAME_LEN - 1)
}

/// Validate a key length: 1 to `MAX_KEY_LEN` bytes
pub fn validate_size(len: usize) -> KeystoreResult<()> {
    if len == 0 {
        return Err(KeystoreError::InvalidParameter("key data is empty".to_string()));
    }
    if len > MAX_KEY_LEN {
        return Err(KeystoreError::InvalidParameter(format!(
            "key data is {} bytes, at most {} allowed",
            len, MAX_KEY_LEN
        )));
    }
    Ok(())
}

/// Validate a keystore instance name
pub fn validate_instance_name(name: &str) -> KeystoreResult<()> {
    validate_identifier("instance name", name, MAX_INSTANCE_NAME_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_length_boundary() {
        assert!(validate_name("A").is_ok());
        assert!(validate_name(&"k".repeat(15)).is_ok());
        assert!(matches!(
            validate_name(&"k".repeat(16)),
            Err(KeystoreError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_empty_name() {
        assert!(matches!(validate_name(""), Err(KeystoreError::InvalidParameter(_))));
    }

    #[test]
    fn test_filesystem_hostile_names() {
        for name in ["a/b", "..", ".hidden", "a\\b", "with space", "nul\0", "~tmp", "ä"] {
            assert!(
                matches!(validate_name(name), Err(KeystoreError::InvalidParameter(_))),
                "name {:?} should be rejected",
                name
            );
        }
        assert!(validate_name("Prv-Key_2.bin").is_ok());
    }

    #[test]
    fn test_size_boundary() {
        assert!(matches!(validate_size(0), Err(KeystoreError::InvalidParameter(_))));
        assert!(validate_size(1).is_ok());
        assert!(validate_size(2048).is_ok());
        assert!(matches!(validate_size(2049), Err(KeystoreError::InvalidParameter(_))));
    }

    #[test]
    fn test_instance_name() {
        assert!(validate_instance_name("partition-1").is_ok());
        assert!(validate_instance_name(&"i".repeat(32)).is_ok());
        assert!(validate_instance_name(&"i".repeat(33)).is_err());
        assert!(validate_instance_name("a/b").is_err());
        assert!(validate_instance_name("").is_err());
    }
}
