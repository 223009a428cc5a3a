/*
    record.rs - Persisted key record layout

    Record Format (little-endian, versionless):
    [Name: 16 bytes, UTF-8, NUL-terminated and NUL-padded]
    [Size: 4 bytes, u32 LE]
    [Data: Size bytes]
*/

use super::error::{KeystoreError, KeystoreResult};
use super::{KEY_INT_PROPERTY_LEN, MAX_KEY_LEN, MAX_KEY_NAME_LEN};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Width of the name field
pub const NAME_FIELD_LEN: usize = MAX_KEY_NAME_LEN;

/// Header size: name(16) + size(4) = 20 bytes
pub const RECORD_HEADER_LEN: usize = NAME_FIELD_LEN + KEY_INT_PROPERTY_LEN;

/// Largest record a valid key can produce
pub const MAX_RECORD_LEN: usize = RECORD_HEADER_LEN + MAX_KEY_LEN;

/// A named key blob as persisted by the keystore.
///
/// The data is opaque. It is wiped from memory when the record is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyRecord {
    name: String,
    data: Vec<u8>,
}

impl KeyRecord {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        KeyRecord {
            name: name.into(),
            data: data.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Serialize this record
    pub fn encode(&self) -> KeystoreResult<Zeroizing<Vec<u8>>> {
        encode(&self.name, &self.data)
    }
}

impl fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRecord")
            .field("name", &self.name)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Serialize a record.
///
/// Only fails when the layout cannot represent the input: a name that does
/// not fit the name field with its terminator, a name containing NUL, or
/// data longer than the size field can express.
pub fn encode(name: &str, data: &[u8]) -> KeystoreResult<Zeroizing<Vec<u8>>> {
    if name.len() >= NAME_FIELD_LEN || name.as_bytes().contains(&0) {
        return Err(KeystoreError::InvalidParameter(format!(
            "name '{}' does not fit the record name field",
            name.escape_debug()
        )));
    }
    let size = u32::try_from(data.len()).map_err(|_| {
        KeystoreError::InvalidParameter(format!("{} bytes exceed the size field", data.len()))
    })?;

    let mut out = Zeroizing::new(Vec::with_capacity(RECORD_HEADER_LEN + data.len()));
    let mut name_field = [0u8; NAME_FIELD_LEN];
    name_field[..name.len()].copy_from_slice(name.as_bytes());

    out.extend_from_slice(&name_field);
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(data);
    Ok(out)
}

/// Parse a record, rejecting any inconsistency as `CorruptRecord`
pub fn decode(bytes: &[u8]) -> KeystoreResult<KeyRecord> {
    if bytes.len() < RECORD_HEADER_LEN {
        return Err(KeystoreError::CorruptRecord(format!(
            "record is {} bytes, header needs {}",
            bytes.len(),
            RECORD_HEADER_LEN
        )));
    }

    let name_field = &bytes[..NAME_FIELD_LEN];
    let name_len = name_field
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| KeystoreError::CorruptRecord("name field is not terminated".to_string()))?;
    if name_len == 0 {
        return Err(KeystoreError::CorruptRecord("name field is empty".to_string()));
    }
    if name_field[name_len..].iter().any(|&b| b != 0) {
        return Err(KeystoreError::CorruptRecord("name padding is not zeroed".to_string()));
    }
    let name = std::str::from_utf8(&name_field[..name_len])
        .map_err(|_| KeystoreError::CorruptRecord("name field is not UTF-8".to_string()))?;

    let mut size_field = [0u8; KEY_INT_PROPERTY_LEN];
    size_field.copy_from_slice(&bytes[NAME_FIELD_LEN..RECORD_HEADER_LEN]);
    let size = u32::from_le_bytes(size_field) as usize;

    if size > MAX_KEY_LEN {
        return Err(KeystoreError::CorruptRecord(format!(
            "size field {} exceeds {}",
            size, MAX_KEY_LEN
        )));
    }

    let available = bytes.len() - RECORD_HEADER_LEN;
    if size != available {
        return Err(KeystoreError::CorruptRecord(format!(
            "size field says {} bytes, {} present",
            size, available
        )));
    }

    Ok(KeyRecord::new(name, &bytes[RECORD_HEADER_LEN..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_layout() {
        let encoded = encode("AESKey", &[0xAA; 3]).unwrap();
        assert_eq!(encoded.len(), RECORD_HEADER_LEN + 3);
        assert_eq!(&encoded[..6], b"AESKey");
        assert!(encoded[6..16].iter().all(|&b| b == 0));
        assert_eq!(&encoded[16..20], &[3, 0, 0, 0]);
        assert_eq!(&encoded[20..], &[0xAA; 3]);
    }

    #[test]
    fn test_max_record() {
        let encoded = encode(&"n".repeat(15), &[1u8; MAX_KEY_LEN]).unwrap();
        assert_eq!(encoded.len(), MAX_RECORD_LEN);
        let record = decode(&encoded).unwrap();
        assert_eq!(record.len(), MAX_KEY_LEN);
    }

    #[test]
    fn test_encode_rejects_unrepresentable_name() {
        assert!(encode(&"n".repeat(16), b"x").is_err());
        assert!(encode("a\0b", b"x").is_err());
    }

    #[test]
    fn test_truncated_record() {
        let encoded = encode("Key", b"0123456789").unwrap();
        for cut in [0, 5, RECORD_HEADER_LEN - 1, RECORD_HEADER_LEN, encoded.len() - 1] {
            assert!(
                matches!(decode(&encoded[..cut]), Err(KeystoreError::CorruptRecord(_))),
                "cut at {} should be corrupt",
                cut
            );
        }
    }

    #[test]
    fn test_trailing_bytes_are_corrupt() {
        let mut encoded = encode("Key", b"abc").unwrap().to_vec();
        encoded.push(0);
        assert!(matches!(decode(&encoded), Err(KeystoreError::CorruptRecord(_))));
    }

    #[test]
    fn test_tampered_size_field() {
        let mut encoded = encode("Key", b"abc").unwrap().to_vec();
        encoded[16] = 4;
        assert!(matches!(decode(&encoded), Err(KeystoreError::CorruptRecord(_))));

        encoded[16..20].copy_from_slice(&u32::MAX.to_le_bytes());
        match decode(&encoded) {
            Err(KeystoreError::CorruptRecord(msg)) => assert!(msg.contains("exceeds")),
            other => panic!("Expected CorruptRecord, got {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_name() {
        let mut encoded = encode("Key", b"abc").unwrap().to_vec();
        encoded[..16].copy_from_slice(&[b'x'; 16]);
        assert!(matches!(decode(&encoded), Err(KeystoreError::CorruptRecord(_))));
    }

    #[test]
    fn test_dirty_name_padding() {
        let mut encoded = encode("Key", b"abc").unwrap().to_vec();
        encoded[10] = b'z';
        assert!(matches!(decode(&encoded), Err(KeystoreError::CorruptRecord(_))));
    }

    #[test]
    fn test_debug_hides_key_material() {
        let record = KeyRecord::new("PrvKey", vec![0x42; 8]);
        let shown = format!("{:?}", record);
        assert!(shown.contains("PrvKey"));
        assert!(shown.contains("len: 8"));
        assert!(!shown.contains("66"));
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(
            name in "[A-Za-z0-9_-][A-Za-z0-9._-]{0,14}",
            data in prop::collection::vec(any::<u8>(), 1..=MAX_KEY_LEN),
        ) {
            let encoded = encode(&name, &data).unwrap();
            let record = decode(&encoded).unwrap();
            prop_assert_eq!(record.name(), name.as_str());
            prop_assert_eq!(record.data(), data.as_slice());
        }
    }
}
