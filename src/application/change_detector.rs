//! Content hashing for change detection.
//!
//! The hash is a 32-bit rolling hash over UTF-16 code units
//! (`hash = hash * 31 + unit` with wrapping arithmetic), rendered as the
//! decimal string of the signed 32-bit value. Existing backups recorded
//! hashes in this form, so the scheme is part of the persisted format.

use std::sync::Arc;

use crate::domain::Result;
use crate::infrastructure::memo_store::{MemoStore, WATCHED_KEY};

/// Hash a string's content. Equal content always yields an equal hash.
#[must_use]
pub fn content_hash(value: &str) -> String {
    let mut hash: i32 = 0;
    for unit in value.encode_utf16() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit));
    }
    hash.to_string()
}

/// Hash of the watched memo data as currently persisted.
///
/// A missing watched key hashes the same as an empty memo map, so deleting
/// the key and writing `{}` are indistinguishable to the sync gate.
pub fn current_hash(store: &Arc<MemoStore>) -> Result<String> {
    let raw = store.get(WATCHED_KEY)?.unwrap_or_else(|| "{}".into());
    Ok(content_hash(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_string_hashes_to_zero() {
        assert_eq!(content_hash(""), "0");
    }

    #[test]
    fn test_equal_content_equal_hash() {
        let a = content_hash("{\"2025-08-25\":[\"dentist\"]}");
        let b = content_hash("{\"2025-08-25\":[\"dentist\"]}");
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_content_different_hash() {
        assert_ne!(content_hash("{}"), content_hash("{\"a\":[]}"));
    }

    #[test]
    fn test_known_vectors() {
        // Values produced by the widely used 31-multiplier string hash
        assert_eq!(content_hash("a"), "97");
        assert_eq!(content_hash("ab"), "3105");
        assert_eq!(content_hash("{}"), "3938");
    }

    #[test]
    fn test_wraps_as_signed_32_bit() {
        // Long inputs overflow i32; the result must stay in i32 range
        let long = "x".repeat(10_000);
        let hash: i64 = content_hash(&long).parse().unwrap();
        assert!(hash >= i64::from(i32::MIN) && hash <= i64::from(i32::MAX));
    }

    #[test]
    fn test_non_ascii_uses_utf16_units() {
        // A surrogate pair contributes two units, not one scalar
        assert_ne!(content_hash("𝄞"), content_hash("a"));
        assert_eq!(content_hash("é"), content_hash("é"));
    }

    #[test]
    fn test_missing_key_hashes_like_empty_map() {
        let store = Arc::new(MemoStore::open_in_memory().unwrap());
        assert_eq!(current_hash(&store).unwrap(), content_hash("{}"));

        store.set(WATCHED_KEY, "{}").unwrap();
        assert_eq!(current_hash(&store).unwrap(), content_hash("{}"));
    }
}
