//! Identifier hashing shared by both platform builders

use sha2::{Digest, Sha256};

/// Normalize and hash a user identifier (email, phone, name, external id)
///
/// The value is trimmed and lower-cased first. A blank value yields `""`,
/// never the digest of the empty string.
pub fn hash_identifier(value: &str) -> String {
    let normalized = value.trim().to_lowercase();
    if normalized.is_empty() {
        return String::new();
    }
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// Hash, returning `None` for blank input
pub fn hash_optional(value: Option<&str>) -> Option<String> {
    value.map(hash_identifier).filter(|h| !h.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_never_hashed() {
        assert_eq!(hash_identifier(""), "");
        assert_eq!(hash_identifier("   \t"), "");
        assert_eq!(hash_optional(Some(" ")), None);
        assert_eq!(hash_optional(None), None);
    }

    #[test]
    fn test_case_and_whitespace_insensitive() {
        assert_eq!(hash_identifier("Foo@Bar.com"), hash_identifier("foo@bar.com"));
        assert_eq!(hash_identifier("  foo@bar.com\n"), hash_identifier("foo@bar.com"));
    }

    #[test]
    fn test_deterministic_sha256_hex() {
        let h = hash_identifier("foo@bar.com");
        assert_eq!(h, hash_identifier("foo@bar.com"));
        assert_eq!(h.len(), 64);
        assert!(h.bytes().all(|b| b.is_ascii_hexdigit()));
        // sha256("abc")
        assert_eq!(
            hash_identifier("ABC"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
