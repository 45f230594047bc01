pub mod hashing;
pub mod ip;

pub use hashing::{hash_identifier, hash_optional};
pub use ip::extract_client_ip;

/// Opaque identifier for clicks, conversions and cost entries (32 hex chars)
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_id_is_unique_hex() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
    }
}
