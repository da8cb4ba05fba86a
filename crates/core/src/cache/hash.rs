//! Request-identity cache key generation.

use sha2::{Digest, Sha256};

/// Compute the cache key for a request.
///
/// The credential is hashed on its own before it enters the key, so the raw
/// token never lives in the store and keys stay fixed-length.
pub fn compute_cache_key(method: &str, url: &str, credential: Option<&[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    if let Some(credential) = credential {
        hasher.update(Sha256::digest(credential));
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_cache_key("GET", "https://esi.example.com/latest/status/", None);
        let hash2 = compute_cache_key("get", "https://esi.example.com/latest/status/", None);
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_different_method() {
        let get = compute_cache_key("GET", "https://esi.example.com/latest/status/", None);
        let head = compute_cache_key("HEAD", "https://esi.example.com/latest/status/", None);
        assert_ne!(get, head);
    }

    #[test]
    fn test_hash_different_credential() {
        let anon = compute_cache_key("GET", "https://esi.example.com/latest/status/", None);
        let a = compute_cache_key("GET", "https://esi.example.com/latest/status/", Some(b"Bearer a"));
        let b = compute_cache_key("GET", "https://esi.example.com/latest/status/", Some(b"Bearer b"));
        assert_ne!(anon, a);
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_cache_key("GET", "https://esi.example.com/latest/status/", Some(b"Bearer a"));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
