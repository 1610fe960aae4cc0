//! Entry key generation.

use sha2::{Digest, Sha256};

/// Compute the entry key for a request identity.
///
/// The method is uppercased so `get` and `GET` address the same entry.
pub fn compute_cache_key(method: &str, url: &str, vary: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hasher.update(b"\n");
    hasher.update(vary.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_cache_key("GET", "https://example.com/app.js", "");
        let hash2 = compute_cache_key("get", "https://example.com/app.js", "");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_different_method() {
        let get = compute_cache_key("GET", "https://example.com/", "");
        let head = compute_cache_key("HEAD", "https://example.com/", "");
        assert_ne!(get, head);
    }

    #[test]
    fn test_hash_different_vary() {
        let hash1 = compute_cache_key("GET", "https://example.com", "accept-encoding=gzip");
        let hash2 = compute_cache_key("GET", "https://example.com", "accept-encoding=br");
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_cache_key("GET", "https://example.com", "");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
