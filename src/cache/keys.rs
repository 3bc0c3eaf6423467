//! Cache key derivation.
//!
//! A snapshot is addressed by a digest of the request path with the query
//! string stripped, so `/foo?x=1` and `/foo?y=2` resolve to the same entry.

use sha2::{Digest, Sha256};

/// Number of digest bytes kept for the key (128 bits, 32 hex characters).
const KEY_BYTES: usize = 16;

/// Opaque, fixed-length identifier for a cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for a request path.
    ///
    /// The query component (`?` and everything after it) is stripped before
    /// hashing; the remainder is digested as-is.
    pub fn for_path(path: &str) -> Self {
        let normalized = normalize_path(path);
        let digest = Sha256::digest(normalized.as_bytes());
        Self(hex::encode(&digest[..KEY_BYTES]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip the query component from a request path or URL tail.
fn normalize_path(path: &str) -> &str {
    match path.split_once('?') {
        Some((before, _)) => before,
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_deterministic() {
        let a = CacheKey::for_path("/posts/hello");
        let b = CacheKey::for_path("/posts/hello");
        assert_eq!(a, b);
    }

    #[test]
    fn key_is_fixed_length_hex() {
        let key = CacheKey::for_path("/");
        assert_eq!(key.as_str().len(), 32);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn query_string_is_stripped() {
        let plain = CacheKey::for_path("/foo");
        assert_eq!(CacheKey::for_path("/foo?x=1"), plain);
        assert_eq!(CacheKey::for_path("/foo?y=2"), plain);
    }

    #[test]
    fn distinct_paths_produce_distinct_keys() {
        assert_ne!(CacheKey::for_path("/foo"), CacheKey::for_path("/bar"));
        assert_ne!(CacheKey::for_path("/foo"), CacheKey::for_path("/foo/"));
    }
}
