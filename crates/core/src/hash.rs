//! Content hash type.
//!
//! Blobs are content-addressed by the hex-encoded MD5 of the complete file
//! bytes. The 32-character lowercase hex string is the primary key in the
//! metadata store and the object name in the blob store, so the type is
//! validated once at the boundary and treated as opaque afterwards.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a hex-encoded MD5 digest.
pub const CONTENT_HASH_LEN: usize = 32;

/// A validated content hash (32 lowercase hex characters).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Parse a content hash from a string, normalizing to lowercase.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.len() != CONTENT_HASH_LEN {
            return Err(crate::Error::InvalidHash(format!(
                "expected {} hex characters, got {}",
                CONTENT_HASH_LEN,
                s.len()
            )));
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(crate::Error::InvalidHash(format!(
                "contains non-hex characters: {s}"
            )));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Compute the content hash of a byte slice.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Md5::new();
        hasher.update(data);
        Self(hex::encode(hasher.finalize()))
    }

    /// Get the hash as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContentHash {
    type Error = crate::Error;

    fn try_from(s: String) -> crate::Result<Self> {
        Self::parse(&s)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Incremental hasher for streaming content.
#[derive(Default)]
pub struct ContentHasher {
    inner: Md5,
}

impl ContentHasher {
    /// Create a new hasher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalize and return the content hash.
    pub fn finalize(self) -> ContentHash {
        ContentHash(hex::encode(self.inner.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let hash = ContentHash::parse("d41d8cd98f00b204e9800998ecf8427e").unwrap();
        assert_eq!(hash.as_str(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_parse_normalizes_case() {
        let hash = ContentHash::parse("D41D8CD98F00B204E9800998ECF8427E").unwrap();
        assert_eq!(hash.as_str(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_parse_rejects_bad_length() {
        assert!(ContentHash::parse("abc").is_err());
        assert!(ContentHash::parse(&"a".repeat(33)).is_err());
    }

    #[test]
    fn test_parse_rejects_non_hex() {
        assert!(ContentHash::parse("g41d8cd98f00b204e9800998ecf8427e").is_err());
    }

    #[test]
    fn test_compute_empty() {
        // MD5 of the empty string.
        let hash = ContentHash::compute(b"");
        assert_eq!(hash.as_str(), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_streaming_matches_oneshot() {
        let data = b"hello chunked world";
        let mut hasher = ContentHasher::new();
        hasher.update(&data[..5]);
        hasher.update(&data[5..]);
        assert_eq!(hasher.finalize(), ContentHash::compute(data));
    }

    #[test]
    fn test_serde_roundtrip() {
        let hash = ContentHash::compute(b"x");
        let json = serde_json::to_string(&hash).unwrap();
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(hash, back);
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let result: Result<ContentHash, _> = serde_json::from_str("\"not-a-hash\"");
        assert!(result.is_err());
    }
}
