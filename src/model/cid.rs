//! Content identifiers and digests
//!
//! A `Cid` is an opaque identifier handed out by a content store. The in-repo
//! stores derive it as a CIDv1 (raw codec, sha2-256 multihash) rendered in
//! base16 multibase, so identical bytes always yield the same identifier.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Multibase prefix (base16 lower) + CIDv1 + raw codec + sha2-256 + 32-byte length
const CID_V1_RAW_SHA256_PREFIX: &str = "f01551220";

/// Compute SHA-256 of bytes and return the lowercase hex string
pub fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Content identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cid(String);

impl Cid {
    /// Wrap an identifier returned by a content store
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Derive the CIDv1 for a byte payload
    pub fn for_bytes(data: &[u8]) -> Self {
        Self(format!("{}{}", CID_V1_RAW_SHA256_PREFIX, compute_sha256(data)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The embedded sha2-256 digest, if this CID was derived by `for_bytes`
    pub fn embedded_digest(&self) -> Option<ContentDigest> {
        self.0
            .strip_prefix(CID_V1_RAW_SHA256_PREFIX)
            .filter(|hex| hex.len() == 64)
            .map(|hex| ContentDigest(hex.to_string()))
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Cid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Collision-resistant digest of a payload (hex SHA-256)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Digest a byte payload
    pub fn of(data: &[u8]) -> Self {
        Self(compute_sha256(data))
    }

    /// Parse a hex digest supplied by a caller
    pub fn from_hex(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        if value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit()) {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log lines and messages
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cid_is_deterministic() {
        let a = Cid::for_bytes(b"hello");
        let b = Cid::for_bytes(b"hello");
        assert_eq!(a, b);
        assert_ne!(a, Cid::for_bytes(b"hello!"));
    }

    #[test]
    fn test_cid_format() {
        let cid = Cid::for_bytes(b"hello");
        assert!(cid.as_str().starts_with("f01551220"));
        assert_eq!(cid.as_str().len(), 9 + 64);
        assert_eq!(
            cid.embedded_digest().unwrap(),
            ContentDigest::of(b"hello")
        );
    }

    #[test]
    fn test_embedded_digest_absent_for_foreign_cid() {
        let cid = Cid::new("bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi");
        assert!(cid.embedded_digest().is_none());
    }

    #[test]
    fn test_digest_known_value() {
        assert_eq!(
            ContentDigest::of(b"hello").as_str(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_digest_from_hex() {
        let upper = "2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824";
        assert_eq!(
            ContentDigest::from_hex(upper).unwrap(),
            ContentDigest::of(b"hello")
        );
        assert!(ContentDigest::from_hex("abc").is_none());
        assert!(ContentDigest::from_hex(&"z".repeat(64)).is_none());
    }

    #[test]
    fn test_cid_serializes_as_plain_string() {
        let cid = Cid::new("f0155");
        assert_eq!(serde_json::to_string(&cid).unwrap(), "\"f0155\"");
    }
}
