//! Content fingerprints.
//!
//! Uses BLAKE3 for all hashing operations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A BLAKE3 fingerprint (256 bits / 32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// The number of bytes in a fingerprint
    pub const LEN: usize = 32;

    /// Compute the fingerprint of data
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Compute the fingerprint of several parts, length-prefixed so that
    /// part boundaries are unambiguous
    #[must_use]
    pub fn compute_parts<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// Get as bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    ///
    /// # Errors
    ///
    /// Returns a message if hex is invalid or not 32 bytes
    pub fn from_hex(hex: &str) -> Result<Self, String> {
        let bytes = hex::decode(hex).map_err(|e| format!("invalid hex: {e}"))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| format!("invalid fingerprint length: {}", b.len()))?;
        Ok(Self(arr))
    }

    /// Short form for logs
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.to_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_deterministic() {
        assert_eq!(Fingerprint::compute(b"abc"), Fingerprint::compute(b"abc"));
        assert_ne!(Fingerprint::compute(b"abc"), Fingerprint::compute(b"abd"));
    }

    #[test]
    fn test_parts_boundaries() {
        let a = Fingerprint::compute_parts([b"ab".as_slice(), b"c".as_slice()]);
        let b = Fingerprint::compute_parts([b"a".as_slice(), b"bc".as_slice()]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_hex_roundtrip() {
        let fp = Fingerprint::compute(b"flint");
        assert_eq!(Fingerprint::from_hex(&fp.to_hex()), Ok(fp));
        assert!(Fingerprint::from_hex("abcd").is_err());
        assert_eq!(fp.short().len(), 12);
    }
}
