//! Hashing primitives for Cairn.
//!
//! Everything in the anchoring pipeline is SHA-256 based:
//! - `sha-256` for aggregation and calendar trees
//! - `sha-256-x2` (double SHA-256) for Bitcoin transaction ids and block trees
//!
//! Bitcoin displays hashes in reversed byte order. [`Hash`] always stores the
//! internal order; use [`Hash::reversed`] / [`Hash::from_display_hex`] at the
//! boundary with Bitcoin tooling.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// A 32-byte hash value.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// The zero hash (used as a sentinel).
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a hash from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create a hash from a slice, which must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            Error::invalid_hash(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create from hex string (internal byte order).
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }

    /// Create from a Bitcoin display-order hex string (txids, block hashes).
    pub fn from_display_hex(s: &str) -> Result<Self> {
        Ok(Self::from_hex(s)?.reversed())
    }

    /// Convert to hex string (internal byte order).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Convert to Bitcoin display-order hex.
    pub fn to_display_hex(&self) -> String {
        self.reversed().to_hex()
    }

    /// The same hash with its bytes reversed.
    pub fn reversed(&self) -> Self {
        let mut bytes = self.0;
        bytes.reverse();
        Self(bytes)
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self == &Self::ZERO
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Single SHA-256 of arbitrary data.
pub fn sha256(data: &[u8]) -> Hash {
    Hash(Sha256::digest(data).into())
}

/// Double SHA-256, as used by Bitcoin.
pub fn sha256d(data: &[u8]) -> Hash {
    let first = Sha256::digest(data);
    Hash(Sha256::digest(first).into())
}

/// SHA-256 over the concatenation of several byte strings.
pub fn sha256_all<T: AsRef<[u8]>>(items: &[T]) -> Hash {
    let mut hasher = Sha256::new();
    for item in items {
        hasher.update(item.as_ref());
    }
    Hash(hasher.finalize().into())
}

/// Hash two child hashes into a Chainpoint parent: `sha256(left || right)`.
pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    sha256_all(&[left.as_bytes(), right.as_bytes()])
}

/// Hash two child hashes into a Bitcoin parent: `sha256d(left || right)`.
pub fn hash_pair_double(left: &Hash, right: &Hash) -> Hash {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_bytes());
    buf[32..].copy_from_slice(right.as_bytes());
    sha256d(&buf)
}

/// Serde helpers encoding a [`Hash`] as a hex string, for JSON payloads.
pub mod hex_hash {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Hash;

    /// Serialize as hex.
    pub fn serialize<S: Serializer>(hash: &Hash, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&hash.to_hex())
    }

    /// Deserialize from hex.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Hash, D::Error> {
        let s = String::deserialize(d)?;
        Hash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256d_is_double() {
        let once = sha256(b"cairn");
        assert_eq!(sha256d(b"cairn"), sha256(once.as_bytes()));
    }

    #[test]
    fn test_hash_hex_roundtrip() {
        let h = sha256(b"test");
        let restored = Hash::from_hex(&h.to_hex()).unwrap();
        assert_eq!(h, restored);
    }

    #[test]
    fn test_display_hex_is_reversed() {
        let h = sha256(b"tx");
        let display = h.to_display_hex();
        assert_ne!(display, h.to_hex());
        assert_eq!(Hash::from_display_hex(&display).unwrap(), h);
    }

    #[test]
    fn test_from_slice_rejects_wrong_length() {
        assert!(Hash::from_slice(&[0u8; 31]).is_err());
        assert!(Hash::from_hex("abcd").is_err());
    }

    #[test]
    fn test_hex_hash_serde() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Wrapper {
            #[serde(with = "hex_hash")]
            root: Hash,
        }

        let w = Wrapper { root: sha256(b"root") };
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, format!(r#"{{"root":"{}"}}"#, w.root.to_hex()));
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.root, w.root);
    }

    #[test]
    fn test_hash_pair_matches_concat() {
        let a = sha256(b"a");
        let b = sha256(b"b");
        let mut concat = a.as_bytes().to_vec();
        concat.extend_from_slice(b.as_bytes());
        assert_eq!(hash_pair(&a, &b), sha256(&concat));
        assert_eq!(hash_pair_double(&a, &b), sha256d(&concat));
        assert_ne!(hash_pair(&a, &b), hash_pair(&b, &a));
    }
}
