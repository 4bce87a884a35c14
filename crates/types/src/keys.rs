//! 33-byte compressed public keys.
//!
//! Producers are identified by their long-lived owner public key; the
//! rotatable node public key is carried in the same format. The engine never
//! verifies signatures - keys are opaque identifiers here.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io;
use std::str::FromStr;

/// Size of a compressed public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 33;

/// A 33-byte compressed public key.
///
/// Keys hash and compare by value so they can index the producer registry
/// directly. Display and serde formats are lowercase hex without prefix,
/// which is also the form used in log lines.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// Creates a key from a 33-byte array.
    #[inline]
    pub const fn new(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a key from a slice.
    ///
    /// Returns an error if the slice length is not exactly 33 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != PUBLIC_KEY_SIZE {
            return Err(Error::InvalidLength {
                expected: PUBLIC_KEY_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; PUBLIC_KEY_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Returns the key as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a key from lowercase or uppercase hex.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }

    /// Writes the key to the canonical codec.
    pub fn serialize<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.0)
    }

    /// Reads a key from the canonical codec.
    pub fn deserialize<R: io::Read>(r: &mut R) -> io::Result<Self> {
        let mut bytes = [0u8; PUBLIC_KEY_SIZE];
        r.read_exact(&mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for PublicKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<[u8; PUBLIC_KEY_SIZE]> for PublicKey {
    fn from(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let key = PublicKey::new([0x03; PUBLIC_KEY_SIZE]);
        let parsed = PublicKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn test_invalid_length() {
        assert!(PublicKey::from_slice(&[0u8; 32]).is_err());
        assert!(PublicKey::from_slice(&[0u8; 34]).is_err());
    }

    #[test]
    fn test_codec_roundtrip() {
        let key = PublicKey::new([0x02; PUBLIC_KEY_SIZE]);
        let mut buf = Vec::new();
        key.serialize(&mut buf).unwrap();
        assert_eq!(PublicKey::deserialize(&mut buf.as_slice()).unwrap(), key);
    }
}
