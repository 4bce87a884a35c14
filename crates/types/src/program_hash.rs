//! Prefixed 21-byte script hashes.
//!
//! A [`ProgramHash`] identifies the destination of a transaction output: one
//! prefix byte describing the script class followed by a 20-byte digest of
//! the locking code. The prefix is what lets the state engine recognize
//! deposit outputs and stake identities without executing scripts.

use crate::keys::PublicKey;
use crate::{Error, Result, H256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io;
use std::str::FromStr;

/// Size of a program hash in bytes (1 prefix byte + 20 digest bytes).
pub const PROGRAM_HASH_SIZE: usize = 21;

/// Script class prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Prefix {
    /// Single-signature spending script.
    Standard = 0x21,
    /// Multi-signature spending script.
    MultiSig = 0x12,
    /// Producer deposit script; outputs to it count toward the deposit.
    Deposit = 0x23,
    /// Stake identity derived from a signer's spending script.
    Stake = 0x3f,
}

impl Prefix {
    /// Decodes a prefix byte, if it names a known script class.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x21 => Some(Self::Standard),
            0x12 => Some(Self::MultiSig),
            0x23 => Some(Self::Deposit),
            0x3f => Some(Self::Stake),
            _ => None,
        }
    }
}

/// A prefixed 21-byte script hash.
///
/// # Example
///
/// ```rust
/// use vertex_types::{Prefix, ProgramHash, PublicKey};
///
/// let owner = PublicKey::new([0x02; 33]);
/// let deposit = ProgramHash::deposit_from_public_key(&owner);
/// assert_eq!(deposit.prefix(), Some(Prefix::Deposit));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ProgramHash([u8; PROGRAM_HASH_SIZE]);

impl ProgramHash {
    /// The zero program hash.
    pub const ZERO: Self = Self([0u8; PROGRAM_HASH_SIZE]);

    /// Creates a program hash from a 21-byte array.
    #[inline]
    pub const fn new(bytes: [u8; PROGRAM_HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a program hash from a slice.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != PROGRAM_HASH_SIZE {
            return Err(Error::InvalidLength {
                expected: PROGRAM_HASH_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; PROGRAM_HASH_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Derives a program hash from locking code under the given prefix.
    ///
    /// The digest is the first 20 bytes of `Keccak256(code)`.
    pub fn from_code(prefix: Prefix, code: &[u8]) -> Self {
        let digest = H256::keccak256(code);
        let mut bytes = [0u8; PROGRAM_HASH_SIZE];
        bytes[0] = prefix as u8;
        bytes[1..].copy_from_slice(&digest.as_bytes()[..20]);
        Self(bytes)
    }

    /// Derives the standard spending hash of a public key.
    pub fn standard_from_public_key(key: &PublicKey) -> Self {
        Self::from_code(Prefix::Standard, key.as_bytes())
    }

    /// Derives the deposit hash of a producer owner key.
    pub fn deposit_from_public_key(key: &PublicKey) -> Self {
        Self::from_code(Prefix::Deposit, key.as_bytes())
    }

    /// Derives the stake identity of a spending script.
    pub fn stake_from_code(code: &[u8]) -> Self {
        Self::from_code(Prefix::Stake, code)
    }

    /// Returns the script class prefix, if recognized.
    pub fn prefix(&self) -> Option<Prefix> {
        Prefix::from_byte(self.0[0])
    }

    /// Whether this hash carries the deposit prefix.
    pub fn is_deposit(&self) -> bool {
        self.prefix() == Some(Prefix::Deposit)
    }

    /// Whether this hash carries the stake prefix.
    pub fn is_stake(&self) -> bool {
        self.prefix() == Some(Prefix::Stake)
    }

    /// Returns the hash as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a program hash from hex.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }

    /// Writes the program hash to the canonical codec.
    pub fn serialize<W: io::Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.0)
    }

    /// Reads a program hash from the canonical codec.
    pub fn deserialize<R: io::Read>(r: &mut R) -> io::Result<Self> {
        let mut bytes = [0u8; PROGRAM_HASH_SIZE];
        r.read_exact(&mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for ProgramHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProgramHash({})", self.to_hex())
    }
}

impl fmt::Display for ProgramHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ProgramHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<[u8; PROGRAM_HASH_SIZE]> for ProgramHash {
    fn from(bytes: [u8; PROGRAM_HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for ProgramHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for ProgramHash {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ProgramHash {
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
    fn test_prefix_detection() {
        let key = PublicKey::new([0x02; 33]);
        assert!(ProgramHash::deposit_from_public_key(&key).is_deposit());
        assert!(!ProgramHash::standard_from_public_key(&key).is_deposit());
        assert!(ProgramHash::stake_from_code(&[0x51]).is_stake());
    }

    #[test]
    fn test_derivation_is_stable() {
        let key = PublicKey::new([0x02; 33]);
        let a = ProgramHash::deposit_from_public_key(&key);
        let b = ProgramHash::deposit_from_public_key(&key);
        assert_eq!(a, b);

        let other = PublicKey::new([0x03; 33]);
        assert_ne!(a, ProgramHash::deposit_from_public_key(&other));
    }

    #[test]
    fn test_hex_roundtrip() {
        let hash = ProgramHash::stake_from_code(b"code");
        assert_eq!(ProgramHash::from_hex(&hash.to_hex()).unwrap(), hash);
    }
}
