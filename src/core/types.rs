// Fixed-width digest type used for block hashes, addresses and tx ids

use std::fmt;

/// 256-bit digest (32 bytes). Equality is bytewise; the `Ord` impl is the
/// lexicographic byte order used for deterministic tie-breaking.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash(pub [u8; 32]);

/// SHA-256 of a compressed P-256 public key.
pub type Address = Hash;

/// SHA-256 of a transaction's canonical content.
pub type TxId = Hash;

impl Hash {
    pub const ZERO: Hash = Hash([0u8; 32]);

    pub fn from_slice(slice: &[u8]) -> Result<Self, String> {
        if slice.len() != 32 {
            return Err(format!("invalid hash length: expected 32, got {}", slice.len()));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Count of leading zero bits; the proof-of-work criterion.
    pub fn leading_zeros(&self) -> u32 {
        let mut count = 0;
        for byte in self.0 {
            count += byte.leading_zeros();
            if byte != 0 {
                break;
            }
        }
        count
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(self.0))
    }
}

impl serde::Serialize for Hash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
