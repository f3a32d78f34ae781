// Canonical byte encoding used for all content hashing

use crate::core::Hash;

/// Deterministic byte encoding: integers in fixed-width big-endian, 32-byte
/// digests verbatim, sequences prefixed with their u64 length, record fields
/// in declaration order. The output must be byte-identical across platforms
/// so that content hashes are portable.
pub trait CanonicalEncode {
    fn encode_into(&self, buf: &mut Vec<u8>);

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }
}

impl CanonicalEncode for u8 {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.push(*self);
    }
}

impl CanonicalEncode for u64 {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }
}

impl CanonicalEncode for i64 {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }
}

impl CanonicalEncode for Hash {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.0);
    }
}

impl<T: CanonicalEncode> CanonicalEncode for [T] {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        (self.len() as u64).encode_into(buf);
        for item in self {
            item.encode_into(buf);
        }
    }
}

impl<T: CanonicalEncode> CanonicalEncode for Vec<T> {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        self.as_slice().encode_into(buf);
    }
}
