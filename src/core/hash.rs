// Hashing helpers and the ambient clock

use crate::core::{CanonicalEncode, Hash};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Single SHA-256 digest.
pub fn sha256(data: &[u8]) -> Hash {
    Hash(Sha256::digest(data).into())
}

/// SHA-256 of a value's canonical byte encoding.
pub fn content_hash<T: CanonicalEncode + ?Sized>(value: &T) -> Hash {
    sha256(&value.encode())
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_millis() as i64
}
