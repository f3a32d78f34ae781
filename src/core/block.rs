// Block header and the generic block pairing a payload with its proof

use crate::constants::TIME_TOLERANCE_MS;
use crate::core::{content_hash, now_ms, CanonicalEncode, Hash};
use crate::error::ValidationError;

/// Block header. `diff` accumulates `2^target` over the whole chain and is
/// what competing tips are ranked by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Position in the chain; `chain[index]` holds this block
    pub index: u64,
    /// Block hash of the predecessor, zero for genesis
    pub prev_hash: Hash,
    /// Content hash of the block payload
    pub inner_hash: Hash,
    /// Cumulative difficulty up to and including this block
    pub diff: u64,
    /// Minimum leading-zero-bit count the block hash must reach
    pub target: u8,
    /// Creation time, milliseconds since the Unix epoch
    pub timestamp: i64,
    /// The proof of work
    pub nonce: u64,
}

impl CanonicalEncode for BlockHeader {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        self.index.encode_into(buf);
        self.prev_hash.encode_into(buf);
        self.inner_hash.encode_into(buf);
        self.diff.encode_into(buf);
        self.target.encode_into(buf);
        self.timestamp.encode_into(buf);
        self.nonce.encode_into(buf);
    }
}

impl BlockHeader {
    /// Header for an index-0 block committing to `inner_hash`.
    pub fn genesis(inner_hash: Hash) -> Self {
        Self {
            index: 0,
            prev_hash: Hash::ZERO,
            inner_hash,
            diff: 1,
            target: 0,
            timestamp: now_ms(),
            nonce: 0,
        }
    }

    pub fn hash(&self) -> Hash {
        content_hash(self)
    }

    pub fn is_genesis_shape(&self) -> bool {
        self.index == 0
            && self.prev_hash == Hash::ZERO
            && self.diff == 1
            && self.target == 0
            && self.nonce == 0
    }

    /// From-the-far-future rule.
    pub fn validate_standalone(&self) -> Result<(), ValidationError> {
        if self.timestamp - TIME_TOLERANCE_MS >= now_ms() {
            return Err(ValidationError::ClockSkew);
        }
        Ok(())
    }

    /// Adjacency rules between this header and its successor.
    pub fn validate_successor(&self, succ: &BlockHeader) -> Result<(), ValidationError> {
        if succ.index != self.index + 1 {
            return Err(ValidationError::IndexMismatch {
                expected: self.index + 1,
                got: succ.index,
            });
        }
        if succ.diff != self.diff + (1u64 << succ.target) {
            return Err(ValidationError::DiffMismatch { index: succ.index });
        }
        if succ.timestamp <= self.timestamp - TIME_TOLERANCE_MS {
            return Err(ValidationError::ClockSkew);
        }
        if succ.prev_hash != self.hash() {
            return Err(ValidationError::PrevHashMismatch { index: succ.index });
        }
        Ok(())
    }
}

/// Capability a block payload must expose: a stable content hash the header
/// commits to.
pub trait ContentHash {
    fn content_hash(&self) -> Hash;
}

// Chain mechanics stay testable with plain integers as payload.
impl ContentHash for i64 {
    fn content_hash(&self) -> Hash {
        content_hash(self)
    }
}

/// A mined (or not-yet-mined) block: header, typed payload and the cached
/// block hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block<T> {
    pub header: BlockHeader,
    pub data: T,
    pub block_hash: Hash,
}

impl<T: ContentHash> Block<T> {
    /// Pair a header with its payload; the header's inner hash is set from
    /// the payload and the block hash is cached.
    pub fn new(mut header: BlockHeader, data: T) -> Self {
        header.inner_hash = data.content_hash();
        let block_hash = header.hash();
        Self { header, data, block_hash }
    }

    /// Index-0 block carrying `data`.
    pub fn genesis(data: T) -> Self {
        let header = BlockHeader::genesis(data.content_hash());
        let block_hash = header.hash();
        Self { header, data, block_hash }
    }

    /// Checks the payload commitment, the cached hash, the proof of work and
    /// the clock-skew rule.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let inner = self.data.content_hash();
        if inner != self.header.inner_hash {
            return Err(ValidationError::HashMismatch {
                computed: inner,
                stored: self.header.inner_hash,
            });
        }
        let computed = self.header.hash();
        if computed != self.block_hash {
            return Err(ValidationError::HashMismatch {
                computed,
                stored: self.block_hash,
            });
        }
        let zeros = self.block_hash.leading_zeros();
        if zeros < self.header.target as u32 {
            return Err(ValidationError::TargetNotMet {
                required: self.header.target,
                got: zeros,
            });
        }
        self.header.validate_standalone()
    }
}
