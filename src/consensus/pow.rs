// Proof of work: the nonce scan

use crate::core::{Block, BlockHeader, ContentHash, Hash};

/// Scan nonces from zero until the header hash reaches the target's leading
/// zero count; returns the winning hash. Terminates with probability 1 for
/// any target below 256 bits.
pub fn mine_header(header: &mut BlockHeader) -> Hash {
    header.nonce = 0;
    let mut attempts = 0u64;
    loop {
        let hash = header.hash();
        if hash.leading_zeros() >= header.target as u32 {
            return hash;
        }
        header.nonce += 1;

        attempts += 1;
        if attempts % 100_000 == 0 {
            log::debug!(
                "mining block {}: {} attempts at target {}",
                header.index,
                attempts,
                header.target
            );
        }
    }
}

impl<T: ContentHash> Block<T> {
    /// Mine this block in place, refreshing the cached block hash.
    pub fn mine(&mut self) {
        self.block_hash = mine_header(&mut self.header);
    }
}
