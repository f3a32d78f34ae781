// Ordered block sequence: retargeting, append, and reorg reconstruction

use crate::constants::{ADJUST_INTERVAL, TIME_EXPECTED};
use crate::core::{now_ms, Block, BlockHeader, ContentHash, Hash};
use crate::error::ValidationError;
use std::collections::HashMap;

/// Ordered sequence of blocks with `chain[i].header.index == i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain<T> {
    blocks: Vec<Block<T>>,
}

impl<T> Default for Chain<T> {
    fn default() -> Self {
        Self { blocks: Vec::new() }
    }
}

impl<T> Chain<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block<T>] {
        &self.blocks
    }

    pub fn last(&self) -> Option<&Block<T>> {
        self.blocks.last()
    }

    /// Difficulty accumulated at the tip; what competing chains are ranked
    /// by. Zero for an empty chain.
    pub fn cumulative_difficulty(&self) -> u64 {
        self.last().map_or(0, |b| b.header.diff)
    }
}

impl<T: ContentHash> Chain<T> {
    /// The next block to mine on top of this chain: index, predecessor link,
    /// retargeted difficulty and a fresh timestamp. Genesis when empty.
    pub fn next_unmined(&self, data: T) -> Block<T> {
        let last = match self.last() {
            None => return Block::genesis(data),
            Some(last) => last,
        };
        let mut header = BlockHeader {
            index: last.header.index + 1,
            prev_hash: last.block_hash,
            inner_hash: Hash::ZERO,
            diff: 0,
            target: 0,
            timestamp: now_ms(),
            nonce: 0,
        };
        header.target = self.next_target(header.index, header.timestamp);
        header.diff = last.header.diff + (1u64 << header.target);
        Block::new(header, data)
    }

    /// Difficulty retarget rule. The target is carried over except at
    /// positive multiples of `ADJUST_INTERVAL`, where the realized time for
    /// the last interval is compared against `TIME_EXPECTED`: more than
    /// double relaxes the target (clamped at zero), less than half tightens
    /// it.
    pub fn next_target(&self, index: u64, timestamp: i64) -> u8 {
        let last = self.last().expect("retarget needs a non-empty chain");
        if index % ADJUST_INTERVAL != 0 {
            return last.header.target;
        }

        let anchor = &self.blocks[(index - ADJUST_INTERVAL) as usize];
        let taken = timestamp - anchor.header.timestamp;
        if taken > 2 * TIME_EXPECTED {
            last.header.target.saturating_sub(1)
        } else if taken < TIME_EXPECTED / 2 {
            last.header.target + 1
        } else {
            last.header.target
        }
    }

    /// Validate and attach a block at the tip. The chain is unchanged on
    /// error. An empty chain only accepts a genesis-shape index-0 block.
    pub fn append(&mut self, block: Block<T>) -> Result<(), ValidationError> {
        block.validate()?;
        match self.last() {
            None => {
                if !block.header.is_genesis_shape() {
                    return Err(ValidationError::GenesisShape);
                }
            }
            Some(last) => last.header.validate_successor(&block.header)?,
        }
        self.blocks.push(block);
        Ok(())
    }

    /// Whole-chain validation: genesis shape at index 0, every block valid,
    /// adjacency rules between every pair.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(first) = self.blocks.first() {
            if !first.header.is_genesis_shape() {
                return Err(ValidationError::GenesisShape);
            }
        }
        for (i, block) in self.blocks.iter().enumerate() {
            block.validate()?;
            if block.header.index != i as u64 {
                return Err(ValidationError::IndexMismatch {
                    expected: i as u64,
                    got: block.header.index,
                });
            }
            if i > 0 {
                self.blocks[i - 1].header.validate_successor(&block.header)?;
            }
        }
        Ok(())
    }

    /// Assemble a chain from blocks already in order, validating the result.
    pub fn from_blocks(blocks: Vec<Block<T>>) -> Result<Self, ValidationError> {
        let chain = Self { blocks };
        chain.validate()?;
        Ok(chain)
    }

    /// Mine a fresh chain carrying the given payloads, in order.
    pub fn mine_from(payloads: impl IntoIterator<Item = T>) -> Self {
        let mut chain = Self::new();
        for data in payloads {
            let mut block = chain.next_unmined(data);
            block.mine();
            chain.blocks.push(block);
        }
        chain
    }
}

impl<T: ContentHash + Clone> Chain<T> {
    /// Walk `prev_hash` links from `tip` through `pool` down to an index-0
    /// block, then validate the reassembled chain. This is how a node adopts
    /// a heavier tip whose history it only holds as loose blocks.
    pub fn rebuild(
        pool: &HashMap<Hash, Block<T>>,
        tip: Block<T>,
    ) -> Result<Self, ValidationError> {
        let mut buf = Vec::new();
        let mut cur = tip;
        loop {
            let at_genesis = cur.header.index == 0;
            let prev_hash = cur.header.prev_hash;
            buf.push(cur);
            if at_genesis {
                break;
            }
            match pool.get(&prev_hash) {
                Some(prev) => cur = prev.clone(),
                None => return Err(ValidationError::NoPredecessor(prev_hash)),
            }
        }
        buf.reverse();
        Self::from_blocks(buf)
    }

    /// The first `n` blocks (all of them if the chain is shorter).
    pub fn prefix(&self, n: usize) -> Self {
        Self {
            blocks: self.blocks[..n.min(self.blocks.len())].to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::TIME_TOLERANCE_MS;

    #[test]
    fn test_mine_from_produces_valid_chain() {
        let chain = Chain::mine_from([10i64, 20, 30]);
        assert_eq!(chain.len(), 3);
        assert!(chain.validate().is_ok());
        assert_eq!(chain.blocks()[0].header.diff, 1);
        for (i, block) in chain.blocks().iter().enumerate() {
            assert_eq!(block.header.index, i as u64);
        }
    }

    #[test]
    fn test_append_rejects_non_genesis_start() {
        let donor = Chain::mine_from([1i64, 2]);
        let mut chain = Chain::new();
        let second = donor.blocks()[1].clone();
        assert_eq!(chain.append(second), Err(ValidationError::GenesisShape));
        assert!(chain.is_empty());
    }

    #[test]
    fn test_append_extends() {
        let mut chain = Chain::new();
        let mut genesis = chain.next_unmined(1i64);
        genesis.mine();
        chain.append(genesis).unwrap();

        let mut next = chain.next_unmined(2i64);
        next.mine();
        chain.append(next).unwrap();

        assert_eq!(chain.len(), 2);
        assert!(chain.validate().is_ok());
    }

    #[test]
    fn test_cumulative_difficulty() {
        assert_eq!(Chain::<i64>::new().cumulative_difficulty(), 0);
        let chain = Chain::mine_from([1i64, 2, 3]);
        // target stays 0 before the first retarget boundary
        assert_eq!(chain.cumulative_difficulty(), 3);
    }

    #[test]
    fn test_rebuild_from_pool() {
        let chain = Chain::mine_from([1i64, 2, 3]);
        let pool: HashMap<Hash, Block<i64>> = chain
            .blocks()
            .iter()
            .map(|b| (b.block_hash, b.clone()))
            .collect();
        let tip = chain.last().unwrap().clone();

        let rebuilt = Chain::rebuild(&pool, tip).unwrap();
        assert_eq!(rebuilt, chain);
    }

    #[test]
    fn test_rebuild_missing_predecessor() {
        let chain = Chain::mine_from([1i64, 2, 3]);
        let mut pool: HashMap<Hash, Block<i64>> = chain
            .blocks()
            .iter()
            .map(|b| (b.block_hash, b.clone()))
            .collect();
        pool.remove(&chain.blocks()[1].block_hash);
        let tip = chain.last().unwrap().clone();

        assert!(matches!(
            Chain::rebuild(&pool, tip),
            Err(ValidationError::NoPredecessor(_))
        ));
    }

    // Helper for the retarget tests: a chain whose block timestamps are under
    // the test's control. Blocks are mined so the whole chain validates.
    fn chain_with_spacing(len: u64, spacing_ms: i64, target: u8) -> Chain<i64> {
        let base = now_ms() - 60_000;
        let mut blocks = Vec::new();
        for i in 0..len {
            let mut block = if i == 0 {
                let mut b = Block::genesis(i as i64);
                b.header.timestamp = base;
                b
            } else {
                let prev: &Block<i64> = &blocks[(i - 1) as usize];
                let header = BlockHeader {
                    index: i,
                    prev_hash: prev.block_hash,
                    inner_hash: Hash::ZERO,
                    diff: prev.header.diff + (1u64 << target),
                    target,
                    timestamp: base + i as i64 * spacing_ms,
                    nonce: 0,
                };
                Block::new(header, i as i64)
            };
            block.mine();
            blocks.push(block);
        }
        Chain::from_blocks(blocks).unwrap()
    }

    #[test]
    fn test_retarget_holds_off_boundary() {
        let chain = chain_with_spacing(3, TIME_EXPECTED / ADJUST_INTERVAL as i64, 1);
        let ts = chain.last().unwrap().header.timestamp + 200;
        assert_eq!(chain.next_target(3, ts), 1);
    }

    #[test]
    fn test_retarget_relaxes_when_slow() {
        // blocks spaced at 2 * TIME_EXPECTED / ADJUST_INTERVAL: a full
        // interval takes twice the expected time
        let spacing = 2 * TIME_EXPECTED / ADJUST_INTERVAL as i64;
        let chain = chain_with_spacing(ADJUST_INTERVAL, spacing, 1);
        let ts = chain.blocks()[0].header.timestamp + ADJUST_INTERVAL as i64 * spacing + 1;
        assert_eq!(chain.next_target(ADJUST_INTERVAL, ts), 0);
    }

    #[test]
    fn test_retarget_clamps_at_zero() {
        let spacing = 2 * TIME_EXPECTED / ADJUST_INTERVAL as i64;
        let chain = chain_with_spacing(ADJUST_INTERVAL, spacing, 0);
        let ts = chain.blocks()[0].header.timestamp + ADJUST_INTERVAL as i64 * spacing + 1;
        assert_eq!(chain.next_target(ADJUST_INTERVAL, ts), 0);
    }

    #[test]
    fn test_retarget_tightens_when_fast() {
        let chain = chain_with_spacing(ADJUST_INTERVAL, 1, 0);
        let ts = chain.blocks()[0].header.timestamp + ADJUST_INTERVAL as i64;
        assert_eq!(chain.next_target(ADJUST_INTERVAL, ts), 1);
    }

    #[test]
    fn test_successor_timestamp_tolerance_in_chain() {
        let mut chain = Chain::mine_from([1i64]);
        let mut block = chain.next_unmined(2i64);
        block.header.timestamp =
            chain.last().unwrap().header.timestamp - TIME_TOLERANCE_MS;
        block.mine();
        assert_eq!(chain.append(block), Err(ValidationError::ClockSkew));
    }
}
