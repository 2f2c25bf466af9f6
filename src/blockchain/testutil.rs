//! Helpers for building small, cheaply mined trees in tests.

use super::{Block, Blockchain, ChainParams};
use crate::transaction::Transaction;

/// Parameters with a one-byte PoW target so tests mine in microseconds.
pub fn fast_params() -> ChainParams {
    ChainParams {
        difficulty: 1,
        ..ChainParams::default()
    }
}

pub fn fast_chain() -> Blockchain {
    Blockchain::with_params(fast_params(), Block::genesis_at(1_700_000_000))
}

/// Bump the nonce until the block meets `difficulty`.
pub fn solve(mut block: Block, difficulty: usize) -> Block {
    while !block.meets_difficulty(difficulty) {
        block.nonce += 1;
    }
    block
}

/// A solved child of `parent`.
pub fn mine_on(parent: &Block, difficulty: usize) -> Block {
    let block = Block::new(
        parent.index + 1,
        parent.hash(),
        vec![Transaction::new("Alice", "Bob", 10.0)],
    );
    solve(block, difficulty)
}

/// Mine `count` blocks on top of the latest block and return them as admitted.
pub fn extend(chain: &Blockchain, count: usize) -> Vec<Block> {
    let difficulty = chain.params().difficulty;
    (0..count)
        .map(|_| {
            let parent = chain.get_latest_block();
            let block = mine_on(&parent, difficulty);
            chain
                .add_block(&parent.hash(), block)
                .expect("mined block is admitted")
        })
        .collect()
}
