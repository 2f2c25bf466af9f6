//! Error types for the block tree.

use thiserror::Error;

/// Reasons a candidate block does not extend a given parent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("block index {got} does not follow parent index {parent}")]
    IndexMismatch { parent: u64, got: u64 },

    #[error("previous hash {got} does not match parent hash {expected}")]
    PreviousHashMismatch { expected: String, got: String },

    #[error("block hash {hash} does not meet the proof-of-work target")]
    ProofOfWorkFailed { hash: String },
}

/// Errors raised by tree operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("invalid block: {0}")]
    Validation(#[from] ValidationError),

    #[error("block {0} not found")]
    BlockNotFound(String),

    #[error("parent block {0} not found")]
    ParentNotFound(String),

    #[error("a block with index {0} already exists")]
    DuplicateIndex(u64),

    #[error("block {0} already exists")]
    DuplicateBlock(String),

    #[error("cannot build a chain from an empty block list")]
    EmptyChain,
}
