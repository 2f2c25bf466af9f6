pub mod block;
pub mod error;
pub mod model;

#[cfg(test)]
pub(crate) mod testutil;

pub use block::Block;
pub use error::{ChainError, ValidationError};
pub use model::{Blockchain, ChainParams, ForkPolicy};

/// Proof-of-Work target: number of leading zero bytes in the SHA-256 digest
/// (four leading zeros in hex). Every peer must use the same value.
pub const DEFAULT_DIFFICULTY: usize = 2;

/// Blocks whose index is a multiple of this become checkpoints.
pub const CHECKPOINT_INTERVAL: u64 = 10;

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "0";
