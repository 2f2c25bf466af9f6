use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::GENESIS_PREVIOUS_HASH;
use crate::transaction::Transaction;

/// A single block of the ledger tree.
///
/// The hash is never stored: it is derived from the content on every call, so
/// it cannot go stale. `checkpoint` is the only field that may change after
/// admission and it is left out of the hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: u64, // Unix timestamp (UTC)
    pub previous_hash: String,
    pub transactions: Vec<Transaction>,
    pub nonce: u64, // Proof-of-Work nonce
    pub checkpoint: bool,
}

impl Block {
    /// Create the genesis block stamped with the current time.
    pub fn genesis() -> Self {
        Self::genesis_at(unix_now())
    }

    /// Create a genesis block with a fixed timestamp. Nodes built from the same
    /// timestamp share the same root hash.
    pub fn genesis_at(timestamp: u64) -> Self {
        Self {
            index: 0,
            timestamp,
            previous_hash: String::from(GENESIS_PREVIOUS_HASH),
            transactions: Vec::new(),
            nonce: 0,
            checkpoint: false,
        }
    }

    /// Create a new, unmined block. The nonce starts at zero.
    pub fn new(index: u64, previous_hash: String, transactions: Vec<Transaction>) -> Self {
        Self {
            index,
            timestamp: unix_now(),
            previous_hash,
            transactions,
            nonce: 0,
            checkpoint: false,
        }
    }

    /// SHA-256 over `index || timestamp || transactions || previous_hash || nonce`.
    /// The field order is part of the wire contract between peers.
    pub fn digest(&self) -> [u8; 32] {
        let mut preimage = Vec::with_capacity(64 + self.transactions.len() * 32);
        preimage.extend_from_slice(self.index.to_string().as_bytes());
        preimage.extend_from_slice(self.timestamp.to_string().as_bytes());
        for tx in &self.transactions {
            tx.write_preimage(&mut preimage);
        }
        preimage.extend_from_slice(self.previous_hash.as_bytes());
        preimage.extend_from_slice(self.nonce.to_string().as_bytes());

        let mut hasher = Sha256::new();
        hasher.update(&preimage);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize()[..]);
        out
    }

    /// Lowercase hex of [`Block::digest`].
    pub fn hash(&self) -> String {
        hex::encode(self.digest())
    }

    /// True when the first `difficulty` bytes of the digest are zero.
    #[cfg(test)]
    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        digest_meets_difficulty(&self.digest(), difficulty)
    }
}

pub(crate) fn digest_meets_difficulty(digest: &[u8; 32], difficulty: usize) -> bool {
    difficulty <= digest.len() && digest[..difficulty].iter().all(|b| *b == 0)
}

pub(crate) fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}
