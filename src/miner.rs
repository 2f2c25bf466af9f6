use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};

use crate::blockchain::{Block, Blockchain, ChainError};
use crate::transaction::Transaction;

/// Result of one nonce search.
#[derive(Debug, PartialEq)]
pub enum MineOutcome {
    Found(Block),
    /// The latest block moved away from the parent being mined on.
    Stale,
    Cancelled,
}

/// Background block producer. Runs on a blocking thread; checkpoint blocks it
/// admits are announced on `announcements` for the node to push to peers.
pub struct Miner {
    chain: Arc<Blockchain>,
    announcements: mpsc::UnboundedSender<Block>,
    pause: Duration,
}

impl Miner {
    pub fn new(
        chain: Arc<Blockchain>,
        announcements: mpsc::UnboundedSender<Block>,
        pause: Duration,
    ) -> Self {
        Self {
            chain,
            announcements,
            pause,
        }
    }

    /// Placeholder payload; transaction content is opaque to the ledger.
    fn transactions() -> Vec<Transaction> {
        vec![Transaction::new("Alice", "Bob", 10.0)]
    }

    /// Bump the nonce until `candidate` validates against `parent`.
    ///
    /// Between attempts the search checks the shutdown flag and the chain
    /// generation; when the generation moved and the latest block is no longer
    /// `parent`, the search gives up so the caller can restart on the new tip.
    pub fn search(
        &self,
        parent: &Block,
        mut candidate: Block,
        shutdown: &watch::Receiver<bool>,
    ) -> MineOutcome {
        let parent_hash = parent.hash();
        let mut seen = self.chain.generation();
        loop {
            if *shutdown.borrow() {
                return MineOutcome::Cancelled;
            }

            let generation = self.chain.generation();
            if generation != seen {
                seen = generation;
                if self.chain.get_latest_block().hash() != parent_hash {
                    return MineOutcome::Stale;
                }
            }

            if self
                .chain
                .validate_extends(&candidate, parent.index, &parent_hash)
                .is_ok()
            {
                return MineOutcome::Found(candidate);
            }
            candidate.nonce = candidate.nonce.wrapping_add(1);
        }
    }

    /// Build on the latest block, search a nonce and submit the result.
    /// Returns the admitted block, or `None` if this attempt was abandoned.
    pub fn mine_once(&self, shutdown: &watch::Receiver<bool>) -> Option<Block> {
        let candidate = self.chain.generate_new_block(Self::transactions());
        let Some(parent) = self.chain.get_block(&candidate.previous_hash) else {
            debug!("parent of candidate #{} already gone", candidate.index);
            return None;
        };

        let block = match self.search(&parent, candidate, shutdown) {
            MineOutcome::Found(block) => block,
            MineOutcome::Stale => {
                debug!("tip moved while mining on #{}, restarting", parent.index);
                return None;
            }
            MineOutcome::Cancelled => return None,
        };

        // The parent is resolved again by hash: the tree may have been
        // replaced while the search ran.
        let parent_hash = block.previous_hash.clone();
        match self.chain.add_block(&parent_hash, block) {
            Ok(admitted) => {
                info!(
                    "MINED block#{} hash={} nonce={} checkpoint={}",
                    admitted.index,
                    admitted.hash(),
                    admitted.nonce,
                    admitted.checkpoint
                );
                if admitted.checkpoint && self.announcements.send(admitted.clone()).is_err() {
                    debug!("nobody listens for checkpoint announcements");
                }
                Some(admitted)
            }
            Err(ChainError::ParentNotFound(hash)) => {
                warn!("parent {hash} disappeared before submission, abandoning block");
                None
            }
            Err(err) => {
                warn!("mined block rejected: {err}");
                None
            }
        }
    }

    /// Mine until shutdown is signalled, pausing between admitted blocks.
    pub fn run(self, shutdown: watch::Receiver<bool>) {
        info!("miner started (pause {:?})", self.pause);
        while !*shutdown.borrow() {
            if self.mine_once(&shutdown).is_some() {
                self.sleep(&shutdown);
            }
        }
        info!("miner stopped");
    }

    fn sleep(&self, shutdown: &watch::Receiver<bool>) {
        let deadline = Instant::now() + self.pause;
        loop {
            let now = Instant::now();
            if now >= deadline || *shutdown.borrow() {
                return;
            }
            thread::sleep((deadline - now).min(Duration::from_millis(100)));
        }
    }
}
