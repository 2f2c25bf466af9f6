//! Block propagation and chain synchronization handler.
//!
//! The handler keeps no state of its own: every decision is made against the
//! shared [`Blockchain`]. Validation and lookup failures are normal while peers
//! diverge, so they are logged and the message dropped.

use std::sync::Arc;

use log::{debug, info, warn};

use super::message::{BlockMessage, Outbound};
use crate::blockchain::{Block, Blockchain, ChainError};

pub struct SyncHandler {
    chain: Arc<Blockchain>,
    own_address: String,
}

impl SyncHandler {
    pub fn new(chain: Arc<Blockchain>, own_address: impl Into<String>) -> Self {
        Self {
            chain,
            own_address: own_address.into(),
        }
    }

    pub fn handle(&self, message: BlockMessage) -> Option<Outbound> {
        match message {
            BlockMessage::GetLatestBlockRequest => Some(Outbound::reply(BlockMessage::BlockResponse {
                block: self.chain.get_latest_block(),
            })),
            BlockMessage::GetBlockRequest { hash } => self.on_get_block(&hash),
            BlockMessage::BlockResponse { block } => self.on_block(block),
            BlockMessage::BlockchainSyncRequest {
                hash,
                sender_address,
            } => self.on_sync_request(&hash, sender_address),
            BlockMessage::BlocksResponse { blocks } => {
                self.on_blocks(blocks);
                None
            }
        }
    }

    fn on_get_block(&self, hash: &str) -> Option<Outbound> {
        match self.chain.get_block(hash) {
            Some(block) => Some(Outbound::reply(BlockMessage::BlockResponse { block })),
            None => {
                debug!("requested block {hash} not found");
                None
            }
        }
    }

    fn on_block(&self, block: Block) -> Option<Outbound> {
        let hash = block.hash();
        if self.chain.block_exists(&hash) {
            debug!("block #{} {hash} already known", block.index);
            return None;
        }

        if block.index == 0 {
            // A root we do not share: ask for the peer's whole chain instead
            // of walking further back.
            info!("peer runs a different genesis {hash}, requesting its chain");
            return Some(Outbound::reply(BlockMessage::BlockchainSyncRequest {
                hash: self.chain.get_latest_block().hash(),
                sender_address: self.own_address.clone(),
            }));
        }

        let Some(parent) = self.chain.get_block(&block.previous_hash) else {
            debug!(
                "block #{} {hash} has unknown parent {}, requesting it",
                block.index, block.previous_hash
            );
            return Some(Outbound::reply(BlockMessage::GetBlockRequest {
                hash: block.previous_hash,
            }));
        };

        if let Err(err) = self.chain.validate_block(&block, &parent) {
            warn!("dropping block #{} {hash}: {err}", block.index);
            return None;
        }

        match self.chain.add_block(&parent.hash(), block) {
            Ok(admitted) => info!("accepted block #{} {hash} from peer", admitted.index),
            Err(err) => warn!("dropping block {hash}: {err}"),
        }
        None
    }

    fn on_sync_request(&self, hash: &str, sender_address: String) -> Option<Outbound> {
        if sender_address.is_empty() {
            warn!("sync request without a sender address");
            return None;
        }

        let blocks = match self.chain.blocks_after(hash) {
            Ok(blocks) => blocks,
            Err(err) => {
                debug!("{err}; offering the whole chain to {sender_address}");
                self.chain.blocks()
            }
        };
        if blocks.is_empty() {
            debug!("{sender_address} is up to date");
            return None;
        }

        info!("sync request from {sender_address}: sending {} blocks", blocks.len());
        Some(Outbound::forward(
            sender_address,
            BlockMessage::BlocksResponse { blocks },
        ))
    }

    fn on_blocks(&self, mut blocks: Vec<Block>) {
        blocks.sort_by_key(|b| b.index);

        let root = self.chain.get_root();
        if blocks
            .first()
            .is_some_and(|b| b.index == 0 && b.hash() != root.hash())
        {
            self.adopt(blocks);
            return;
        }

        let total = blocks.len();
        let mut added = 0;
        for block in blocks {
            let hash = block.hash();
            if self.chain.block_exists(&hash) {
                continue;
            }
            let parent_hash = block.previous_hash.clone();
            match self.chain.add_block(&parent_hash, block) {
                Ok(_) => added += 1,
                Err(ChainError::ParentNotFound(_)) => {
                    debug!("skipping block {hash}: parent {parent_hash} not present")
                }
                Err(err) => warn!("skipping block {hash}: {err}"),
            }
        }
        info!("sync: added {added} of {total} blocks");
    }

    /// Replace the local tree with a peer's chain built on another genesis,
    /// but only if it reaches further than ours.
    fn adopt(&self, blocks: Vec<Block>) {
        let theirs = blocks.iter().map(|b| b.index).max().unwrap_or_default();
        let ours = self.chain.height();
        if theirs <= ours {
            info!("ignoring foreign chain of height {theirs}, local height is {ours}");
            return;
        }
        match self.chain.replace_blocks(blocks) {
            Ok(size) => info!("adopted foreign chain: {size} blocks, height {theirs}"),
            Err(err) => warn!("failed to adopt foreign chain: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::testutil::{extend, fast_chain, fast_params, mine_on, solve};
    use crate::network::message::Message;

    fn handler(chain: &Arc<Blockchain>, address: &str) -> SyncHandler {
        SyncHandler::new(chain.clone(), address)
    }

    fn response(block: Block) -> BlockMessage {
        BlockMessage::BlockResponse { block }
    }

    #[test]
    fn latest_block_request_replies_with_latest() {
        let chain = Arc::new(fast_chain());
        let blocks = extend(&chain, 2);
        let out = handler(&chain, "a:1").handle(BlockMessage::GetLatestBlockRequest);
        assert_eq!(out, Some(Outbound::reply(response(blocks[1].clone()))));
    }

    #[test]
    fn get_block_request_replies_only_when_found() {
        let chain = Arc::new(fast_chain());
        let blocks = extend(&chain, 1);
        let h = handler(&chain, "a:1");

        let found = h.handle(BlockMessage::GetBlockRequest {
            hash: blocks[0].hash(),
        });
        assert_eq!(found, Some(Outbound::reply(response(blocks[0].clone()))));

        let missing = h.handle(BlockMessage::GetBlockRequest { hash: "ff".into() });
        assert_eq!(missing, None);
    }

    #[test]
    fn replayed_block_response_is_a_no_op() {
        let chain = Arc::new(fast_chain());
        let block = mine_on(&chain.get_root(), 1);
        let h = handler(&chain, "a:1");

        assert_eq!(h.handle(response(block.clone())), None);
        assert_eq!(chain.len(), 2);
        let generation = chain.generation();

        assert_eq!(h.handle(response(block)), None);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.generation(), generation);
    }

    #[test]
    fn block_with_unknown_parent_requests_the_parent() {
        let source = Arc::new(fast_chain());
        let blocks = extend(&source, 2);
        let chain = Arc::new(fast_chain());

        let out = handler(&chain, "b:1").handle(response(blocks[1].clone()));
        assert_eq!(
            out,
            Some(Outbound::reply(BlockMessage::GetBlockRequest {
                hash: blocks[0].hash(),
            }))
        );
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn invalid_block_is_dropped() {
        let chain = Arc::new(fast_chain());
        let root = chain.get_root();
        let mut block = Block::new(1, root.hash(), vec![]);
        while block.meets_difficulty(1) {
            block.nonce += 1;
        }
        assert_eq!(handler(&chain, "a:1").handle(response(block)), None);
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn foreign_genesis_triggers_chain_request() {
        let chain = Arc::new(fast_chain());
        let out = handler(&chain, "b:1").handle(response(Block::genesis_at(99)));
        assert_eq!(
            out,
            Some(Outbound::reply(BlockMessage::BlockchainSyncRequest {
                hash: chain.get_root().hash(),
                sender_address: "b:1".into(),
            }))
        );
    }

    #[test]
    fn chain_sync_between_two_nodes_converges() {
        let a = Arc::new(fast_chain());
        let b = Arc::new(fast_chain());
        let mined = extend(&a, 3);

        let request = BlockMessage::BlockchainSyncRequest {
            hash: b.get_root().hash(),
            sender_address: "b:1".into(),
        };
        let Some(Outbound::Forward { address, message }) = handler(&a, "a:1").handle(request)
        else {
            panic!("expected a forwarded reply");
        };
        assert_eq!(address, "b:1");
        let Message::Block(BlockMessage::BlocksResponse { mut blocks }) = message else {
            panic!("expected a blocks response");
        };
        assert_eq!(blocks.len(), 3);
        assert!(blocks.iter().all(|blk| blk.index > 0));

        // Arrival order does not matter; the consumer sorts by index.
        blocks.reverse();
        assert_eq!(
            handler(&b, "b:1").handle(BlockMessage::BlocksResponse { blocks }),
            None
        );
        assert_eq!(b.len(), 4);
        assert_eq!(b.get_latest_block().hash(), a.get_latest_block().hash());
        assert_eq!(b.get_latest_block().hash(), mined[2].hash());
    }

    #[test]
    fn sync_request_for_up_to_date_peer_sends_nothing() {
        let a = Arc::new(fast_chain());
        let mined = extend(&a, 2);
        let out = handler(&a, "a:1").handle(BlockMessage::BlockchainSyncRequest {
            hash: mined[1].hash(),
            sender_address: "b:1".into(),
        });
        assert_eq!(out, None);
    }

    #[test]
    fn blocks_response_skips_orphans_and_keeps_the_rest() {
        let a = Arc::new(fast_chain());
        let mined = extend(&a, 3);
        let b = Arc::new(fast_chain());

        let orphan = solve(Block::new(2, "unknown".into(), vec![]), 1);
        let blocks = vec![mined[1].clone(), orphan, mined[0].clone()];
        handler(&b, "b:1").handle(BlockMessage::BlocksResponse { blocks });

        assert_eq!(b.len(), 3);
        assert!(b.block_exists(&mined[1].hash()));
    }

    #[test]
    fn unknown_sync_hash_offers_whole_chain_and_taller_foreign_chain_is_adopted() {
        let a = Arc::new(Blockchain::with_params(fast_params(), Block::genesis_at(1)));
        extend(&a, 3);
        let b = Arc::new(fast_chain());
        extend(&b, 1);

        let out = handler(&a, "a:1").handle(BlockMessage::BlockchainSyncRequest {
            hash: b.get_latest_block().hash(),
            sender_address: "b:1".into(),
        });
        let Some(Outbound::Forward { message, .. }) = out else {
            panic!("expected a forwarded reply");
        };
        let Message::Block(msg @ BlockMessage::BlocksResponse { .. }) = message else {
            panic!("expected a blocks response");
        };

        handler(&b, "b:1").handle(msg);
        assert_eq!(b.get_root(), a.get_root());
        assert_eq!(b.get_latest_block().hash(), a.get_latest_block().hash());
    }

    #[test]
    fn shorter_foreign_chain_is_ignored() {
        let a = Arc::new(Blockchain::with_params(fast_params(), Block::genesis_at(1)));
        extend(&a, 1);
        let b = Arc::new(fast_chain());
        extend(&b, 2);
        let root = b.get_root();

        handler(&b, "b:1").handle(BlockMessage::BlocksResponse { blocks: a.blocks() });
        assert_eq!(b.get_root(), root);
        assert_eq!(b.len(), 3);
    }
}
