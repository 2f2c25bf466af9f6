use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::blockchain::Block;
use crate::node::Node;
use crate::transaction::Transaction;

/// Shared application state: the running node. The HTTP layer only reads
/// the chain; network actions go through the node.
pub struct AppState {
    pub node: Arc<Node>,
}

/* ---------- Chain API Models ---------- */

#[derive(Serialize)]
pub struct TransactionView {
    pub sender: String,
    pub receiver: String,
    pub amount: f64,
}

impl From<&Transaction> for TransactionView {
    fn from(tx: &Transaction) -> Self {
        Self {
            sender: String::from_utf8_lossy(&tx.sender).into_owned(),
            receiver: String::from_utf8_lossy(&tx.receiver).into_owned(),
            amount: tx.amount,
        }
    }
}

#[derive(Serialize)]
pub struct BlockView {
    pub hash: String,
    pub index: u64,
    pub timestamp: u64,
    pub previous_hash: String,
    pub nonce: u64,
    pub checkpoint: bool,
    pub transactions: Vec<TransactionView>,
}

impl From<Block> for BlockView {
    fn from(block: Block) -> Self {
        Self {
            hash: block.hash(),
            transactions: block.transactions.iter().map(TransactionView::from).collect(),
            index: block.index,
            timestamp: block.timestamp,
            previous_hash: block.previous_hash,
            nonce: block.nonce,
            checkpoint: block.checkpoint,
        }
    }
}

#[derive(Serialize)]
pub struct ChainResponse {
    pub node_address: String,
    pub length: usize,
    pub height: u64,
    pub latest_hash: String,
    pub blocks: Vec<BlockView>,
}

/* ---------- Peer API Models ---------- */

#[derive(Serialize)]
pub struct PeersResponse {
    pub node_address: String,
    pub count: usize,
    pub peers: Vec<String>,
}

#[derive(Deserialize)]
pub struct SyncRequest {
    pub address: String,
}

#[derive(Serialize)]
pub struct SyncResponse {
    pub requested: String,
    pub latest_hash: String,
}
