use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use log::{debug, info, warn};

use super::block::digest_meets_difficulty;
use super::{Block, CHECKPOINT_INTERVAL, ChainError, DEFAULT_DIFFICULTY, ValidationError};
use crate::transaction::Transaction;

/// Whether two blocks may share an index as sibling forks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForkPolicy {
    /// Blocks at equal height under any parent are kept as forks.
    #[default]
    AllowForks,
    /// An index may occur only once anywhere in the tree.
    UniqueIndex,
}

/// Consensus parameters. Peers exchanging blocks must agree on all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainParams {
    /// Leading zero bytes required in a block digest.
    pub difficulty: usize,
    pub checkpoint_interval: u64,
    pub fork_policy: ForkPolicy,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            checkpoint_interval: CHECKPOINT_INTERVAL,
            fork_policy: ForkPolicy::default(),
        }
    }
}

/// Position of a node in the tree arena. Ids are only meaningful until the
/// next [`Blockchain::replace_blocks`].
pub type NodeId = usize;

const ROOT: NodeId = 0;

/// A block together with its links in the tree.
#[derive(Debug, Clone)]
pub struct BlockNode {
    block: Block,
    hash: String, // memoized; admitted blocks never change their hashed fields
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl BlockNode {
    pub fn new(block: Block) -> Self {
        let hash = block.hash();
        Self {
            block,
            hash,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

#[derive(Debug)]
struct Tree {
    nodes: Vec<BlockNode>,
    by_hash: HashMap<String, NodeId>,
}

impl Tree {
    fn new(root: Block) -> Self {
        let node = BlockNode::new(root);
        let by_hash = HashMap::from([(node.hash.clone(), ROOT)]);
        Self {
            nodes: vec![node],
            by_hash,
        }
    }

    fn node(&self, id: NodeId) -> &BlockNode {
        &self.nodes[id]
    }

    fn find(&self, hash: &str) -> Option<NodeId> {
        self.by_hash.get(hash).copied()
    }

    /// Breadth-first walk from `start`, children in insertion order. Stops as
    /// soon as `visit` returns true.
    fn walk_from(&self, start: NodeId, mut visit: impl FnMut(NodeId, &BlockNode) -> bool) {
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            let node = &self.nodes[id];
            if visit(id, node) {
                return;
            }
            queue.extend(node.children.iter().copied());
        }
    }

    fn contains_index(&self, index: u64) -> bool {
        let mut found = false;
        self.walk_from(ROOT, |_, node| {
            found = node.block.index == index;
            found
        });
        found
    }

    fn insert(&mut self, parent: NodeId, block: Block) -> NodeId {
        let mut node = BlockNode::new(block);
        node.parent = Some(parent);
        let id = self.nodes.len();
        self.by_hash.insert(node.hash.clone(), id);
        self.nodes.push(node);
        self.nodes[parent].children.push(id);
        id
    }

    /// The deepest checkpoint anchors the choice (ties go to the one reached
    /// first breadth-first, i.e. the earlier branch). The result is the last
    /// node of the anchor's subtree in breadth-first order. Without
    /// checkpoints, the last node of the whole tree.
    fn latest(&self) -> NodeId {
        let mut anchor: Option<NodeId> = None;
        self.walk_from(ROOT, |id, node| {
            let deeper = anchor.is_none_or(|a| node.block.index > self.nodes[a].block.index);
            if node.block.checkpoint && deeper {
                anchor = Some(id);
            }
            false
        });

        let start = anchor.unwrap_or(ROOT);
        let mut tip = start;
        self.walk_from(start, |id, _| {
            tip = id;
            false
        });
        tip
    }
}

/// In-memory block tree rooted at a genesis block.
///
/// Every structural read and write goes through one mutex. `generation` is
/// bumped after each mutation so callers can notice a moved tip without
/// taking the lock.
#[derive(Debug)]
pub struct Blockchain {
    tree: Mutex<Tree>,
    params: ChainParams,
    generation: AtomicU64,
}

impl Blockchain {
    pub fn with_params(params: ChainParams, genesis: Block) -> Self {
        Self {
            tree: Mutex::new(Tree::new(genesis)),
            params,
            generation: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().expect("mutex poisoned")
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn params(&self) -> ChainParams {
        self.params
    }

    /// Number of structural mutations so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn get_root(&self) -> Block {
        self.lock().node(ROOT).block.clone()
    }

    /// Check that `candidate` extends `parent`: index, linkage, then PoW.
    pub fn validate_block(&self, candidate: &Block, parent: &Block) -> Result<(), ValidationError> {
        self.validate_extends(candidate, parent.index, &parent.hash())
    }

    /// [`Blockchain::validate_block`] against a parent known only by index and
    /// hash. Lets a nonce search hash the parent once instead of per attempt.
    pub fn validate_extends(
        &self,
        candidate: &Block,
        parent_index: u64,
        parent_hash: &str,
    ) -> Result<(), ValidationError> {
        if parent_index.checked_add(1) != Some(candidate.index) {
            return Err(ValidationError::IndexMismatch {
                parent: parent_index,
                got: candidate.index,
            });
        }

        if candidate.previous_hash != parent_hash {
            return Err(ValidationError::PreviousHashMismatch {
                expected: parent_hash.to_string(),
                got: candidate.previous_hash.clone(),
            });
        }

        let digest = candidate.digest();
        if !digest_meets_difficulty(&digest, self.params.difficulty) {
            return Err(ValidationError::ProofOfWorkFailed {
                hash: hex::encode(digest),
            });
        }

        Ok(())
    }

    /// Validate `candidate` against the node with `parent_hash` and append it
    /// as that node's last child. Lookup, validation and insertion happen under
    /// one lock, so two racing admissions cannot both pass against a stale view.
    pub fn add_block(&self, parent_hash: &str, candidate: Block) -> Result<Block, ChainError> {
        let mut tree = self.lock();

        let parent = tree
            .find(parent_hash)
            .ok_or_else(|| ChainError::ParentNotFound(parent_hash.to_string()))?;

        let hash = candidate.hash();
        if tree.find(&hash).is_some() {
            return Err(ChainError::DuplicateBlock(hash));
        }

        self.validate_block(&candidate, &tree.node(parent).block)?;

        if self.params.fork_policy == ForkPolicy::UniqueIndex && tree.contains_index(candidate.index)
        {
            return Err(ChainError::DuplicateIndex(candidate.index));
        }

        let id = tree.insert(parent, candidate);
        self.approve_block(&mut tree.nodes[id]);
        self.bump();

        let admitted = tree.nodes[id].block.clone();
        debug!(
            "admitted block #{} hash={} checkpoint={}",
            admitted.index, hash, admitted.checkpoint
        );
        Ok(admitted)
    }

    /// Mark the node's block as a checkpoint iff its index is a multiple of
    /// the checkpoint interval.
    pub fn approve_block(&self, node: &mut BlockNode) {
        let interval = self.params.checkpoint_interval;
        node.block.checkpoint = interval != 0 && node.block.index % interval == 0;
    }

    pub fn block_exists(&self, hash: &str) -> bool {
        self.lock().find(hash).is_some()
    }

    pub fn get_block(&self, hash: &str) -> Option<Block> {
        let tree = self.lock();
        tree.find(hash).map(|id| tree.node(id).block.clone())
    }

    /// First block with `index` in breadth-first order.
    pub fn get_block_by_index(&self, index: u64) -> Option<Block> {
        let mut found = None;
        self.traverse_tree(|node| {
            if node.block.index == index {
                found = Some(node.block.clone());
                return true;
            }
            false
        });
        found
    }

    /// The block new work should extend. See `Tree::latest` for the rule.
    pub fn get_latest_block(&self) -> Block {
        let tree = self.lock();
        tree.node(tree.latest()).block.clone()
    }

    /// Build an unmined block on top of [`Blockchain::get_latest_block`].
    /// The block is not inserted.
    pub fn generate_new_block(&self, transactions: Vec<Transaction>) -> Block {
        let latest = self.get_latest_block();
        Block::new(latest.index + 1, latest.hash(), transactions)
    }

    /// Throw the current tree away and rebuild it from `blocks`. The first
    /// element becomes the root; the rest are linked by previous hash in
    /// ascending index order. Blocks that do not link or do not validate are
    /// dropped. Returns the size of the new tree.
    pub fn replace_blocks(&self, blocks: Vec<Block>) -> Result<usize, ChainError> {
        let mut blocks = blocks.into_iter();
        let root = blocks.next().ok_or(ChainError::EmptyChain)?;
        let mut rest: Vec<Block> = blocks.collect();
        rest.sort_by_key(|b| b.index);

        let mut current = self.lock();
        let mut tree = Tree::new(root);
        for block in rest {
            let hash = block.hash();
            if tree.find(&hash).is_some() {
                continue;
            }
            let Some(parent) = tree.find(&block.previous_hash) else {
                warn!("replace: dropping block #{} {hash}, parent missing", block.index);
                continue;
            };
            if let Err(err) = self.validate_block(&block, &tree.node(parent).block) {
                warn!("replace: dropping block #{} {hash}: {err}", block.index);
                continue;
            }
            if self.params.fork_policy == ForkPolicy::UniqueIndex && tree.contains_index(block.index)
            {
                warn!("replace: dropping block #{} {hash}, index taken", block.index);
                continue;
            }
            let id = tree.insert(parent, block);
            self.approve_block(&mut tree.nodes[id]);
        }

        let size = tree.nodes.len();
        *current = tree;
        self.bump();
        info!("blockchain replaced with {size} blocks");
        Ok(size)
    }

    /// Breadth-first walk from the root under the tree lock. The callback
    /// returns true to stop early.
    pub fn traverse_tree(&self, mut callback: impl FnMut(&BlockNode) -> bool) {
        let tree = self.lock();
        tree.walk_from(ROOT, |_, node| callback(node));
    }

    /// Every block, on any branch, whose index is greater than that of the
    /// block with `hash`. Breadth-first order.
    pub fn blocks_after(&self, hash: &str) -> Result<Vec<Block>, ChainError> {
        let tree = self.lock();
        let start = tree
            .find(hash)
            .ok_or_else(|| ChainError::BlockNotFound(hash.to_string()))?;
        let floor = tree.node(start).block.index;

        let mut blocks = Vec::new();
        tree.walk_from(ROOT, |_, node| {
            if node.block.index > floor {
                blocks.push(node.block.clone());
            }
            false
        });
        Ok(blocks)
    }

    /// All blocks in breadth-first order, root first.
    pub fn blocks(&self) -> Vec<Block> {
        let mut blocks = Vec::new();
        self.traverse_tree(|node| {
            blocks.push(node.block.clone());
            false
        });
        blocks
    }

    pub fn len(&self) -> usize {
        self.lock().nodes.len()
    }

    /// Highest index present on any branch.
    pub fn height(&self) -> u64 {
        self.lock()
            .nodes
            .iter()
            .map(|n| n.block.index)
            .max()
            .unwrap_or_default()
    }
}
