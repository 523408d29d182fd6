/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! In-memory store of the blocks a replica knows about.
//!
//! The store keeps two maps keyed by [`BlockHeight`]:
//! 1. **Committed blocks**: the append-only committed log, starting with the genesis block at height 0.
//! 2. **Uncommitted blocks**: tentative blocks that were proposed (by this replica as leader, or by a
//!    leader this replica voted for) but not yet committed. A newer proposal at the same height
//!    supersedes an older one, and committing a block prunes its tentative entry.
//!
//! ## Safety
//!
//! A committed height is never re-assigned. Trying to commit a different block at a height that is
//! already committed means the protocol was violated, and is reported as
//! [`BlockStoreError::ConflictingCommit`].
//!
//! ## Gaps
//!
//! Committed heights are not necessarily contiguous. A replica that misses the `Decide` for a height never
//! commits it, since replicas do not sync blocks from each other. The next block it commits can sit above
//! the gap.

use std::collections::BTreeMap;

use crate::types::{block::Block, data_types::BlockHeight};

pub struct BlockStore {
    committed: BTreeMap<BlockHeight, Block>,
    uncommitted: BTreeMap<BlockHeight, Block>,
}

impl BlockStore {
    /// Create a block store that contains only the genesis block.
    pub fn new() -> BlockStore {
        let genesis = Block::genesis();
        let mut committed = BTreeMap::new();
        committed.insert(genesis.height, genesis);
        BlockStore {
            committed,
            uncommitted: BTreeMap::new(),
        }
    }

    /// Get the block at `height`, looking in the committed log first and then among the tentative blocks.
    pub fn block(&self, height: BlockHeight) -> Option<&Block> {
        self.committed
            .get(&height)
            .or_else(|| self.uncommitted.get(&height))
    }

    pub fn committed_block(&self, height: BlockHeight) -> Option<&Block> {
        self.committed.get(&height)
    }

    pub fn uncommitted_block(&self, height: BlockHeight) -> Option<&Block> {
        self.uncommitted.get(&height)
    }

    pub fn is_committed(&self, height: BlockHeight) -> bool {
        self.committed.contains_key(&height)
    }

    /// Get the committed block with the greatest height. This is the genesis block if nothing else has been
    /// committed yet.
    pub fn highest_committed(&self) -> &Block {
        self.committed
            .values()
            .next_back()
            .expect("the committed log always contains the genesis block")
    }

    /// Store `block` as tentative, superseding any tentative block at the same height.
    ///
    /// Returns whether the block was stored. Blocks at an already-committed height are never stored.
    pub fn insert_uncommitted(&mut self, block: Block) -> bool {
        if self.committed.contains_key(&block.height) {
            return false;
        }
        self.uncommitted.insert(block.height, block);
        true
    }

    /// Append `block` to the committed log and prune its tentative entry.
    ///
    /// Committing the same block twice is a no-op that returns `Ok(false)`. Returns `Ok(true)` if the block
    /// was newly committed.
    pub fn commit(&mut self, block: &Block) -> Result<bool, BlockStoreError> {
        if let Some(committed) = self.committed.get(&block.height) {
            if committed.hash == block.hash {
                return Ok(false);
            }
            return Err(BlockStoreError::ConflictingCommit {
                height: block.height,
            });
        }

        self.uncommitted.remove(&block.height);
        self.committed.insert(block.height, block.clone());
        Ok(true)
    }

    /// Iterate through the committed log in ascending order of height. Heights this replica missed are
    /// skipped.
    pub fn committed_blocks(&self) -> impl Iterator<Item = &Block> {
        self.committed.values()
    }
}

impl Default for BlockStore {
    fn default() -> Self {
        BlockStore::new()
    }
}

/// Errors that indicate that the replica's view of the chain has become inconsistent.
#[derive(Debug, PartialEq, Eq)]
pub enum BlockStoreError {
    /// Unable to find a block at `height`, even though an invariant the replica expects to be maintained
    /// suggests that the block should exist.
    BlockExpectedButNotFound { height: BlockHeight },

    /// A different block has already been committed at `height`.
    ConflictingCommit { height: BlockHeight },
}
