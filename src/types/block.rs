/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the 'block' type and its associated methods.

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::Digest;
pub use sha2::Sha256 as CryptoHasher;

use super::{
    certificates::QuorumCertificate,
    data_types::{BlockHeight, CryptoHash, ReplicaID},
};

/// Command carried by the genesis block.
pub const GENESIS_COMMAND: &str = "genesis";

/// A block in the chain. Immutable once created, and identified by [`hash`](Block::hash), which is
/// computed over every other field.
///
/// Blocks are linked to their parent by height (`parent`) rather than by the parent's hash.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub height: BlockHeight,
    pub hash: CryptoHash,
    pub parent: BlockHeight,
    pub command: String,
    /// `None` for the genesis block.
    pub proposer: Option<ReplicaID>,
    pub justify: Option<QuorumCertificate>,
}

impl Block {
    /// Create a block extending `parent` that carries `command`.
    pub fn new(
        parent: &Block,
        command: String,
        proposer: ReplicaID,
        justify: Option<QuorumCertificate>,
    ) -> Block {
        let height = parent.height + 1;
        let proposer = Some(proposer);
        Block {
            height,
            hash: Block::hash(height, parent.height, &command, &proposer, &justify),
            parent: parent.height,
            command,
            proposer,
            justify,
        }
    }

    /// The block at height 0 that every replica starts with.
    pub fn genesis() -> Block {
        let height = BlockHeight::genesis();
        let command = String::from(GENESIS_COMMAND);
        Block {
            height,
            hash: Block::hash(height, height, &command, &None, &None),
            parent: height,
            command,
            proposer: None,
            justify: None,
        }
    }

    pub fn hash(
        height: BlockHeight,
        parent: BlockHeight,
        command: &String,
        proposer: &Option<ReplicaID>,
        justify: &Option<QuorumCertificate>,
    ) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(&height.try_to_vec().unwrap());
        hasher.update(&parent.try_to_vec().unwrap());
        hasher.update(&command.try_to_vec().unwrap());
        hasher.update(&proposer.try_to_vec().unwrap());
        hasher.update(&justify.try_to_vec().unwrap());
        CryptoHash::new(hasher.finalize().into())
    }

    /// Checks if `hash` matches the rest of the block's contents.
    pub fn is_correct(&self) -> bool {
        self.hash
            == Block::hash(
                self.height,
                self.parent,
                &self.command,
                &self.proposer,
                &self.justify,
            )
    }

    pub fn is_genesis(&self) -> bool {
        self.height == BlockHeight::genesis()
    }
}
