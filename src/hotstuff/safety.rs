/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Predicates that decide whether a replica may vote for a block or act on a certificate.
//!
//! # Voting rule
//!
//! A replica votes for a proposed block only if the vote cannot contradict its lock, i.e., if
//! [`safety_rule`] returns `true`:
//! 1. The replica is not locked, or
//! 2. The proposed block extends the block of `locked_qc`, or
//! 3. The proposal's justification is strictly newer than `locked_qc`, meaning the lock is stale.
//!
//! ## Extension check
//!
//! [`extends`] checks direct-parent extension only: `block.parent` must be `ancestor`, and the parent must
//! be known to the replica. It does not walk the full ancestor chain, so a proposal that extends the
//! locked block through an intermediate block is only accepted through predicate 3.

use crate::{
    block_store::BlockStore,
    types::{
        block::Block,
        certificates::{Phase, QuorumCertificate},
        data_types::{BlockHeight, ViewNumber},
    },
};

/// Check whether a replica with lock `locked_qc` may vote for `block`, proposed with justification
/// `justify`.
pub(crate) fn safety_rule(
    block: &Block,
    justify: Option<&QuorumCertificate>,
    locked_qc: Option<&QuorumCertificate>,
    block_store: &BlockStore,
) -> bool {
    match locked_qc {
        None => true,
        Some(locked_qc) => {
            extends(block, locked_qc.block, block_store)
                || justify.is_some_and(|justify| justify.view > locked_qc.view)
        }
    }
}

/// Check whether `block`'s parent is the known block at height `ancestor`.
pub(crate) fn extends(block: &Block, ancestor: BlockHeight, block_store: &BlockStore) -> bool {
    match block_store.block(block.parent) {
        Some(parent) => parent.height == ancestor && block.height == parent.height + 1,
        None => false,
    }
}

/// Check whether `qc` is a `phase` certificate formed in `view` with at least `quorum_size` signers.
pub(crate) fn matching_qc(
    qc: &QuorumCertificate,
    phase: Phase,
    view: ViewNumber,
    quorum_size: usize,
) -> bool {
    qc.phase == phase && qc.view == view && qc.has_quorum(quorum_size)
}

#[cfg(test)]
mod tests {
    use crate::types::{data_types::ReplicaID, replica_set::ReplicaSet};

    use super::*;

    fn qc(phase: Phase, view: u64, block: u64) -> QuorumCertificate {
        QuorumCertificate::new(
            phase,
            ViewNumber::new(view),
            BlockHeight::new(block),
            ReplicaSet::new(4).unwrap().ids().take(3).collect(),
        )
    }

    /// Build a store holding genesis <- b1 <- b2, all tentative except genesis.
    fn chain() -> (BlockStore, Block, Block) {
        let mut store = BlockStore::new();
        let b1 = Block::new(&Block::genesis(), String::from("b1"), ReplicaID::new(1), None);
        let b2 = Block::new(&b1, String::from("b2"), ReplicaID::new(2), None);
        store.insert_uncommitted(b1.clone());
        store.insert_uncommitted(b2.clone());
        (store, b1, b2)
    }

    #[test]
    fn unlocked_replica_votes_for_anything() {
        let (store, _, b2) = chain();
        assert!(safety_rule(&b2, None, None, &store));
    }

    #[test]
    fn block_extending_the_locked_block_is_safe() {
        let (store, b1, b2) = chain();
        let locked = qc(Phase::PreCommit, 3, b1.height.int());

        assert!(safety_rule(&b2, Some(&qc(Phase::Prepare, 2, 0)), Some(&locked), &store));
    }

    #[test]
    fn conflicting_block_with_stale_justify_is_unsafe() {
        let (store, _, b2) = chain();
        // Locked on b2, but the proposal forks off b1 with a justify from before the lock.
        let locked = qc(Phase::PreCommit, 3, b2.height.int());
        let fork = Block::new(
            store.block(BlockHeight::new(1)).unwrap(),
            String::from("fork"),
            ReplicaID::new(3),
            None,
        );

        assert!(!safety_rule(&fork, Some(&qc(Phase::Prepare, 3, 1)), Some(&locked), &store));
        assert!(!safety_rule(&fork, None, Some(&locked), &store));
    }

    #[test]
    fn newer_justify_overrides_the_lock() {
        let (store, _, b2) = chain();
        let locked = qc(Phase::PreCommit, 3, b2.height.int());
        let fork = Block::new(
            store.block(BlockHeight::new(1)).unwrap(),
            String::from("fork"),
            ReplicaID::new(3),
            None,
        );

        assert!(safety_rule(&fork, Some(&qc(Phase::Prepare, 4, 1)), Some(&locked), &store));
    }

    #[test]
    fn extension_is_checked_one_hop_only() {
        let (store, b1, b2) = chain();
        let b3 = Block::new(&b2, String::from("b3"), ReplicaID::new(3), None);

        assert!(extends(&b2, b1.height, &store));
        // b3 descends from b1, but only through b2.
        assert!(!extends(&b3, b1.height, &store));
    }

    #[test]
    fn unknown_parent_does_not_extend() {
        let (_, _, b2) = chain();
        let empty = BlockStore::new();
        assert!(!extends(&b2, BlockHeight::new(1), &empty));
    }

    #[test]
    fn matching_qc_checks_phase_view_and_quorum() {
        let prepare_qc = qc(Phase::Prepare, 5, 2);

        assert!(matching_qc(&prepare_qc, Phase::Prepare, ViewNumber::new(5), 3));
        assert!(!matching_qc(&prepare_qc, Phase::PreCommit, ViewNumber::new(5), 3));
        assert!(!matching_qc(&prepare_qc, Phase::Prepare, ViewNumber::new(6), 3));
        assert!(!matching_qc(&prepare_qc, Phase::Prepare, ViewNumber::new(5), 4));
    }
}
