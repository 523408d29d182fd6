/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definition of the [QuorumCertificate] type, the evidence that a quorum of replicas endorsed a block
//! in a given [Phase] of a given view, and of the [Phase] tag it carries.
//!
//! Signatures are approximated: a certificate lists the IDs of the replicas that endorsed the block
//! instead of carrying (threshold) signatures.

use std::collections::BTreeSet;

use borsh::{BorshDeserialize, BorshSerialize};

use super::{
    data_types::{BlockHeight, ReplicaID, ViewNumber},
    replica_set::ReplicaSet,
};

/// The voting phase that a [Vote](crate::hotstuff::messages::Vote) or a [QuorumCertificate] belongs to.
///
/// The Decide step has no votes of its own: it is announced with a `Commit` certificate. Phases are
/// ordered in the order a view goes through them.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub enum Phase {
    Prepare,
    PreCommit,
    Commit,
}

/// Proof that at least a quorum of replicas have voted for `block` in `phase` of `view`.
///
/// Immutable once constructed. A certificate built by this crate always has at least
/// [`quorum_size`](ReplicaSet::quorum_size) signers.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct QuorumCertificate {
    pub phase: Phase,
    pub view: ViewNumber,
    pub block: BlockHeight,
    pub signers: BTreeSet<ReplicaID>,
}

impl QuorumCertificate {
    pub fn new(
        phase: Phase,
        view: ViewNumber,
        block: BlockHeight,
        signers: BTreeSet<ReplicaID>,
    ) -> QuorumCertificate {
        QuorumCertificate {
            phase,
            view,
            block,
            signers,
        }
    }

    /// The trivial certificate every replica starts with: a `Prepare` certificate for the genesis block in
    /// view 0, signed by every replica in `replica_set`.
    pub fn genesis_qc(replica_set: &ReplicaSet) -> QuorumCertificate {
        QuorumCertificate {
            phase: Phase::Prepare,
            view: ViewNumber::genesis(),
            block: BlockHeight::genesis(),
            signers: replica_set.ids().collect(),
        }
    }

    pub fn is_genesis_qc(&self) -> bool {
        self.view == ViewNumber::genesis() && self.block == BlockHeight::genesis()
    }

    /// Whether the certificate has at least `quorum_size` distinct signers.
    pub fn has_quorum(&self, quorum_size: usize) -> bool {
        self.signers.len() >= quorum_size
    }
}
