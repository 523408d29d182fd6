/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Aggregation of [`Vote`]s into a [`QuorumCertificate`] by the leader of a view.

use std::collections::BTreeSet;

use crate::types::{
    certificates::{Phase, QuorumCertificate},
    data_types::{BlockHeight, ReplicaID, ViewNumber},
    replica_set::ReplicaSet,
};

use super::messages::Vote;

/// Collects the votes of a single phase of a single view for a single block.
///
/// The leader's own vote is implicit: it counts towards the quorum and is always among the signers of
/// the certificate, but is never collected. Each follower is counted at most once.
pub(crate) struct VoteCollector {
    leader: ReplicaID,
    phase: Phase,
    view: ViewNumber,
    block: BlockHeight,
    replica_set: ReplicaSet,
    voters: BTreeSet<ReplicaID>,
    collected: bool,
}

impl VoteCollector {
    pub(crate) fn new(
        leader: ReplicaID,
        phase: Phase,
        view: ViewNumber,
        block: BlockHeight,
        replica_set: ReplicaSet,
    ) -> Self {
        Self {
            leader,
            phase,
            view,
            block,
            replica_set,
            voters: BTreeSet::new(),
            collected: false,
        }
    }

    /// Collect `vote`. Returns a certificate the first time the votes collected so far, plus the leader's
    /// implicit vote, reach a quorum.
    ///
    /// Votes for a different phase, view, or block, votes from outside the replica set, and repeated votes
    /// from the same sender are ignored.
    pub(crate) fn collect(&mut self, vote: &Vote) -> Option<QuorumCertificate> {
        if self.collected
            || vote.phase != self.phase
            || vote.view != self.view
            || vote.block != self.block
            || vote.sender == self.leader
            || !self.replica_set.contains(vote.sender)
        {
            return None;
        }

        if !self.voters.insert(vote.sender) {
            return None;
        }

        if self.voters.len() + 1 >= self.replica_set.quorum_size() {
            self.collected = true;
            let mut signers = self.voters.clone();
            signers.insert(self.leader);
            return Some(QuorumCertificate::new(
                self.phase, self.view, self.block, signers,
            ));
        }

        None
    }

    /// Number of distinct followers that voted so far.
    #[cfg(test)]
    pub(crate) fn count(&self) -> usize {
        self.voters.len()
    }
}
