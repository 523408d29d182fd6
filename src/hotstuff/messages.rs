/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Messages sent between replicas as part of the HotStuff subprotocol.
//!
//! Protocol messages travel in a replica's message mailbox, and are tagged by the phase that they
//! announce. [`Vote`]s travel in the separate vote mailbox, and are only ever consumed by the leader of
//! the view they were cast in.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    block::Block,
    certificates::{Phase, QuorumCertificate},
    data_types::{BlockHeight, ReplicaID, ViewNumber},
};

/// A protocol message, tagged by the phase it announces.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum HotStuffMessage {
    /// Sent to the next leader when a replica leaves a view.
    NewView(NewView),
    /// Broadcast by the leader to propose a new block.
    Prepare(Proposal),
    /// Broadcast by the leader once it has collected a `Prepare` certificate.
    PreCommit(Nudge),
    /// Broadcast by the leader once it has collected a `PreCommit` certificate.
    Commit(Nudge),
    /// Broadcast by the leader once it has collected a `Commit` certificate.
    Decide(Nudge),
}

impl HotStuffMessage {
    pub fn view(&self) -> ViewNumber {
        match self {
            HotStuffMessage::NewView(new_view) => new_view.view,
            HotStuffMessage::Prepare(proposal) => proposal.view,
            HotStuffMessage::PreCommit(nudge)
            | HotStuffMessage::Commit(nudge)
            | HotStuffMessage::Decide(nudge) => nudge.view,
        }
    }

    pub fn sender(&self) -> ReplicaID {
        match self {
            HotStuffMessage::NewView(new_view) => new_view.sender,
            HotStuffMessage::Prepare(proposal) => proposal.sender,
            HotStuffMessage::PreCommit(nudge)
            | HotStuffMessage::Commit(nudge)
            | HotStuffMessage::Decide(nudge) => nudge.sender,
        }
    }
}

impl From<Proposal> for HotStuffMessage {
    fn from(proposal: Proposal) -> Self {
        HotStuffMessage::Prepare(proposal)
    }
}

impl From<NewView> for HotStuffMessage {
    fn from(new_view: NewView) -> Self {
        HotStuffMessage::NewView(new_view)
    }
}

/// Proposal of a new `block` in `view`, justified by the highest certificate the leader knows of.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Proposal {
    pub view: ViewNumber,
    pub block: Block,
    pub justify: Option<QuorumCertificate>,
    pub sender: ReplicaID,
}

/// Announces that the leader collected `justify` for `block` in `view`, moving its followers to the next
/// phase.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Nudge {
    pub view: ViewNumber,
    pub block: Block,
    pub justify: QuorumCertificate,
    pub sender: ReplicaID,
}

/// Evidence that `sender` has entered `view`, carrying its `prepareQC`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct NewView {
    pub view: ViewNumber,
    pub justify: QuorumCertificate,
    pub sender: ReplicaID,
}

/// A replica's endorsement of the block at `block` in `phase` of `view`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Vote {
    pub phase: Phase,
    pub view: ViewNumber,
    pub block: BlockHeight,
    pub sender: ReplicaID,
}
