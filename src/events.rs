/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Events that a replica publishes for event handling and logging.
//!
//! An event for a given action indicates that the action has been completed. Every event carries the
//! time at which it was emitted.
//!
//! Events are passed from the algorithm thread to the event bus thread through a channel, and the event
//! bus fires the handlers registered in the [replica's spec](crate::replica::ReplicaSpec) for them.

use std::sync::mpsc::Sender;
use std::time::{Duration, SystemTime};

use crate::hotstuff::messages::{NewView, Nudge, Proposal, Vote};
use crate::types::{
    block::Block,
    certificates::QuorumCertificate,
    data_types::{ReplicaID, ViewNumber},
};

pub enum Event {
    // Events that change the replica's state.
    InsertBlock(InsertBlockEvent),
    CommitBlock(CommitBlockEvent),
    UpdatePrepareQC(UpdatePrepareQCEvent),
    UpdateLockedQC(UpdateLockedQCEvent),
    // Events that involve broadcasting/sending a message.
    Propose(ProposeEvent),
    Nudge(NudgeEvent),
    Vote(VoteEvent),
    NewView(NewViewEvent),
    // Events that involve receiving a message.
    ReceiveProposal(ReceiveProposalEvent),
    ReceiveNudge(ReceiveNudgeEvent),
    ReceiveVote(ReceiveVoteEvent),
    ReceiveNewView(ReceiveNewViewEvent),
    // View change events.
    StartView(StartViewEvent),
    ViewTimeout(ViewTimeoutEvent),
    CollectQC(CollectQCEvent),
}

impl Event {
    /// Send the event to the event bus, if there is one.
    ///
    /// An event bus that has already stopped is not an error: the event is discarded.
    pub(crate) fn publish(self, event_publisher: &Option<Sender<Event>>) {
        if let Some(event_publisher) = event_publisher {
            let _ = event_publisher.send(self);
        }
    }
}

/// A block was added to the replica's uncommitted blocks.
pub struct InsertBlockEvent {
    pub timestamp: SystemTime,
    pub block: Block,
}

/// A block was appended to the replica's committed log in `view`.
pub struct CommitBlockEvent {
    pub timestamp: SystemTime,
    pub block: Block,
    pub view: ViewNumber,
}

pub struct UpdatePrepareQCEvent {
    pub timestamp: SystemTime,
    pub prepare_qc: QuorumCertificate,
}

pub struct UpdateLockedQCEvent {
    pub timestamp: SystemTime,
    pub locked_qc: QuorumCertificate,
}

pub struct ProposeEvent {
    pub timestamp: SystemTime,
    pub proposal: Proposal,
}

pub struct NudgeEvent {
    pub timestamp: SystemTime,
    pub nudge: Nudge,
}

pub struct VoteEvent {
    pub timestamp: SystemTime,
    pub vote: Vote,
}

pub struct NewViewEvent {
    pub timestamp: SystemTime,
    pub new_view: NewView,
}

pub struct ReceiveProposalEvent {
    pub timestamp: SystemTime,
    pub origin: ReplicaID,
    pub proposal: Proposal,
}

pub struct ReceiveNudgeEvent {
    pub timestamp: SystemTime,
    pub origin: ReplicaID,
    pub nudge: Nudge,
}

pub struct ReceiveVoteEvent {
    pub timestamp: SystemTime,
    pub origin: ReplicaID,
    pub vote: Vote,
}

pub struct ReceiveNewViewEvent {
    pub timestamp: SystemTime,
    pub origin: ReplicaID,
    pub new_view: NewView,
}

/// The replica entered `view`, whose leader is `leader`.
pub struct StartViewEvent {
    pub timestamp: SystemTime,
    pub leader: ReplicaID,
    pub view: ViewNumber,
}

/// The replica gave up on `view` after making no progress in it for `timeout`.
pub struct ViewTimeoutEvent {
    pub timestamp: SystemTime,
    pub view: ViewNumber,
    pub timeout: Duration,
}

/// The replica, as leader, collected a quorum of votes into `quorum_certificate`.
pub struct CollectQCEvent {
    pub timestamp: SystemTime,
    pub quorum_certificate: QuorumCertificate,
}
