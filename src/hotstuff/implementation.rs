/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Event-driven implementation of the four-phase HotStuff protocol.
//!
//! Main type: [`HotStuff`].

use std::{
    collections::VecDeque,
    sync::mpsc::Sender,
    time::{Duration, SystemTime},
};

use crate::{
    block_store::{BlockStore, BlockStoreError},
    events::{
        CollectQCEvent, CommitBlockEvent, Event, InsertBlockEvent, NudgeEvent, ProposeEvent,
        ReceiveNudgeEvent, ReceiveProposalEvent, ReceiveVoteEvent, StartViewEvent,
        UpdateLockedQCEvent, UpdatePrepareQCEvent, VoteEvent,
    },
    hotstuff::{
        messages::{HotStuffMessage, Nudge, Proposal, Vote},
        phase::ReplicaPhase,
        safety::{matching_qc, safety_rule},
        voting::VoteCollector,
    },
    leader_schedule::LeaderSchedule,
    networking::{network::Network, sending::SenderHandle},
    pacemaker::{new_view::NewViewCollector, timer::ViewTimer},
    types::{
        block::Block,
        certificates::{Phase, QuorumCertificate},
        data_types::{BlockHeight, ReplicaID, ViewNumber},
        replica_set::ReplicaSet,
    },
};

/// A single participant in the HotStuff protocol.
///
/// # Usage
///
/// The `HotStuff` struct is meant to be used in an "event-oriented" fashion. Its crate-public methods
/// are handlers, to be called by the [algorithm thread](crate::algorithm) when specific things happen to
/// the replica:
/// 1. [`on_receive_msg`](Self::on_receive_msg): a [`HotStuffMessage`] arrived.
/// 2. [`on_receive_vote`](Self::on_receive_vote): a [`Vote`] arrived.
/// 3. [`propose`](Self::propose): the user submitted a command.
/// 4. [`on_timeout`](Self::on_timeout): [`is_view_timed_out`](Self::is_view_timed_out) returned true.
///
/// The view-change half of the protocol lives in [`view_change`](super::view_change).
///
/// Errors are only returned for invariant violations. Messages that are invalid, stale, or unsafe to act
/// on are dropped and the handler returns `Ok(())`.
pub(crate) struct HotStuff<N: Network, L: LeaderSchedule> {
    pub(super) config: HotStuffConfiguration,
    pub(super) view: ViewNumber,
    pub(super) phase: ReplicaPhase,
    pub(super) prepare_qc: QuorumCertificate,
    pub(super) locked_qc: Option<QuorumCertificate>,
    /// The latest (view, phase) this replica voted in, or proposed in as a leader.
    pub(super) last_vote: Option<(ViewNumber, Phase)>,
    pub(super) block_store: BlockStore,
    pub(super) votes: Option<VoteCollector>,
    pub(super) new_views: NewViewCollector,
    pub(super) timer: ViewTimer,
    pub(super) pending_commands: VecDeque<String>,
    /// The submitted command this replica proposed in the current view. It goes back to the front of
    /// `pending_commands` if the replica leaves the view without committing it.
    pub(super) proposed_command: Option<String>,
    pub(super) leader_schedule: L,
    pub(super) sender_handle: SenderHandle<N>,
    pub(super) event_publisher: Option<Sender<Event>>,
}

impl<N: Network, L: LeaderSchedule> HotStuff<N, L> {
    /// Create a replica in the `NewView` phase of the first view, holding only the genesis block.
    pub(crate) fn new(
        config: HotStuffConfiguration,
        leader_schedule: L,
        sender_handle: SenderHandle<N>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        let view = ViewNumber::init();
        let hotstuff = Self {
            prepare_qc: QuorumCertificate::genesis_qc(&config.replica_set),
            new_views: NewViewCollector::new(config.replica_set.quorum_size()),
            timer: ViewTimer::new(config.view_timeout),
            config,
            view,
            phase: ReplicaPhase::NewView,
            locked_qc: None,
            last_vote: None,
            block_store: BlockStore::new(),
            votes: None,
            pending_commands: VecDeque::new(),
            proposed_command: None,
            leader_schedule,
            sender_handle,
            event_publisher,
        };

        Event::StartView(StartViewEvent {
            timestamp: SystemTime::now(),
            leader: hotstuff.leader_schedule.leader(view),
            view,
        })
        .publish(&hotstuff.event_publisher);

        hotstuff
    }

    pub(crate) fn view(&self) -> ViewNumber {
        self.view
    }

    pub(crate) fn phase(&self) -> ReplicaPhase {
        self.phase
    }

    pub(crate) fn block_store(&self) -> &BlockStore {
        &self.block_store
    }

    pub(crate) fn is_view_timed_out(&self) -> bool {
        self.timer.is_stale()
    }

    /// Submit `command` for inclusion in the chain.
    ///
    /// If this replica leads the current view and has not proposed in it yet, `command` is proposed right
    /// away, extending the block referenced by `prepareQC`. Otherwise, it is queued and proposed the next
    /// time this replica starts a view from `NewView` evidence.
    pub(crate) fn propose(&mut self, command: String) {
        if self.leader_schedule.leader(self.view) == self.config.me
            && self.phase == ReplicaPhase::NewView
            && !self.timer.is_stale()
        {
            let justify = self.prepare_qc.clone();
            let parent = self.choose_parent(&justify);
            self.propose_block(&parent, command.clone(), Some(justify));
            self.proposed_command = Some(command);
        } else {
            log::debug!(
                "Replica {} queued a command in view {} ({})",
                self.config.me,
                self.view,
                self.phase
            );
            self.pending_commands.push_back(command);
        }
    }

    /// Process a newly received message.
    pub(crate) fn on_receive_msg(&mut self, msg: HotStuffMessage) -> Result<(), HotStuffError> {
        match msg {
            HotStuffMessage::NewView(new_view) => {
                self.on_receive_new_view(new_view);
                Ok(())
            }
            HotStuffMessage::Prepare(proposal) => {
                self.on_receive_proposal(proposal);
                Ok(())
            }
            HotStuffMessage::PreCommit(nudge) => self.on_receive_nudge(nudge, Phase::Prepare),
            HotStuffMessage::Commit(nudge) => self.on_receive_nudge(nudge, Phase::PreCommit),
            HotStuffMessage::Decide(nudge) => self.on_receive_nudge(nudge, Phase::Commit),
        }
    }

    /// Process a newly received `proposal` as a follower. Votes `Prepare` for the proposed block if:
    /// 1. The proposal is for the current or a later view, and comes from that view's leader.
    /// 2. The block is well-formed and carries the proposal's justification.
    /// 3. The replica has not voted in this view yet, and has not committed a block at this height.
    /// 4. The block passes the [safety rule](super::safety::safety_rule).
    fn on_receive_proposal(&mut self, proposal: Proposal) {
        Event::ReceiveProposal(ReceiveProposalEvent {
            timestamp: SystemTime::now(),
            origin: proposal.sender,
            proposal: proposal.clone(),
        })
        .publish(&self.event_publisher);

        if self.timer.is_stale() || proposal.view < self.view {
            log::trace!(
                "Replica {} dropped a stale proposal for view {}",
                self.config.me,
                proposal.view
            );
            return;
        }

        if proposal.sender != self.leader_schedule.leader(proposal.view)
            || proposal.sender == self.config.me
        {
            log::debug!(
                "Replica {} dropped a proposal from {}, who does not lead view {}",
                self.config.me,
                proposal.sender,
                proposal.view
            );
            return;
        }

        let block = &proposal.block;
        if !block.is_correct()
            || block.proposer != Some(proposal.sender)
            || block.justify != proposal.justify
            || proposal
                .justify
                .as_ref()
                .is_some_and(|justify| !justify.has_quorum(self.config.replica_set.quorum_size()))
        {
            log::debug!(
                "Replica {} dropped a malformed proposal for view {}",
                self.config.me,
                proposal.view
            );
            return;
        }

        if self.has_voted(proposal.view, Phase::Prepare) {
            log::debug!(
                "Replica {} already voted in view {}, dropped a second proposal",
                self.config.me,
                proposal.view
            );
            return;
        }

        if self.block_store.is_committed(block.height) {
            log::debug!(
                "Replica {} dropped a proposal for committed height {}",
                self.config.me,
                block.height
            );
            return;
        }

        if !safety_rule(
            block,
            proposal.justify.as_ref(),
            self.locked_qc.as_ref(),
            &self.block_store,
        ) {
            log::debug!(
                "Replica {} dropped an unsafe proposal for view {}",
                self.config.me,
                proposal.view
            );
            return;
        }

        self.set_view(proposal.view);
        self.timer.reset();
        self.votes = None;
        self.store_block(block);
        self.vote(Phase::Prepare, proposal.view, block.height);
    }

    /// Process a newly received `nudge` whose justification should be a `justify_phase` certificate, i.e.,
    /// a `PreCommit` (`justify_phase` = `Prepare`), `Commit` (`PreCommit`), or `Decide` (`Commit`) message.
    fn on_receive_nudge(&mut self, nudge: Nudge, justify_phase: Phase) -> Result<(), HotStuffError> {
        Event::ReceiveNudge(ReceiveNudgeEvent {
            timestamp: SystemTime::now(),
            origin: nudge.sender,
            nudge: nudge.clone(),
        })
        .publish(&self.event_publisher);

        if self.timer.is_stale() || nudge.view < self.view {
            log::trace!(
                "Replica {} dropped a stale {:?} certificate for view {}",
                self.config.me,
                justify_phase,
                nudge.view
            );
            return Ok(());
        }

        if nudge.sender != self.leader_schedule.leader(nudge.view) || nudge.sender == self.config.me {
            log::debug!(
                "Replica {} dropped a certificate from {}, who does not lead view {}",
                self.config.me,
                nudge.sender,
                nudge.view
            );
            return Ok(());
        }

        if !matching_qc(
            &nudge.justify,
            justify_phase,
            nudge.view,
            self.config.replica_set.quorum_size(),
        ) || nudge.justify.block != nudge.block.height
            || !nudge.block.is_correct()
        {
            log::debug!(
                "Replica {} dropped a certificate that does not match view {}",
                self.config.me,
                nudge.view
            );
            return Ok(());
        }

        let vote_phase = match justify_phase {
            Phase::Prepare => Some(Phase::PreCommit),
            Phase::PreCommit => Some(Phase::Commit),
            Phase::Commit => None,
        };
        if let Some(vote_phase) = vote_phase {
            if self.has_voted(nudge.view, vote_phase) {
                return Ok(());
            }
        }

        self.set_view(nudge.view);
        self.timer.reset();
        if !self.block_store.is_committed(nudge.block.height) {
            self.store_block(&nudge.block);
        }

        match justify_phase {
            Phase::Prepare => {
                self.update_prepare_qc(nudge.justify);
                self.vote(Phase::PreCommit, nudge.view, nudge.block.height);
            }
            Phase::PreCommit => {
                self.update_locked_qc(nudge.justify);
                self.vote(Phase::Commit, nudge.view, nudge.block.height);
            }
            Phase::Commit => {
                self.phase = ReplicaPhase::Decide;
                self.commit(&nudge.block, nudge.view)?;
                self.leave_view();
            }
        }

        Ok(())
    }

    /// Process a newly received vote. Only the leader of the current view collects votes, and only those
    /// of the phase it is currently in.
    pub(crate) fn on_receive_vote(&mut self, vote: Vote) -> Result<(), HotStuffError> {
        Event::ReceiveVote(ReceiveVoteEvent {
            timestamp: SystemTime::now(),
            origin: vote.sender,
            vote,
        })
        .publish(&self.event_publisher);

        if self.leader_schedule.leader(vote.view) != self.config.me
            || vote.view != self.view
            || self.phase.collects() != Some(vote.phase)
        {
            log::trace!(
                "Replica {} dropped a {:?} vote from {} for view {}",
                self.config.me,
                vote.phase,
                vote.sender,
                vote.view
            );
            return Ok(());
        }

        let qc = match self.votes.as_mut() {
            Some(votes) => votes.collect(&vote),
            None => None,
        };
        match qc {
            Some(qc) => self.on_quorum(qc),
            None => Ok(()),
        }
    }

    /// Act on a certificate this replica collected as leader: apply it locally, then move every replica
    /// to the next phase.
    fn on_quorum(&mut self, qc: QuorumCertificate) -> Result<(), HotStuffError> {
        if self.timer.is_stale() {
            return Ok(());
        }
        self.timer.reset();

        Event::CollectQC(CollectQCEvent {
            timestamp: SystemTime::now(),
            quorum_certificate: qc.clone(),
        })
        .publish(&self.event_publisher);

        let block = self
            .block_store
            .uncommitted_block(qc.block)
            .cloned()
            .ok_or(BlockStoreError::BlockExpectedButNotFound { height: qc.block })?;

        if let Some(next_phase) = self.phase.after_quorum() {
            self.phase = next_phase;
        }

        match qc.phase {
            Phase::Prepare => {
                self.update_prepare_qc(qc.clone());
                self.collect_votes(Phase::PreCommit, block.height);
                self.broadcast_nudge(HotStuffMessage::PreCommit, block, qc);
            }
            Phase::PreCommit => {
                self.update_locked_qc(qc.clone());
                self.collect_votes(Phase::Commit, block.height);
                self.broadcast_nudge(HotStuffMessage::Commit, block, qc);
            }
            Phase::Commit => {
                self.votes = None;
                self.broadcast_nudge(HotStuffMessage::Decide, block.clone(), qc);
                self.commit(&block, self.view)?;
                self.proposed_command = None;
                self.leave_view();
            }
        }

        Ok(())
    }

    /// Propose a block carrying `command` that extends `parent`, and start collecting `Prepare` votes for
    /// it.
    pub(super) fn propose_block(
        &mut self,
        parent: &Block,
        command: String,
        justify: Option<QuorumCertificate>,
    ) {
        let me = self.config.me;
        let block = Block::new(parent, command, me, justify.clone());
        self.store_block(&block);

        self.phase = ReplicaPhase::Prepare;
        self.last_vote = Some((self.view, Phase::Prepare));
        self.collect_votes(Phase::Prepare, block.height);

        // Followers check the sender against the schedule, so it must name this replica before they
        // can see the proposal.
        self.leader_schedule.record_leadership(self.view, me);

        let proposal = Proposal {
            view: self.view,
            block,
            justify,
            sender: me,
        };
        self.sender_handle
            .broadcast::<HotStuffMessage>(proposal.clone().into());
        Event::Propose(ProposeEvent {
            timestamp: SystemTime::now(),
            proposal,
        })
        .publish(&self.event_publisher);

        self.timer.reset();
    }

    /// The block a leader should extend when its highest certificate is `qc`: the certified block if it is
    /// known and not below the committed tip, or the highest committed block otherwise.
    pub(super) fn choose_parent(&self, qc: &QuorumCertificate) -> Block {
        let highest_committed = self.block_store.highest_committed();
        match self.block_store.block(qc.block) {
            Some(block) if block.height >= highest_committed.height => block.clone(),
            _ => highest_committed.clone(),
        }
    }

    /// Enter `view`, if it is not the current view. A command this replica proposed in the view it is
    /// leaving, and did not commit, is queued again.
    pub(super) fn set_view(&mut self, view: ViewNumber) {
        if view == self.view {
            return;
        }
        if let Some(command) = self.proposed_command.take() {
            log::debug!(
                "Replica {} left view {} without committing {}, queued it again",
                self.config.me,
                self.view,
                command
            );
            self.pending_commands.push_front(command);
        }
        self.view = view;
        self.new_views.discard_below(view);
        Event::StartView(StartViewEvent {
            timestamp: SystemTime::now(),
            leader: self.leader_schedule.leader(view),
            view,
        })
        .publish(&self.event_publisher);
    }

    pub(super) fn update_prepare_qc(&mut self, qc: QuorumCertificate) {
        self.prepare_qc = qc.clone();
        Event::UpdatePrepareQC(UpdatePrepareQCEvent {
            timestamp: SystemTime::now(),
            prepare_qc: qc,
        })
        .publish(&self.event_publisher);
    }

    /// Lock on `qc`, unless the replica is already locked on a certificate from a later view.
    pub(super) fn update_locked_qc(&mut self, qc: QuorumCertificate) {
        if self
            .locked_qc
            .as_ref()
            .is_some_and(|locked_qc| qc.view < locked_qc.view)
        {
            return;
        }
        self.locked_qc = Some(qc.clone());
        Event::UpdateLockedQC(UpdateLockedQCEvent {
            timestamp: SystemTime::now(),
            locked_qc: qc,
        })
        .publish(&self.event_publisher);
    }

    fn has_voted(&self, view: ViewNumber, phase: Phase) -> bool {
        self.last_vote
            .is_some_and(|last_vote| last_vote >= (view, phase))
    }

    fn vote(&mut self, phase: Phase, view: ViewNumber, block: BlockHeight) {
        let vote = Vote {
            phase,
            view,
            block,
            sender: self.config.me,
        };
        self.last_vote = Some((view, phase));
        self.phase = ReplicaPhase::voted(phase);
        self.sender_handle
            .send(self.leader_schedule.leader(view), vote);
        Event::Vote(VoteEvent {
            timestamp: SystemTime::now(),
            vote,
        })
        .publish(&self.event_publisher);
    }

    fn collect_votes(&mut self, phase: Phase, block: BlockHeight) {
        self.votes = Some(VoteCollector::new(
            self.config.me,
            phase,
            self.view,
            block,
            self.config.replica_set,
        ));
    }

    fn broadcast_nudge(
        &mut self,
        variant: fn(Nudge) -> HotStuffMessage,
        block: Block,
        justify: QuorumCertificate,
    ) {
        let nudge = Nudge {
            view: self.view,
            block,
            justify,
            sender: self.config.me,
        };
        self.sender_handle.broadcast(variant(nudge.clone()));
        Event::Nudge(NudgeEvent {
            timestamp: SystemTime::now(),
            nudge,
        })
        .publish(&self.event_publisher);
    }

    fn store_block(&mut self, block: &Block) {
        if self.block_store.block(block.height) == Some(block) {
            return;
        }
        if self.block_store.insert_uncommitted(block.clone()) {
            Event::InsertBlock(InsertBlockEvent {
                timestamp: SystemTime::now(),
                block: block.clone(),
            })
            .publish(&self.event_publisher);
        }
    }

    fn commit(&mut self, block: &Block, view: ViewNumber) -> Result<(), HotStuffError> {
        if self.block_store.commit(block)? {
            log::debug!(
                "Replica {} committed block {} ({}) in view {}",
                self.config.me,
                block.height,
                block.command,
                view
            );
            Event::CommitBlock(CommitBlockEvent {
                timestamp: SystemTime::now(),
                block: block.clone(),
                view,
            })
            .publish(&self.event_publisher);
        }
        Ok(())
    }
}

/// Immutable parameters that determine how a replica participates in the protocol.
#[derive(Clone, Copy)]
pub(crate) struct HotStuffConfiguration {
    pub(crate) me: ReplicaID,
    pub(crate) replica_set: ReplicaSet,
    /// How long a view may go without progress before the replica gives up on it.
    pub(crate) view_timeout: Duration,
}

/// The different ways a call to a method of the `HotStuff` struct can fail.
#[derive(Debug, PartialEq, Eq)]
pub enum HotStuffError {
    BlockStoreError(BlockStoreError),
}

impl From<BlockStoreError> for HotStuffError {
    fn from(value: BlockStoreError) -> Self {
        HotStuffError::BlockStoreError(value)
    }
}
