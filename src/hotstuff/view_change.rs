/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Leaving views and starting new ones.
//!
//! A replica leaves its current view either because the block of the view was committed, or because the
//! view made no progress for a full timeout. In both cases it moves to the next view, enters the
//! `NewView` phase, and sends its `prepareQC` in a [`NewView`] message to the
//! [next leader](crate::leader_schedule::LeaderSchedule::next_leader).
//!
//! The next leader collects these messages, including its own. Once it has a quorum of them for a view
//! that it has not proposed in yet, it starts that view by proposing a block that extends the highest
//! certificate among them.

use std::time::SystemTime;

use crate::{
    events::{Event, NewViewEvent, ReceiveNewViewEvent, ViewTimeoutEvent},
    hotstuff::{messages::NewView, phase::ReplicaPhase},
    leader_schedule::LeaderSchedule,
    networking::network::Network,
    types::data_types::ViewNumber,
};

use super::{implementation::HotStuff, messages::HotStuffMessage};

impl<N: Network, L: LeaderSchedule> HotStuff<N, L> {
    /// Give up on the current view if it has made no progress for a full timeout.
    pub(crate) fn on_timeout(&mut self) {
        if !self.timer.is_stale() {
            return;
        }

        log::debug!(
            "Replica {} timed out in view {} ({})",
            self.config.me,
            self.view,
            self.phase
        );
        Event::ViewTimeout(ViewTimeoutEvent {
            timestamp: SystemTime::now(),
            view: self.view,
            timeout: self.timer.timeout(),
        })
        .publish(&self.event_publisher);

        self.leave_view();
    }

    /// Move to the `NewView` phase of the next view, and send `NewView` evidence to its leader.
    pub(super) fn leave_view(&mut self) {
        let old_view = self.view;
        self.set_view(old_view + 1);
        self.phase = ReplicaPhase::NewView;
        self.votes = None;
        self.timer.reset();
        self.send_new_view(old_view);
    }

    fn send_new_view(&mut self, old_view: ViewNumber) {
        let new_view = NewView {
            view: self.view,
            justify: self.prepare_qc.clone(),
            sender: self.config.me,
        };
        let recipient = self.leader_schedule.next_leader(old_view);

        Event::NewView(NewViewEvent {
            timestamp: SystemTime::now(),
            new_view: new_view.clone(),
        })
        .publish(&self.event_publisher);

        if recipient == self.config.me {
            self.new_views
                .collect(new_view.view, new_view.sender, new_view.justify);
            self.try_start_new_view(self.view);
        } else {
            self.sender_handle
                .send::<HotStuffMessage>(recipient, new_view.into());
        }
    }

    /// Collect `new_view` if this replica is the leader it is addressed to.
    ///
    /// Evidence for a future view is kept, since the messages a replica's peers send on leaving a view can
    /// arrive before the replica leaves the view itself. Evidence for the current view is only accepted
    /// while the replica has not proposed in it yet.
    pub(super) fn on_receive_new_view(&mut self, new_view: NewView) {
        Event::ReceiveNewView(ReceiveNewViewEvent {
            timestamp: SystemTime::now(),
            origin: new_view.sender,
            new_view: new_view.clone(),
        })
        .publish(&self.event_publisher);

        // The first view is never entered through NewView messages.
        if new_view.view <= ViewNumber::init()
            || new_view.view < self.view
            || (new_view.view == self.view && self.phase != ReplicaPhase::NewView)
        {
            log::trace!(
                "Replica {} dropped a stale NewView for view {} from {}",
                self.config.me,
                new_view.view,
                new_view.sender
            );
            return;
        }

        let previous_view = ViewNumber::new(new_view.view.int() - 1);
        if self.leader_schedule.next_leader(previous_view) != self.config.me
            || !self.config.replica_set.contains(new_view.sender)
        {
            log::debug!(
                "Replica {} dropped a NewView for view {} it does not lead",
                self.config.me,
                new_view.view
            );
            return;
        }

        let collected = self
            .new_views
            .collect(new_view.view, new_view.sender, new_view.justify);
        log::trace!(
            "Replica {} has {} NewView messages for view {}",
            self.config.me,
            collected,
            new_view.view
        );

        self.try_start_new_view(new_view.view);
    }

    fn try_start_new_view(&mut self, view: ViewNumber) {
        if view < self.view || (view == self.view && self.phase != ReplicaPhase::NewView) {
            return;
        }
        if self.new_views.has_quorum(view) && !self.timer.is_stale() {
            self.start_new_view_consensus(view);
        }
    }

    /// Start `view` as its leader: adopt the highest certificate in the `NewView` evidence if it is higher
    /// than `prepareQC`, then propose the oldest queued command, or a filler command if there is none.
    /// Filler commands are never queued again.
    fn start_new_view_consensus(&mut self, view: ViewNumber) {
        self.timer.reset();
        self.set_view(view);

        if let Some(highest_qc) = self.new_views.take_highest_qc(view) {
            if (highest_qc.view, highest_qc.block) > (self.prepare_qc.view, self.prepare_qc.block) {
                self.update_prepare_qc(highest_qc);
            }
        }

        let justify = self.prepare_qc.clone();
        let parent = self.choose_parent(&justify);

        log::debug!(
            "Replica {} starts view {} extending block {}",
            self.config.me,
            view,
            parent.height
        );
        match self.pending_commands.pop_front() {
            Some(command) => {
                self.propose_block(&parent, command.clone(), Some(justify));
                self.proposed_command = Some(command);
            }
            None => self.propose_block(&parent, format!("empty-{}", view), Some(justify)),
        }
    }
}
