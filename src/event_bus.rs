//! The thread that fires the handlers registered for the events the algorithm thread publishes.

use crate::events::*;
use crate::logging::Logger;
use crate::types::data_types::ReplicaID;
use std::sync::mpsc::Receiver;
use std::thread;
use std::thread::JoinHandle;

pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

pub(crate) struct EventHandlers {
    pub(crate) insert_block_handlers: Vec<HandlerPtr<InsertBlockEvent>>,
    pub(crate) commit_block_handlers: Vec<HandlerPtr<CommitBlockEvent>>,
    pub(crate) update_prepare_qc_handlers: Vec<HandlerPtr<UpdatePrepareQCEvent>>,
    pub(crate) update_locked_qc_handlers: Vec<HandlerPtr<UpdateLockedQCEvent>>,
    pub(crate) propose_handlers: Vec<HandlerPtr<ProposeEvent>>,
    pub(crate) nudge_handlers: Vec<HandlerPtr<NudgeEvent>>,
    pub(crate) vote_handlers: Vec<HandlerPtr<VoteEvent>>,
    pub(crate) new_view_handlers: Vec<HandlerPtr<NewViewEvent>>,
    pub(crate) receive_proposal_handlers: Vec<HandlerPtr<ReceiveProposalEvent>>,
    pub(crate) receive_nudge_handlers: Vec<HandlerPtr<ReceiveNudgeEvent>>,
    pub(crate) receive_vote_handlers: Vec<HandlerPtr<ReceiveVoteEvent>>,
    pub(crate) receive_new_view_handlers: Vec<HandlerPtr<ReceiveNewViewEvent>>,
    pub(crate) start_view_handlers: Vec<HandlerPtr<StartViewEvent>>,
    pub(crate) view_timeout_handlers: Vec<HandlerPtr<ViewTimeoutEvent>>,
    pub(crate) collect_qc_handlers: Vec<HandlerPtr<CollectQCEvent>>,
}

/// The handlers a user may register for each kind of event, as passed to [`EventHandlers::new`].
#[derive(Default)]
pub(crate) struct UserHandlers {
    pub(crate) insert_block: Option<HandlerPtr<InsertBlockEvent>>,
    pub(crate) commit_block: Option<HandlerPtr<CommitBlockEvent>>,
    pub(crate) update_prepare_qc: Option<HandlerPtr<UpdatePrepareQCEvent>>,
    pub(crate) update_locked_qc: Option<HandlerPtr<UpdateLockedQCEvent>>,
    pub(crate) propose: Option<HandlerPtr<ProposeEvent>>,
    pub(crate) nudge: Option<HandlerPtr<NudgeEvent>>,
    pub(crate) vote: Option<HandlerPtr<VoteEvent>>,
    pub(crate) new_view: Option<HandlerPtr<NewViewEvent>>,
    pub(crate) receive_proposal: Option<HandlerPtr<ReceiveProposalEvent>>,
    pub(crate) receive_nudge: Option<HandlerPtr<ReceiveNudgeEvent>>,
    pub(crate) receive_vote: Option<HandlerPtr<ReceiveVoteEvent>>,
    pub(crate) receive_new_view: Option<HandlerPtr<ReceiveNewViewEvent>>,
    pub(crate) start_view: Option<HandlerPtr<StartViewEvent>>,
    pub(crate) view_timeout: Option<HandlerPtr<ViewTimeoutEvent>>,
    pub(crate) collect_qc: Option<HandlerPtr<CollectQCEvent>>,
}

// The logger of an event type (if logging is enabled) followed by the user's handler (if any).
fn handlers<T: Logger>(
    log_events: bool,
    replica: ReplicaID,
    user_handler: Option<HandlerPtr<T>>,
) -> Vec<HandlerPtr<T>> {
    let mut handlers = Vec::new();
    if log_events {
        handlers.push(T::get_logger(replica))
    }
    if let Some(handler) = user_handler {
        handlers.push(handler)
    }
    handlers
}

impl EventHandlers {
    pub(crate) fn new(log_events: bool, replica: ReplicaID, user_handlers: UserHandlers) -> EventHandlers {
        EventHandlers {
            insert_block_handlers: handlers(log_events, replica, user_handlers.insert_block),
            commit_block_handlers: handlers(log_events, replica, user_handlers.commit_block),
            update_prepare_qc_handlers: handlers(log_events, replica, user_handlers.update_prepare_qc),
            update_locked_qc_handlers: handlers(log_events, replica, user_handlers.update_locked_qc),
            propose_handlers: handlers(log_events, replica, user_handlers.propose),
            nudge_handlers: handlers(log_events, replica, user_handlers.nudge),
            vote_handlers: handlers(log_events, replica, user_handlers.vote),
            new_view_handlers: handlers(log_events, replica, user_handlers.new_view),
            receive_proposal_handlers: handlers(log_events, replica, user_handlers.receive_proposal),
            receive_nudge_handlers: handlers(log_events, replica, user_handlers.receive_nudge),
            receive_vote_handlers: handlers(log_events, replica, user_handlers.receive_vote),
            receive_new_view_handlers: handlers(log_events, replica, user_handlers.receive_new_view),
            start_view_handlers: handlers(log_events, replica, user_handlers.start_view),
            view_timeout_handlers: handlers(log_events, replica, user_handlers.view_timeout),
            collect_qc_handlers: handlers(log_events, replica, user_handlers.collect_qc),
        }
    }

    /// Whether no handler at all is registered, in which case there is no need for an event bus.
    pub(crate) fn is_empty(&self) -> bool {
        self.insert_block_handlers.is_empty()
            && self.commit_block_handlers.is_empty()
            && self.update_prepare_qc_handlers.is_empty()
            && self.update_locked_qc_handlers.is_empty()
            && self.propose_handlers.is_empty()
            && self.nudge_handlers.is_empty()
            && self.vote_handlers.is_empty()
            && self.new_view_handlers.is_empty()
            && self.receive_proposal_handlers.is_empty()
            && self.receive_nudge_handlers.is_empty()
            && self.receive_vote_handlers.is_empty()
            && self.receive_new_view_handlers.is_empty()
            && self.start_view_handlers.is_empty()
            && self.view_timeout_handlers.is_empty()
            && self.collect_qc_handlers.is_empty()
    }

    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::InsertBlock(insert_block_event) =>
                self.insert_block_handlers.iter().for_each(|handler| handler(&insert_block_event)),

            Event::CommitBlock(commit_block_event) =>
                self.commit_block_handlers.iter().for_each(|handler| handler(&commit_block_event)),

            Event::UpdatePrepareQC(update_prepare_qc_event) =>
                self.update_prepare_qc_handlers.iter().for_each(|handler| handler(&update_prepare_qc_event)),

            Event::UpdateLockedQC(update_locked_qc_event) =>
                self.update_locked_qc_handlers.iter().for_each(|handler| handler(&update_locked_qc_event)),

            Event::Propose(propose_event) =>
                self.propose_handlers.iter().for_each(|handler| handler(&propose_event)),

            Event::Nudge(nudge_event) =>
                self.nudge_handlers.iter().for_each(|handler| handler(&nudge_event)),

            Event::Vote(vote_event) =>
                self.vote_handlers.iter().for_each(|handler| handler(&vote_event)),

            Event::NewView(new_view_event) =>
                self.new_view_handlers.iter().for_each(|handler| handler(&new_view_event)),

            Event::ReceiveProposal(receive_proposal_event) =>
                self.receive_proposal_handlers.iter().for_each(|handler| handler(&receive_proposal_event)),

            Event::ReceiveNudge(receive_nudge_event) =>
                self.receive_nudge_handlers.iter().for_each(|handler| handler(&receive_nudge_event)),

            Event::ReceiveVote(receive_vote_event) =>
                self.receive_vote_handlers.iter().for_each(|handler| handler(&receive_vote_event)),

            Event::ReceiveNewView(receive_new_view_event) =>
                self.receive_new_view_handlers.iter().for_each(|handler| handler(&receive_new_view_event)),

            Event::StartView(start_view_event) =>
                self.start_view_handlers.iter().for_each(|handler| handler(&start_view_event)),

            Event::ViewTimeout(view_timeout_event) =>
                self.view_timeout_handlers.iter().for_each(|handler| handler(&view_timeout_event)),

            Event::CollectQC(collect_qc_event) =>
                self.collect_qc_handlers.iter().for_each(|handler| handler(&collect_qc_event)),
        }
    }
}

/// Spawn the event bus thread. It fires handlers until the algorithm thread, which holds the only
/// publisher, drops it. Events already in the channel at that point are still handled.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(event) = event_subscriber.recv() {
            event_handlers.fire_handlers(event)
        }
        log::trace!("Event bus stopped");
    })
}
