/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Functions that log out events.
//!
//! The logs defined in this module are printed if the user enabled them via the replica's
//! [configuration](crate::replica::Configuration).
//!
//! This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages printed
//! onto a terminal or to a file, set up a
//! [logging implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
//!
//! ## Log message format
//!
//! Log messages are CSVs (Comma Separated Values) with at least three values. The first three values are
//! always:
//! 1. The name of the [event](crate::events) in PascalCase (defined in this module as constants).
//! 2. The time the event was emitted (as number of seconds since the Unix Epoch).
//! 3. The ID of the replica that emitted the event.
//!
//! The rest of the values differ depending on the kind of event. For example, the following snippet
//! is how a [ReceiveProposal](crate::events::ReceiveProposalEvent) is printed:
//!
//! ```text
//! ReceiveProposal, 1701329264, 2, 1, fNGCJyk, 1, 3
//! ```
//!
//! In the snippet:
//! - The fourth value is the ID of the origin of the proposal.
//! - The fifth value is the first seven characters of the Base64 encoding of the hash of the proposed
//!   block.
//! - The sixth value is the height of the proposed block.
//! - The seventh value is the view of the proposal.

use crate::{events::*, types::data_types::ReplicaID};
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use log;
use std::time::SystemTime;

// Names of each event in PascalCase for printing:
pub const INSERT_BLOCK: &str = "InsertBlock";
pub const COMMIT_BLOCK: &str = "CommitBlock";
pub const UPDATE_PREPARE_QC: &str = "UpdatePrepareQC";
pub const UPDATE_LOCKED_QC: &str = "UpdateLockedQC";

pub const PROPOSE: &str = "Propose";
pub const NUDGE: &str = "Nudge";
pub const VOTE: &str = "Vote";
pub const NEW_VIEW: &str = "NewView";

pub const RECEIVE_PROPOSAL: &str = "ReceiveProposal";
pub const RECEIVE_NUDGE: &str = "ReceiveNudge";
pub const RECEIVE_VOTE: &str = "ReceiveVote";
pub const RECEIVE_NEW_VIEW: &str = "ReceiveNewView";

pub const START_VIEW: &str = "StartView";
pub const VIEW_TIMEOUT: &str = "ViewTimeout";
pub const COLLECT_QC: &str = "CollectQC";

/// Implemented by event types. Used to get a closure that logs the event.
pub(crate) trait Logger {
    /// Returns a pointer to the default logging handler for a given event type, as emitted by `replica`.
    fn get_logger(replica: ReplicaID) -> Box<dyn Fn(&Self) + Send>;
}

impl Logger for InsertBlockEvent {
    fn get_logger(replica: ReplicaID) -> Box<dyn Fn(&Self) + Send> {
        let logger = move |insert_block_event: &InsertBlockEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                INSERT_BLOCK,
                secs_since_unix_epoch(insert_block_event.timestamp),
                replica,
                first_seven_base64_chars(&insert_block_event.block.hash.bytes()),
                insert_block_event.block.height
            )
        };
        Box::new(logger)
    }
}

impl Logger for CommitBlockEvent {
    fn get_logger(replica: ReplicaID) -> Box<dyn Fn(&Self) + Send> {
        let logger = move |commit_block_event: &CommitBlockEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}",
                COMMIT_BLOCK,
                secs_since_unix_epoch(commit_block_event.timestamp),
                replica,
                first_seven_base64_chars(&commit_block_event.block.hash.bytes()),
                commit_block_event.block.height,
                commit_block_event.view,
                commit_block_event.block.command
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdatePrepareQCEvent {
    fn get_logger(replica: ReplicaID) -> Box<dyn Fn(&Self) + Send> {
        let logger = move |update_prepare_qc_event: &UpdatePrepareQCEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {:?}",
                UPDATE_PREPARE_QC,
                secs_since_unix_epoch(update_prepare_qc_event.timestamp),
                replica,
                update_prepare_qc_event.prepare_qc.block,
                update_prepare_qc_event.prepare_qc.view,
                update_prepare_qc_event.prepare_qc.phase
            )
        };
        Box::new(logger)
    }
}

impl Logger for UpdateLockedQCEvent {
    fn get_logger(replica: ReplicaID) -> Box<dyn Fn(&Self) + Send> {
        let logger = move |update_locked_qc_event: &UpdateLockedQCEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {:?}",
                UPDATE_LOCKED_QC,
                secs_since_unix_epoch(update_locked_qc_event.timestamp),
                replica,
                update_locked_qc_event.locked_qc.block,
                update_locked_qc_event.locked_qc.view,
                update_locked_qc_event.locked_qc.phase
            )
        };
        Box::new(logger)
    }
}

impl Logger for ProposeEvent {
    fn get_logger(replica: ReplicaID) -> Box<dyn Fn(&Self) + Send> {
        let logger = move |propose_event: &ProposeEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                PROPOSE,
                secs_since_unix_epoch(propose_event.timestamp),
                replica,
                first_seven_base64_chars(&propose_event.proposal.block.hash.bytes()),
                propose_event.proposal.block.height,
                propose_event.proposal.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for NudgeEvent {
    fn get_logger(replica: ReplicaID) -> Box<dyn Fn(&Self) + Send> {
        let logger = move |nudge_event: &NudgeEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {:?}",
                NUDGE,
                secs_since_unix_epoch(nudge_event.timestamp),
                replica,
                nudge_event.nudge.justify.block,
                nudge_event.nudge.view,
                nudge_event.nudge.justify.phase
            )
        };
        Box::new(logger)
    }
}

impl Logger for VoteEvent {
    fn get_logger(replica: ReplicaID) -> Box<dyn Fn(&Self) + Send> {
        let logger = move |vote_event: &VoteEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {:?}",
                VOTE,
                secs_since_unix_epoch(vote_event.timestamp),
                replica,
                vote_event.vote.block,
                vote_event.vote.view,
                vote_event.vote.phase
            )
        };
        Box::new(logger)
    }
}

impl Logger for NewViewEvent {
    fn get_logger(replica: ReplicaID) -> Box<dyn Fn(&Self) + Send> {
        let logger = move |new_view_event: &NewViewEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}",
                NEW_VIEW,
                secs_since_unix_epoch(new_view_event.timestamp),
                replica,
                new_view_event.new_view.view,
                new_view_event.new_view.justify.block,
                new_view_event.new_view.justify.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveProposalEvent {
    fn get_logger(replica: ReplicaID) -> Box<dyn Fn(&Self) + Send> {
        let logger = move |receive_proposal_event: &ReceiveProposalEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}",
                RECEIVE_PROPOSAL,
                secs_since_unix_epoch(receive_proposal_event.timestamp),
                replica,
                receive_proposal_event.origin,
                first_seven_base64_chars(&receive_proposal_event.proposal.block.hash.bytes()),
                receive_proposal_event.proposal.block.height,
                receive_proposal_event.proposal.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveNudgeEvent {
    fn get_logger(replica: ReplicaID) -> Box<dyn Fn(&Self) + Send> {
        let logger = move |receive_nudge_event: &ReceiveNudgeEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}, {:?}",
                RECEIVE_NUDGE,
                secs_since_unix_epoch(receive_nudge_event.timestamp),
                replica,
                receive_nudge_event.origin,
                receive_nudge_event.nudge.justify.block,
                receive_nudge_event.nudge.view,
                receive_nudge_event.nudge.justify.phase
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveVoteEvent {
    fn get_logger(replica: ReplicaID) -> Box<dyn Fn(&Self) + Send> {
        let logger = move |receive_vote_event: &ReceiveVoteEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}, {:?}",
                RECEIVE_VOTE,
                secs_since_unix_epoch(receive_vote_event.timestamp),
                replica,
                receive_vote_event.origin,
                receive_vote_event.vote.block,
                receive_vote_event.vote.view,
                receive_vote_event.vote.phase
            )
        };
        Box::new(logger)
    }
}

impl Logger for ReceiveNewViewEvent {
    fn get_logger(replica: ReplicaID) -> Box<dyn Fn(&Self) + Send> {
        let logger = move |receive_new_view_event: &ReceiveNewViewEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {}, {}",
                RECEIVE_NEW_VIEW,
                secs_since_unix_epoch(receive_new_view_event.timestamp),
                replica,
                receive_new_view_event.origin,
                receive_new_view_event.new_view.view,
                receive_new_view_event.new_view.justify.block,
                receive_new_view_event.new_view.justify.view
            )
        };
        Box::new(logger)
    }
}

impl Logger for StartViewEvent {
    fn get_logger(replica: ReplicaID) -> Box<dyn Fn(&Self) + Send> {
        let logger = move |start_view_event: &StartViewEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                START_VIEW,
                secs_since_unix_epoch(start_view_event.timestamp),
                replica,
                start_view_event.view,
                start_view_event.leader
            )
        };
        Box::new(logger)
    }
}

impl Logger for ViewTimeoutEvent {
    fn get_logger(replica: ReplicaID) -> Box<dyn Fn(&Self) + Send> {
        let logger = move |view_timeout_event: &ViewTimeoutEvent| {
            log::info!(
                "{}, {}, {}, {}, {}",
                VIEW_TIMEOUT,
                secs_since_unix_epoch(view_timeout_event.timestamp),
                replica,
                view_timeout_event.view,
                view_timeout_event.timeout.as_millis()
            )
        };
        Box::new(logger)
    }
}

impl Logger for CollectQCEvent {
    fn get_logger(replica: ReplicaID) -> Box<dyn Fn(&Self) + Send> {
        let logger = move |collect_qc_event: &CollectQCEvent| {
            log::info!(
                "{}, {}, {}, {}, {}, {:?}, {}",
                COLLECT_QC,
                secs_since_unix_epoch(collect_qc_event.timestamp),
                replica,
                collect_qc_event.quorum_certificate.block,
                collect_qc_event.quorum_certificate.view,
                collect_qc_event.quorum_certificate.phase,
                collect_qc_event.quorum_certificate.signers.len()
            )
        };
        Box::new(logger)
    }
}

// Get a more readable representation of a bytesequence by base64-encoding it and taking the first 7 characters.
fn first_seven_base64_chars(bytes: &[u8]) -> String {
    let encoded = STANDARD_NO_PAD.encode(bytes);
    if encoded.len() > 7 {
        encoded[0..7].to_string()
    } else {
        encoded
    }
}

// Events are timestamped with the system clock, so a clock set before the epoch prints 0.
fn secs_since_unix_epoch(timestamp: SystemTime) -> u64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abbreviates_long_byte_sequences() {
        assert_eq!(first_seven_base64_chars(&[0u8; 32]), "AAAAAAA");
        assert_eq!(first_seven_base64_chars(&[0u8; 3]), "AAAA");
    }

    #[test]
    fn epoch_is_second_zero() {
        assert_eq!(secs_since_unix_epoch(SystemTime::UNIX_EPOCH), 0);
    }
}
