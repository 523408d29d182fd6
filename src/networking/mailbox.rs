/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Bounded inboxes through which a replica receives messages and votes.
//!
//! A [`Mailbox`] is created together with its [`MailboxAddress`]. The replica owns the mailbox; the
//! transport holds (clones of) the address. Delivering into a full mailbox never blocks: the item is
//! rejected with [`DeliveryError::Full`] and it is up to the transport to drop it.

use std::{
    fmt::{self, Display, Formatter},
    sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError},
};

use crate::hotstuff::messages::{HotStuffMessage, Vote};

use super::messages::Payload;

/// Default number of items each of a replica's two mailboxes can hold.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 100;

/// The receiving side of a replica's message and vote inboxes.
pub struct Mailbox {
    messages: Receiver<HotStuffMessage>,
    votes: Receiver<Vote>,
}

/// The cloneable sending side of a replica's [`Mailbox`].
#[derive(Clone)]
pub struct MailboxAddress {
    messages: SyncSender<HotStuffMessage>,
    votes: SyncSender<Vote>,
}

impl Mailbox {
    /// Create a mailbox whose message and vote inboxes each hold up to `capacity` items.
    pub fn new(capacity: usize) -> (MailboxAddress, Mailbox) {
        let (to_messages, messages) = mpsc::sync_channel(capacity);
        let (to_votes, votes) = mpsc::sync_channel(capacity);
        (
            MailboxAddress {
                messages: to_messages,
                votes: to_votes,
            },
            Mailbox { messages, votes },
        )
    }

    /// Take the oldest message, if any. A mailbox whose addresses have all been dropped is simply empty.
    pub(crate) fn try_recv_message(&self) -> Option<HotStuffMessage> {
        match self.messages.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Take the oldest vote, if any.
    pub(crate) fn try_recv_vote(&self) -> Option<Vote> {
        match self.votes.try_recv() {
            Ok(vote) => Some(vote),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

impl MailboxAddress {
    pub fn deliver(&self, msg: HotStuffMessage) -> Result<(), DeliveryError> {
        self.messages.try_send(msg).map_err(DeliveryError::from)
    }

    pub fn deliver_vote(&self, vote: Vote) -> Result<(), DeliveryError> {
        self.votes.try_send(vote).map_err(DeliveryError::from)
    }

    /// Deliver `payload` into the inbox that matches its variant.
    pub fn deliver_payload(&self, payload: Payload) -> Result<(), DeliveryError> {
        match payload {
            Payload::Message(msg) => self.deliver(msg),
            Payload::Vote(vote) => self.deliver_vote(vote),
        }
    }
}

/// Why an item could not be put into a mailbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryError {
    /// The inbox is at capacity.
    Full,

    /// The replica that owned the mailbox has stopped.
    Disconnected,
}

impl<T> From<TrySendError<T>> for DeliveryError {
    fn from(value: TrySendError<T>) -> Self {
        match value {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Disconnected(_) => DeliveryError::Disconnected,
        }
    }
}

impl Display for DeliveryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Full => f.write_str("mailbox is full"),
            DeliveryError::Disconnected => f.write_str("mailbox owner has stopped"),
        }
    }
}

impl std::error::Error for DeliveryError {}
