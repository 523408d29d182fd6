//! The envelope in which every message travels over a [`Network`](super::network::Network).

use borsh::{BorshDeserialize, BorshSerialize};

use crate::hotstuff::messages::{HotStuffMessage, Vote};

/// Everything one replica can send another. Each variant is delivered to a different mailbox of the
/// recipient.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Payload {
    /// See [`HotStuffMessage`]. Delivered to the message mailbox.
    Message(HotStuffMessage),

    /// See [`Vote`]. Delivered to the vote mailbox.
    Vote(Vote),
}

impl Payload {
    pub fn is_vote(&self) -> bool {
        matches!(self, Payload::Vote(_))
    }
}

impl From<HotStuffMessage> for Payload {
    fn from(value: HotStuffMessage) -> Self {
        Payload::Message(value)
    }
}

impl From<Vote> for Payload {
    fn from(value: Vote) -> Self {
        Payload::Vote(value)
    }
}
