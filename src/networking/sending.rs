//! Functions and types for sending messages to peers.

use std::time::Duration;

use crate::types::data_types::ReplicaID;

use super::{messages::Payload, network::Network};

/// Handle for sending and broadcasting messages to the [`Network`], applying the replica's simulated
/// network delay to every send.
///
/// It can be used to send or broadcast instances of any type that implement the [`Into<Payload>`]
/// trait.
#[derive(Clone)]
pub(crate) struct SenderHandle<N: Network> {
    network: N,
    delay: Duration,
}

impl<N: Network> SenderHandle<N> {
    pub(crate) fn new(network: N, delay: Duration) -> Self {
        Self { network, delay }
    }

    pub(crate) fn send<S: Into<Payload>>(&mut self, peer: ReplicaID, msg: S) {
        self.network.send(peer, msg.into(), self.delay)
    }

    pub(crate) fn broadcast<S: Into<Payload>>(&mut self, msg: S) {
        self.network.broadcast(msg.into(), self.delay)
    }
}
