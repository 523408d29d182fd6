use std::time::Duration;

use crate::types::data_types::ReplicaID;

use super::messages::Payload;

/// The transport a replica uses to reach its peers.
///
/// A `Network` value is bound to one replica: it knows who the sender of every payload is. Both methods
/// are fire-and-forget: they must not block on the recipient, and delivery is not guaranteed.
pub trait Network: Clone + Send {
    /// Send `payload` to `peer`, to be delivered no earlier than `delay` from now.
    fn send(&mut self, peer: ReplicaID, payload: Payload, delay: Duration);

    /// Send `payload` to every replica except the sender, each delivery no earlier than `delay` from now.
    fn broadcast(&mut self, payload: Payload, delay: Duration);
}
