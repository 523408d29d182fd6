//! Pluggable peer-to-peer (P2P) networking.
//!
//! Replicas talk to each other only through the [`Network`](network::Network) trait. Incoming traffic
//! lands in a replica's [`Mailbox`](mailbox::Mailbox). The crate ships one implementation of the trait,
//! the [simulated network](simulated), which delivers payloads between mailboxes in the same process.

pub mod mailbox;

pub mod messages;

pub mod network;

pub(crate) mod sending;

pub mod simulated;
