/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A simulation of the four-phase Basic HotStuff Byzantine Fault Tolerant state machine replication
//! protocol.
//!
//! A cluster of `n = 3f + 1` replicas agrees on a single chain of [blocks](types::block::Block), each
//! carrying an opaque command, while tolerating up to `f` crashed replicas. Replicas run on their own
//! threads in a single process, and talk to each other through bounded [mailboxes](networking::mailbox)
//! fed by a pluggable [network](networking::network::Network). A [simulated
//! network](networking::simulated) with configurable delay, message loss, and fault injection is
//! included.
//!
//! ## Getting started
//!
//! 1. Create one [mailbox](networking::mailbox::Mailbox) per replica.
//! 2. Connect them, e.g., with a [`SimulationSpec`](networking::simulated::SimulationSpec).
//! 3. [Build and start](replica) one replica per mailbox.
//! 4. Submit commands with [`Replica::propose`](replica::Replica::propose), and observe the chain through
//!    the [events](events) that replicas emit, in particular
//!    [`CommitBlockEvent`](events::CommitBlockEvent).
//!
//! ## Protocol
//!
//! The protocol proper lives in [hotstuff]. Leadership is decided by a [leader
//! schedule](leader_schedule), and views that make no progress are abandoned by a per-replica timer.
//!
//! Signatures are approximated by sets of replica IDs, and replicas are assumed to fail only by
//! crashing.

pub mod block_store;

pub mod events;

pub mod hotstuff;

pub mod leader_schedule;

pub mod logging;

pub mod networking;

pub mod replica;

pub mod types;

pub(crate) mod algorithm;

pub(crate) mod event_bus;

pub(crate) mod pacemaker;
