//! Types that are used across multiple components of the simulator.
//!
//! Types specific to a single component, like the [messages](crate::hotstuff::messages) of the HotStuff
//! subprotocol, live in that component's module.

pub mod block;

pub mod certificates;

pub mod data_types;

pub mod replica_set;
