/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The fixed, known set of replicas that takes part in consensus for the lifetime of a run.
//!
//! Replicas carry no voting power: every replica counts once. For a replica set of size `n = 3f + 1`
//! the protocol tolerates `f` faulty replicas, and a quorum is any `2f + 1` of them.

use std::fmt::{self, Display, Formatter};

use super::data_types::ReplicaID;

/// The replica set `{0, 1, ..., n - 1}` with `n = 3f + 1` for some `f >= 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplicaSet {
    n: u32,
}

impl ReplicaSet {
    /// Create a replica set with `n` replicas.
    ///
    /// Fails if `n` is not of the form `3f + 1` with `f >= 1`.
    pub fn new(n: u32) -> Result<ReplicaSet, ReplicaSetError> {
        if n < 4 || (n - 1) % 3 != 0 {
            return Err(ReplicaSetError::InvalidSize { n });
        }
        Ok(ReplicaSet { n })
    }

    /// Number of replicas in the set.
    pub const fn len(&self) -> u32 {
        self.n
    }

    /// Maximum number of faulty replicas that the set tolerates.
    pub const fn f(&self) -> u32 {
        (self.n - 1) / 3
    }

    /// Minimum number of distinct signers a [`QuorumCertificate`](super::certificates::QuorumCertificate)
    /// needs, i.e., `2f + 1`.
    pub const fn quorum_size(&self) -> usize {
        (2 * self.f() + 1) as usize
    }

    pub fn contains(&self, replica: ReplicaID) -> bool {
        replica.int() < self.n
    }

    /// Iterate through the replica IDs in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = ReplicaID> {
        (0..self.n).map(ReplicaID::new)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplicaSetError {
    /// The requested size is not `3f + 1` for any `f >= 1`.
    InvalidSize { n: u32 },
}

impl Display for ReplicaSetError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ReplicaSetError::InvalidSize { n } => {
                write!(f, "replica set size {} is not of the form 3f + 1 with f >= 1", n)
            }
        }
    }
}

impl std::error::Error for ReplicaSetError {}
