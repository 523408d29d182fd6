/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable mapping from views to the replicas that lead them.
//!
//! All honest replicas must compute the same leader for a given view. This crate does not derive the
//! schedule from messages it receives; it is configured when a replica is built. Two implementations are
//! provided:
//! - [`RoundRobin`]: the leader of view `v` is replica `v mod n`.
//! - [`ManualSchedule`]: a current-leader/next-leader assignment shared between replicas and updated out
//!   of band, e.g., by a test harness or by a replica that has just started leading a view.

use std::sync::{Arc, PoisonError, RwLock};

use crate::types::{
    data_types::{ReplicaID, ViewNumber},
    replica_set::ReplicaSet,
};

pub trait LeaderSchedule: Clone + Send {
    /// The leader of `view`.
    fn leader(&self, view: ViewNumber) -> ReplicaID;

    /// The replica that `NewView` messages are sent to when leaving `view`.
    fn next_leader(&self, view: ViewNumber) -> ReplicaID {
        self.leader(view + 1)
    }

    /// Called by `replica` when it starts leading `view`.
    fn record_leadership(&mut self, _view: ViewNumber, _replica: ReplicaID) {}

    /// Whether every leader the schedule can currently pick is a member of `replica_set`. Checked when a
    /// replica starts.
    fn fits(&self, replica_set: &ReplicaSet) -> bool;
}

/// Rotates leadership through the replica set in ascending order of ID.
#[derive(Clone, Copy, Debug)]
pub struct RoundRobin {
    n: u32,
}

impl RoundRobin {
    pub fn new(replica_set: &ReplicaSet) -> Self {
        Self {
            n: replica_set.len(),
        }
    }
}

impl LeaderSchedule for RoundRobin {
    fn leader(&self, view: ViewNumber) -> ReplicaID {
        ReplicaID::new((view.int() % self.n as u64) as u32)
    }

    fn fits(&self, replica_set: &ReplicaSet) -> bool {
        self.n == replica_set.len()
    }
}

/// A fixed current-leader/next-leader pair, shared by every replica that holds a clone.
///
/// Leadership does not change with the view number. Instead, the replica that starts leading a view
/// records itself as the current leader, and the next leader is whatever was last [set](Self::set).
#[derive(Clone, Debug)]
pub struct ManualSchedule {
    assignment: Arc<RwLock<Assignment>>,
}

#[derive(Clone, Copy, Debug)]
struct Assignment {
    leader: ReplicaID,
    next_leader: ReplicaID,
}

impl ManualSchedule {
    pub fn new(leader: ReplicaID, next_leader: ReplicaID) -> Self {
        Self {
            assignment: Arc::new(RwLock::new(Assignment {
                leader,
                next_leader,
            })),
        }
    }

    /// Replace the current assignment.
    pub fn set(&self, leader: ReplicaID, next_leader: ReplicaID) {
        let mut assignment = self
            .assignment
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        assignment.leader = leader;
        assignment.next_leader = next_leader;
    }

    fn assignment(&self) -> Assignment {
        *self
            .assignment
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl LeaderSchedule for ManualSchedule {
    fn leader(&self, _view: ViewNumber) -> ReplicaID {
        self.assignment().leader
    }

    fn next_leader(&self, _view: ViewNumber) -> ReplicaID {
        self.assignment().next_leader
    }

    fn record_leadership(&mut self, _view: ViewNumber, replica: ReplicaID) {
        self.assignment
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .leader = replica;
    }

    fn fits(&self, replica_set: &ReplicaSet) -> bool {
        let assignment = self.assignment();
        replica_set.contains(assignment.leader) && replica_set.contains(assignment.next_leader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_robin_rotates_through_every_replica() {
        let schedule = RoundRobin::new(&ReplicaSet::new(4).unwrap());
        let leaders: Vec<u32> = (0..6)
            .map(|view| schedule.leader(ViewNumber::new(view)).int())
            .collect();

        assert_eq!(leaders, vec![0, 1, 2, 3, 0, 1]);
        assert_eq!(schedule.next_leader(ViewNumber::new(3)), ReplicaID::new(0));
    }

    #[test]
    fn schedules_fit_only_replica_sets_containing_their_leaders() {
        let four = ReplicaSet::new(4).unwrap();
        let seven = ReplicaSet::new(7).unwrap();

        assert!(RoundRobin::new(&four).fits(&four));
        assert!(!RoundRobin::new(&seven).fits(&four));

        assert!(ManualSchedule::new(ReplicaID::new(1), ReplicaID::new(3)).fits(&four));
        assert!(!ManualSchedule::new(ReplicaID::new(1), ReplicaID::new(4)).fits(&four));
    }

    #[test]
    fn manual_schedule_is_shared_between_clones() {
        let harness = ManualSchedule::new(ReplicaID::new(0), ReplicaID::new(1));
        let mut replica = harness.clone();

        assert_eq!(replica.leader(ViewNumber::new(7)), ReplicaID::new(0));
        assert_eq!(replica.next_leader(ViewNumber::new(7)), ReplicaID::new(1));

        replica.record_leadership(ViewNumber::new(8), ReplicaID::new(1));
        assert_eq!(harness.leader(ViewNumber::new(8)), ReplicaID::new(1));

        harness.set(ReplicaID::new(2), ReplicaID::new(3));
        assert_eq!(replica.leader(ViewNumber::new(9)), ReplicaID::new(2));
        assert_eq!(replica.next_leader(ViewNumber::new(9)), ReplicaID::new(3));
    }
}
