/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The position of a replica in the five-state HotStuff pipeline.
//!
//! This is deliberately a different type from [`Phase`], which only tags votes and certificates. The
//! legal moves are:
//!
//! | From        | Event                                   | To          |
//! |-------------|-----------------------------------------|-------------|
//! | `NewView`   | leader proposes                         | `Prepare`   |
//! | any         | follower votes in phase `p`             | `p`         |
//! | `Prepare`   | leader collects a `Prepare` quorum      | `PreCommit` |
//! | `PreCommit` | leader collects a `PreCommit` quorum    | `Commit`    |
//! | `Commit`    | leader collects a `Commit` quorum       | `Decide`    |
//! | `Decide`    | block committed                         | `NewView`   |
//! | any         | view times out                          | `NewView`   |

use std::fmt::{self, Display, Formatter};

use crate::types::certificates::Phase;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReplicaPhase {
    NewView,
    Prepare,
    PreCommit,
    Commit,
    Decide,
}

impl ReplicaPhase {
    /// The phase a leader moves to after collecting a quorum of votes in `self`, if any.
    pub const fn after_quorum(self) -> Option<ReplicaPhase> {
        match self {
            ReplicaPhase::Prepare => Some(ReplicaPhase::PreCommit),
            ReplicaPhase::PreCommit => Some(ReplicaPhase::Commit),
            ReplicaPhase::Commit => Some(ReplicaPhase::Decide),
            ReplicaPhase::NewView | ReplicaPhase::Decide => None,
        }
    }

    /// The kind of vote a leader in `self` collects, if any.
    pub const fn collects(self) -> Option<Phase> {
        match self {
            ReplicaPhase::Prepare => Some(Phase::Prepare),
            ReplicaPhase::PreCommit => Some(Phase::PreCommit),
            ReplicaPhase::Commit => Some(Phase::Commit),
            ReplicaPhase::NewView | ReplicaPhase::Decide => None,
        }
    }

    /// The phase a follower is in after casting a vote of kind `phase`.
    pub const fn voted(phase: Phase) -> ReplicaPhase {
        match phase {
            Phase::Prepare => ReplicaPhase::Prepare,
            Phase::PreCommit => ReplicaPhase::PreCommit,
            Phase::Commit => ReplicaPhase::Commit,
        }
    }
}

impl Display for ReplicaPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReplicaPhase::NewView => "NewView",
            ReplicaPhase::Prepare => "Prepare",
            ReplicaPhase::PreCommit => "PreCommit",
            ReplicaPhase::Commit => "Commit",
            ReplicaPhase::Decide => "Decide",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leader_pipeline_ends_in_decide() {
        let mut phase = ReplicaPhase::Prepare;
        let mut visited = vec![phase];
        while let Some(next) = phase.after_quorum() {
            phase = next;
            visited.push(phase);
        }

        assert_eq!(
            visited,
            vec![
                ReplicaPhase::Prepare,
                ReplicaPhase::PreCommit,
                ReplicaPhase::Commit,
                ReplicaPhase::Decide
            ]
        );
    }

    #[test]
    fn only_voting_phases_collect_votes() {
        assert_eq!(ReplicaPhase::NewView.collects(), None);
        assert_eq!(ReplicaPhase::Decide.collects(), None);
        for phase in [Phase::Prepare, Phase::PreCommit, Phase::Commit] {
            assert_eq!(ReplicaPhase::voted(phase).collects(), Some(phase));
        }
    }
}
