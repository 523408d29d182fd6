//! Subprotocol for committing `Block`s.
//!
//! HotStuff commits one block per view, through four phases driven by the leader of the view:
//! 1. **Prepare**: the leader broadcasts a [`Proposal`](messages::Proposal) for a block that extends the
//!    block of the highest certificate it knows of. Replicas check the proposal against the
//!    [safety rule](safety) and send a `Prepare` [`Vote`](messages::Vote) to the leader.
//! 2. **PreCommit**: on collecting a quorum of `Prepare` votes, the leader broadcasts the resulting
//!    certificate in a `PreCommit` [`Nudge`](messages::Nudge). Replicas adopt it as their `prepareQC`
//!    and vote `PreCommit`.
//! 3. **Commit**: on collecting a quorum of `PreCommit` votes, the leader broadcasts the certificate in a
//!    `Commit` nudge. Replicas lock on it (their `lockedQC`) and vote `Commit`.
//! 4. **Decide**: on collecting a quorum of `Commit` votes, the leader broadcasts the certificate in a
//!    `Decide` nudge. Replicas commit the block.
//!
//! After deciding, or after the view times out, every replica moves to the next view and sends its
//! `prepareQC` to the next leader in a [`NewView`](messages::NewView) message. See
//! [`view_change`] for how the next leader starts its view from these messages.
//!
//! A quorum is `2f + 1` out of `n = 3f + 1` replicas. The leader's own vote is implicit in every
//! certificate it collects.

pub(crate) mod implementation;

pub mod messages;

pub mod phase;

pub(crate) mod safety;

pub(crate) mod view_change;

pub(crate) mod voting;
