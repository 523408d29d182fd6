//! View synchronization: detecting a stalled view and gathering the evidence the next leader needs to
//! resume.
//!
//! # Timeouts
//!
//! Every replica keeps a [`ViewTimer`](timer::ViewTimer) that remembers the last time it made progress
//! ("last update"): entered a view, accepted a leader's message, or collected a quorum. If no progress is
//! made for longer than the configured timeout (a multiple of the assumed maximum network delay `δ`,
//! 4δ by default), the replica gives up on its current view:
//! 1. It moves to the next view and back to the `NewView` phase.
//! 2. It sends a [`NewView`](crate::hotstuff::messages::NewView) message carrying its `prepareQC` to
//!    the leader of the new view, or keeps it for itself if it is that leader.
//!
//! The last-update time doubles as a guard: a replica that has been idle past the timeout ignores
//! leader messages until it has handled the timeout, so stale in-flight messages cannot race a view
//! change.
//!
//! # New view evidence
//!
//! The leader of a view collects `NewView` messages in a
//! [`NewViewCollector`](new_view::NewViewCollector). Once it has a quorum of them for a view at least as
//! high as its own, it starts consensus in that view by proposing a block that extends the block of the
//! highest certificate among the collected messages, so no progress that a quorum already certified is
//! lost.
//!
//! The handlers that drive these transitions live in [`crate::hotstuff::view_change`].

pub(crate) mod new_view;

pub(crate) mod timer;
