/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The thread that drives a replica.
//!
//! The algorithm thread is the only thread that touches a replica's protocol state. It is a loop that, on
//! every iteration:
//! 1. Returns if the [replica handle](crate::replica::Replica) asked it to shut down.
//! 2. Handles a view timeout, if the current view has timed out. Nothing else is handled in an iteration
//!    that times out, so a message that arrived after the deadline cannot race the view change.
//! 3. Handles at most one message, at most one vote, and at most one command submitted through
//!    [`Replica::propose`](crate::replica::Replica::propose).
//! 4. Sleeps briefly if none of these were available.
//!
//! If a handler reports an invariant violation, the thread logs it and exits, and the replica is marked
//! as stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::events::Event;
use crate::hotstuff::implementation::{HotStuff, HotStuffConfiguration, HotStuffError};
use crate::leader_schedule::LeaderSchedule;
use crate::networking::{mailbox::Mailbox, network::Network, sending::SenderHandle};
use crate::types::data_types::ReplicaID;

/// How long the loop sleeps when there is nothing to handle.
const IDLE_SLEEP: Duration = Duration::from_millis(1);

pub(crate) struct Algorithm<N: Network + 'static, L: LeaderSchedule + 'static> {
    me: ReplicaID,
    hotstuff: HotStuff<N, L>,
    mailbox: Mailbox,
    commands: Receiver<String>,
    shutdown_signal: Receiver<()>,
    stopped: Arc<AtomicBool>,
}

impl<N: Network + 'static, L: LeaderSchedule + 'static> Algorithm<N, L> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        hotstuff_config: HotStuffConfiguration,
        network: N,
        network_delay: Duration,
        leader_schedule: L,
        mailbox: Mailbox,
        commands: Receiver<String>,
        shutdown_signal: Receiver<()>,
        stopped: Arc<AtomicBool>,
        event_publisher: Option<Sender<Event>>,
    ) -> Self {
        let me = hotstuff_config.me;
        let hotstuff = HotStuff::new(
            hotstuff_config,
            leader_schedule,
            SenderHandle::new(network, network_delay),
            event_publisher,
        );

        Self {
            me,
            hotstuff,
            mailbox,
            commands,
            shutdown_signal,
            stopped,
        }
    }

    pub(crate) fn start(mut self) -> JoinHandle<()> {
        thread::spawn(move || {
            match self.execute() {
                Ok(()) => log::debug!(
                    "Replica {} shut down in view {} ({}), highest committed block {}",
                    self.me,
                    self.hotstuff.view(),
                    self.hotstuff.phase(),
                    self.hotstuff.block_store().highest_committed().height
                ),
                Err(err) => log::error!(
                    "Replica {} stopped in view {}: {:?}",
                    self.me,
                    self.hotstuff.view(),
                    err
                ),
            }
            self.stopped.store(true, Ordering::SeqCst);
        })
    }

    fn execute(&mut self) -> Result<(), HotStuffError> {
        loop {
            match self.shutdown_signal.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => return Ok(()),
                Err(TryRecvError::Empty) => (),
            }

            if self.hotstuff.is_view_timed_out() {
                self.hotstuff.on_timeout();
                continue;
            }

            let mut idle = true;

            if let Some(msg) = self.mailbox.try_recv_message() {
                idle = false;
                self.hotstuff.on_receive_msg(msg)?;
            }

            if let Some(vote) = self.mailbox.try_recv_vote() {
                idle = false;
                self.hotstuff.on_receive_vote(vote)?;
            }

            if let Ok(command) = self.commands.try_recv() {
                idle = false;
                self.hotstuff.propose(command);
            }

            if idle {
                thread::sleep(IDLE_SLEEP);
            }
        }
    }
}
