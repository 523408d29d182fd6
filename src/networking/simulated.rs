/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! An in-process [`Network`] that delivers payloads into replicas' [mailboxes](super::mailbox) after a
//! simulated delay.
//!
//! ## Delivery service
//!
//! Every [`SimulatedNetwork`] handle forwards what it is asked to send to a single delivery thread, owned
//! by a [`DeliveryService`]. The thread keeps a queue of pending deliveries ordered by deadline and puts
//! each payload into the recipient's mailbox once its deadline passes. Senders therefore never block on
//! recipients, and a payload to a full or stopped mailbox is dropped.
//!
//! ## Faults
//!
//! The delivery thread can be told to:
//! 1. Lose each payload independently with a fixed probability, drawn from a seeded RNG so that runs are
//!    reproducible.
//! 2. Consult a [`FaultPolicy`] for every payload, which may deliver it as usual, hold it back for
//!    longer, or drop it.
//!
//! ```ignore
//! let (addresses, mailboxes): (Vec<_>, Vec<_>) = (0..4).map(|_| Mailbox::new(100)).unzip();
//! let (delivery_service, networks) = SimulationSpec::builder()
//!     .addresses(addresses)
//!     .loss_probability(0.05)
//!     .fault_policy(|_from, to, _payload| if to == ReplicaID::new(3) { Delivery::Drop } else { Delivery::Deliver })
//!     .build()
//!     .start();
//! ```

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    sync::mpsc::{self, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use rand::{rngs::StdRng, Rng, SeedableRng};
use typed_builder::TypedBuilder;

use crate::types::data_types::ReplicaID;

use super::{mailbox::MailboxAddress, messages::Payload, network::Network};

/// What the delivery thread should do with a payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Deliver after the delay the sender asked for.
    Deliver,
    /// Deliver after the sender's delay plus this extra duration.
    Delay(Duration),
    /// Never deliver.
    Drop,
}

/// Decides the fate of every payload sent from the first replica to the second.
pub type FaultPolicy = Box<dyn Fn(ReplicaID, ReplicaID, &Payload) -> Delivery + Send>;

/// How long the delivery thread waits for new payloads when nothing is pending.
const IDLE_WAIT: Duration = Duration::from_millis(50);

/// Parameters of a simulated network connecting the replicas whose mailbox addresses are given, in order
/// of replica ID.
#[derive(TypedBuilder)]
#[builder(builder_method(doc = "
    Create a builder for building a [SimulationSpec].

    Required:
    - `.addresses(...)`

    Optional:
    - `.loss_probability(...)`
    - `.seed(...)`
    - `.fault_policy(...)`
"))]
pub struct SimulationSpec {
    #[builder(setter(doc = "Set the mailbox addresses of the replicas, indexed by replica ID. Required."))]
    addresses: Vec<MailboxAddress>,
    #[builder(default = 0.0, setter(doc = "Set the probability in [0, 1] with which each payload is lost. Optional."))]
    loss_probability: f64,
    #[builder(default = 0, setter(doc = "Set the seed of the message-loss RNG. Optional."))]
    seed: u64,
    #[builder(default, setter(transform = |policy: impl Fn(ReplicaID, ReplicaID, &Payload) -> Delivery + Send + 'static| Some(Box::new(policy) as FaultPolicy),
    doc = "Register a closure that decides what happens to each payload. Optional."))]
    fault_policy: Option<FaultPolicy>,
}

impl SimulationSpec {
    /// Spawn the delivery thread. Returns the service that keeps it alive and one [`SimulatedNetwork`]
    /// per replica, in order of replica ID.
    pub fn start(self) -> (DeliveryService, Vec<SimulatedNetwork>) {
        let n = self.addresses.len() as u32;
        let (commands, command_receiver) = mpsc::channel();

        let mut delivery = DeliveryThread {
            addresses: self.addresses,
            loss_probability: self.loss_probability.clamp(0.0, 1.0),
            rng: StdRng::seed_from_u64(self.seed),
            fault_policy: self.fault_policy,
            pending: BinaryHeap::new(),
            sequence: 0,
        };
        let thread = thread::spawn(move || delivery.run(command_receiver));

        let networks = (0..n)
            .map(|me| SimulatedNetwork {
                me: ReplicaID::new(me),
                n,
                commands: commands.clone(),
            })
            .collect();

        (
            DeliveryService {
                thread: Some(thread),
                commands,
            },
            networks,
        )
    }
}

/// Keeps the delivery thread alive. Dropping it stops the thread and discards pending payloads.
pub struct DeliveryService {
    thread: Option<JoinHandle<()>>,
    commands: Sender<Command>,
}

impl Drop for DeliveryService {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// A replica's handle on the simulated network.
#[derive(Clone)]
pub struct SimulatedNetwork {
    me: ReplicaID,
    n: u32,
    commands: Sender<Command>,
}

impl SimulatedNetwork {
    fn submit(&self, to: ReplicaID, payload: Payload, delay: Duration) {
        let envelope = Envelope {
            from: self.me,
            to,
            payload,
            deliver_at: Instant::now() + delay,
        };
        if self.commands.send(Command::Send(envelope)).is_err() {
            log::trace!("Replica {} sent to {} after the network stopped", self.me, to);
        }
    }
}

impl Network for SimulatedNetwork {
    fn send(&mut self, peer: ReplicaID, payload: Payload, delay: Duration) {
        self.submit(peer, payload, delay)
    }

    fn broadcast(&mut self, payload: Payload, delay: Duration) {
        for peer in (0..self.n).map(ReplicaID::new).filter(|peer| *peer != self.me) {
            self.submit(peer, payload.clone(), delay)
        }
    }
}

enum Command {
    Send(Envelope),
    Shutdown,
}

struct Envelope {
    from: ReplicaID,
    to: ReplicaID,
    payload: Payload,
    deliver_at: Instant,
}

/// A pending delivery. Ordered so that a [`BinaryHeap`] pops the earliest deadline first, and payloads
/// with the same deadline in the order they were sent.
struct Scheduled {
    deliver_at: Instant,
    sequence: u64,
    envelope: Envelope,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.deliver_at == other.deliver_at && self.sequence == other.sequence
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.deliver_at, other.sequence).cmp(&(self.deliver_at, self.sequence))
    }
}

struct DeliveryThread {
    addresses: Vec<MailboxAddress>,
    loss_probability: f64,
    rng: StdRng,
    fault_policy: Option<FaultPolicy>,
    pending: BinaryHeap<Scheduled>,
    sequence: u64,
}

impl DeliveryThread {
    fn run(&mut self, commands: mpsc::Receiver<Command>) {
        loop {
            self.deliver_due();

            let wait = match self.pending.peek() {
                Some(next) => next.deliver_at.saturating_duration_since(Instant::now()),
                None => IDLE_WAIT,
            };

            match commands.recv_timeout(wait) {
                Ok(Command::Send(envelope)) => self.schedule(envelope),
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => (),
            }
        }
    }

    fn schedule(&mut self, mut envelope: Envelope) {
        if self.loss_probability > 0.0 && self.rng.gen_bool(self.loss_probability) {
            log::trace!("Lost payload from {} to {}", envelope.from, envelope.to);
            return;
        }

        let delivery = match &self.fault_policy {
            Some(policy) => policy(envelope.from, envelope.to, &envelope.payload),
            None => Delivery::Deliver,
        };
        match delivery {
            Delivery::Deliver => (),
            Delivery::Delay(extra) => envelope.deliver_at += extra,
            Delivery::Drop => {
                log::trace!("Dropped payload from {} to {}", envelope.from, envelope.to);
                return;
            }
        }

        self.sequence += 1;
        self.pending.push(Scheduled {
            deliver_at: envelope.deliver_at,
            sequence: self.sequence,
            envelope,
        });
    }

    fn deliver_due(&mut self) {
        let now = Instant::now();
        while self.pending.peek().is_some_and(|next| next.deliver_at <= now) {
            let Some(Scheduled { envelope, .. }) = self.pending.pop() else {
                return;
            };
            let Some(address) = self.addresses.get(envelope.to.index()) else {
                log::trace!("Dropped payload to unknown replica {}", envelope.to);
                continue;
            };
            if let Err(err) = address.deliver_payload(envelope.payload) {
                log::trace!(
                    "Could not deliver payload from {} to {}: {}",
                    envelope.from,
                    envelope.to,
                    err
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        hotstuff::messages::Vote,
        networking::mailbox::Mailbox,
        types::{
            certificates::Phase,
            data_types::{BlockHeight, ViewNumber},
        },
    };

    use super::*;

    fn vote(sender: u32) -> Vote {
        Vote {
            phase: Phase::Prepare,
            view: ViewNumber::new(1),
            block: BlockHeight::new(1),
            sender: ReplicaID::new(sender),
        }
    }

    fn recv_vote_within(mailbox: &Mailbox, timeout: Duration) -> Option<Vote> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(vote) = mailbox.try_recv_vote() {
                return Some(vote);
            }
            thread::sleep(Duration::from_millis(1));
        }
        None
    }

    #[test]
    fn broadcast_reaches_everyone_but_the_sender() {
        let (addresses, mailboxes): (Vec<_>, Vec<_>) = (0..4).map(|_| Mailbox::new(10)).unzip();
        let (_service, mut networks) = SimulationSpec::builder().addresses(addresses).build().start();

        networks[1].broadcast(vote(1).into(), Duration::from_millis(5));

        for (id, mailbox) in mailboxes.iter().enumerate() {
            let received = recv_vote_within(mailbox, Duration::from_millis(200));
            if id == 1 {
                assert_eq!(received, None);
            } else {
                assert_eq!(received, Some(vote(1)));
            }
        }
    }

    #[test]
    fn payload_is_held_back_for_the_requested_delay() {
        let (address, mailbox) = Mailbox::new(10);
        let (_service, mut networks) = SimulationSpec::builder()
            .addresses(vec![address])
            .build()
            .start();

        let sent_at = Instant::now();
        networks[0].send(ReplicaID::new(0), vote(0).into(), Duration::from_millis(30));

        assert_eq!(recv_vote_within(&mailbox, Duration::from_secs(1)), Some(vote(0)));
        assert!(sent_at.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn fault_policy_can_drop_payloads() {
        let (addresses, mailboxes): (Vec<_>, Vec<_>) = (0..2).map(|_| Mailbox::new(10)).unzip();
        let (_service, mut networks) = SimulationSpec::builder()
            .addresses(addresses)
            .fault_policy(|from, _, _| {
                if from == ReplicaID::new(0) {
                    Delivery::Drop
                } else {
                    Delivery::Deliver
                }
            })
            .build()
            .start();

        networks[0].send(ReplicaID::new(1), vote(0).into(), Duration::ZERO);
        networks[1].send(ReplicaID::new(0), vote(1).into(), Duration::ZERO);

        assert_eq!(recv_vote_within(&mailboxes[0], Duration::from_millis(200)), Some(vote(1)));
        assert_eq!(recv_vote_within(&mailboxes[1], Duration::from_millis(100)), None);
    }

    #[test]
    fn certain_loss_delivers_nothing() {
        let (address, mailbox) = Mailbox::new(10);
        let (_service, mut networks) = SimulationSpec::builder()
            .addresses(vec![address])
            .loss_probability(1.0)
            .build()
            .start();

        networks[0].send(ReplicaID::new(0), vote(0).into(), Duration::ZERO);

        assert_eq!(recv_vote_within(&mailbox, Duration::from_millis(100)), None);
    }
}
