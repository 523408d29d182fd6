/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Methods to build and run a replica.
//!
//! A replica is one of the `n = 3f + 1` participants of the protocol, identified by a dense
//! [`ReplicaID`] in `0..n`. The key components of this module are:
//! - The builder-pattern interface to construct a [specification of the replica](ReplicaSpec) with:
//!   1. `ReplicaSpec::builder` to construct a `ReplicaSpecBuilder`,
//!   2. The setters of the `ReplicaSpecBuilder`, and
//!   3. The `ReplicaSpecBuilder::build` method to construct a [ReplicaSpec],
//! - The function to [start](ReplicaSpec::start) a [Replica] given its specification,
//! - [The type](Replica) which keeps the replica alive.
//!
//! ## Starting a replica
//!
//! Here is an example that demonstrates how to build and start running a replica using the builder pattern:
//!
//! ```ignore
//! let replica =
//!     ReplicaSpec::builder()
//!     .configuration(configuration)
//!     .network(network)
//!     .mailbox(mailbox)
//!     .leader_schedule(RoundRobin::new(&ReplicaSet::new(4).unwrap()))
//!     .on_commit_block(commit_handler)
//!     .build()
//!     .start()?;
//!
//! replica.propose("transaction-0");
//! ```
//!
//! ### Required setters
//!
//! The required setters are for providing the collaborators required to run a replica:
//! - `.configuration(...)`
//! - `.network(...)`
//! - `.mailbox(...)`
//! - `.leader_schedule(...)`
//!
//! ### Optional setters
//!
//! The optional setters are for registering user-defined event handlers for events from [crate::events]:
//! - `.on_insert_block(...)`
//! - `.on_commit_block(...)`
//! - `.on_update_prepare_qc(...)`
//! - `.on_update_locked_qc(...)`
//! - `.on_propose(...)`
//! - `.on_nudge(...)`
//! - `.on_vote(...)`
//! - `.on_new_view(...)`
//! - `.on_receive_proposal(...)`
//! - `.on_receive_nudge(...)`
//! - `.on_receive_vote(...)`
//! - `.on_receive_new_view(...)`
//! - `.on_start_view(...)`
//! - `.on_view_timeout(...)`
//! - `.on_collect_qc(...)`
//!
//! The replica's [configuration](Configuration) can also be defined using the builder pattern, for example:
//!
//! ```ignore
//! let configuration =
//!     Configuration::builder()
//!     .me(ReplicaID::new(0))
//!     .num_replicas(4)
//!     .network_delay(Duration::from_millis(50))
//!     .log_events(true)
//!     .build()
//! ```

use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::algorithm::Algorithm;
use crate::event_bus::*;
use crate::events::*;
use crate::hotstuff::implementation::HotStuffConfiguration;
use crate::leader_schedule::LeaderSchedule;
use crate::networking::{mailbox::Mailbox, network::Network};
use crate::types::data_types::ReplicaID;
use crate::types::replica_set::{ReplicaSet, ReplicaSetError};

/// Stores the user-defined parameters required to start the replica, that is:
/// 1. The replica's own ID.
/// 2. The number of replicas, which must be `3f + 1` for some `f >= 1`.
/// 3. The assumed upper bound `δ` on network delay. Every message the replica sends is delayed by `δ`.
/// 4. The timeout multiple `k`: a view that makes no progress for `k × δ` times out. Must be at least 2.
/// 5. The "Log Events" flag, if set to "true" then logs should be printed.
///
/// ## Log Events
///
/// This crate logs using the [log](https://docs.rs/log/latest/log/) crate. To get these messages
/// printed onto a terminal or to a file, set up a [logging
/// implementation](https://docs.rs/log/latest/log/#available-logging-implementations).
#[derive(Clone, Copy, Debug, TypedBuilder)]
#[builder(builder_method(doc =
    "
    Create a builder for building a [Configuration]. On the builder call the following methods to construct a valid [Configuration].

    Required:
    - `.me(...)`
    - `.num_replicas(...)`
    - `.network_delay(...)`

    Optional:
    - `.timeout_multiple(...)`
    - `.log_events(...)`
    "
))]
pub struct Configuration {
    #[builder(setter(doc = "Set the replica's ID. Required."))]
    pub me: ReplicaID,
    #[builder(setter(doc = "Set the number of replicas in the replica set. Required."))]
    pub num_replicas: u32,
    #[builder(setter(doc = "Set the assumed upper bound on network delay, which is also applied to every message the replica sends. Required."))]
    pub network_delay: Duration,
    #[builder(default = 4, setter(doc = "Set the multiple of the network delay after which a view without progress times out. Optional, 4 by default."))]
    pub timeout_multiple: u32,
    #[builder(default = false, setter(doc = "Enable logging? Optional, off by default."))]
    pub log_events: bool,
}

impl Configuration {
    /// How long a view may go without progress before the replica gives up on it.
    pub fn view_timeout(&self) -> Duration {
        self.network_delay * self.timeout_multiple
    }

    fn validate(&self) -> Result<ReplicaSet, ConfigurationError> {
        let replica_set = ReplicaSet::new(self.num_replicas)?;
        if !replica_set.contains(self.me) {
            return Err(ConfigurationError::ReplicaOutOfRange {
                me: self.me,
                num_replicas: self.num_replicas,
            });
        }
        if self.network_delay.is_zero() {
            return Err(ConfigurationError::ZeroNetworkDelay);
        }
        if self.timeout_multiple <= 1 {
            return Err(ConfigurationError::TimeoutNotAboveDelay {
                multiple: self.timeout_multiple,
            });
        }
        Ok(replica_set)
    }
}

/// Reasons why a [ReplicaSpec] cannot be started.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    /// The number of replicas is not `3f + 1` for any `f >= 1`.
    InvalidReplicaCount(u32),

    /// The replica's ID is not in `0..num_replicas`.
    ReplicaOutOfRange { me: ReplicaID, num_replicas: u32 },

    ZeroNetworkDelay,

    /// The timeout must be strictly greater than the network delay.
    TimeoutNotAboveDelay { multiple: u32 },

    /// The leader schedule can pick a replica outside the configured replica set.
    LeaderScheduleMismatch,
}

impl From<ReplicaSetError> for ConfigurationError {
    fn from(value: ReplicaSetError) -> Self {
        match value {
            ReplicaSetError::InvalidSize { n } => ConfigurationError::InvalidReplicaCount(n),
        }
    }
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::InvalidReplicaCount(n) => {
                write!(f, "{} replicas is not 3f + 1 for any f >= 1", n)
            }
            ConfigurationError::ReplicaOutOfRange { me, num_replicas } => {
                write!(f, "replica {} is not among {} replicas", me, num_replicas)
            }
            ConfigurationError::ZeroNetworkDelay => f.write_str("network delay must be positive"),
            ConfigurationError::TimeoutNotAboveDelay { multiple } => write!(
                f,
                "a timeout of {} network delays is not above the network delay",
                multiple
            ),
            ConfigurationError::LeaderScheduleMismatch => {
                f.write_str("leader schedule names replicas outside the replica set")
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}

/// Stores all necessary parameters and collaborators required to run the [Replica].
#[derive(TypedBuilder)]
#[builder(builder_method(doc =
    "
    Create a builder for building a [ReplicaSpec]. On the builder call the following methods to construct a valid [ReplicaSpec].

    Required:
    - `.configuration(...)`
    - `.network(...)`
    - `.mailbox(...)`
    - `.leader_schedule(...)`

    Optional:
    - `.on_insert_block(...)`
    - `.on_commit_block(...)`
    - `.on_update_prepare_qc(...)`
    - `.on_update_locked_qc(...)`
    - `.on_propose(...)`
    - `.on_nudge(...)`
    - `.on_vote(...)`
    - `.on_new_view(...)`
    - `.on_receive_proposal(...)`
    - `.on_receive_nudge(...)`
    - `.on_receive_vote(...)`
    - `.on_receive_new_view(...)`
    - `.on_start_view(...)`
    - `.on_view_timeout(...)`
    - `.on_collect_qc(...)`
    "
))]
pub struct ReplicaSpec<N: Network + 'static, L: LeaderSchedule + 'static> {
    // Required parameters
    #[builder(setter(doc = "Set the [configuration](Configuration), which contains the necessary parameters to run a replica. Required."))]
    configuration: Configuration,
    #[builder(setter(doc = "Set the replica's handle on the network. The argument must implement the [Network](crate::networking::network::Network) trait. Required."))]
    network: N,
    #[builder(setter(doc = "Set the [mailbox](crate::networking::mailbox::Mailbox) that the network delivers the replica's messages and votes to. Required."))]
    mailbox: Mailbox,
    #[builder(setter(doc = "Set the mapping from views to leaders. The argument must implement the [LeaderSchedule](crate::leader_schedule::LeaderSchedule) trait. Required."))]
    leader_schedule: L,
    // Optional parameters
    #[builder(default, setter(transform = |handler: impl Fn(&InsertBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<InsertBlockEvent>),
    doc = "Register a handler closure to be invoked after a block is added to the replica's uncommitted blocks. Optional."))]
    on_insert_block: Option<HandlerPtr<InsertBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CommitBlockEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CommitBlockEvent>),
    doc = "Register a handler closure to be invoked after a block is committed. Optional."))]
    on_commit_block: Option<HandlerPtr<CommitBlockEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdatePrepareQCEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdatePrepareQCEvent>),
    doc = "Register a handler closure to be invoked after the replica updates its prepareQC. Optional."))]
    on_update_prepare_qc: Option<HandlerPtr<UpdatePrepareQCEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&UpdateLockedQCEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<UpdateLockedQCEvent>),
    doc = "Register a handler closure to be invoked after the replica updates its lockedQC. Optional."))]
    on_update_locked_qc: Option<HandlerPtr<UpdateLockedQCEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ProposeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ProposeEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a proposal for a block. Optional."))]
    on_propose: Option<HandlerPtr<ProposeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&NudgeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<NudgeEvent>),
    doc = "Register a handler closure to be invoked after the replica broadcasts a certificate to move replicas to the next phase. Optional."))]
    on_nudge: Option<HandlerPtr<NudgeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&VoteEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<VoteEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a vote. Optional."))]
    on_vote: Option<HandlerPtr<VoteEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&NewViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<NewViewEvent>),
    doc = "Register a handler closure to be invoked after the replica sends a new view message. Optional."))]
    on_new_view: Option<HandlerPtr<NewViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveProposalEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveProposalEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a proposal. Optional."))]
    on_receive_proposal: Option<HandlerPtr<ReceiveProposalEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveNudgeEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveNudgeEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a PreCommit, Commit, or Decide message. Optional."))]
    on_receive_nudge: Option<HandlerPtr<ReceiveNudgeEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveVoteEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveVoteEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a vote. Optional."))]
    on_receive_vote: Option<HandlerPtr<ReceiveVoteEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ReceiveNewViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ReceiveNewViewEvent>),
    doc = "Register a handler closure to be invoked after the replica receives a new view message. Optional."))]
    on_receive_new_view: Option<HandlerPtr<ReceiveNewViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&StartViewEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<StartViewEvent>),
    doc = "Register a handler closure to be invoked after the replica enters a new view. Optional."))]
    on_start_view: Option<HandlerPtr<StartViewEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&ViewTimeoutEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<ViewTimeoutEvent>),
    doc = "Register a handler closure to be invoked after the replica's view times out. Optional."))]
    on_view_timeout: Option<HandlerPtr<ViewTimeoutEvent>>,
    #[builder(default, setter(transform = |handler: impl Fn(&CollectQCEvent) + Send + 'static| Some(Box::new(handler) as HandlerPtr<CollectQCEvent>),
    doc = "Register a handler closure to be invoked after the replica collects a new quorum certificate. Optional."))]
    on_collect_qc: Option<HandlerPtr<CollectQCEvent>>,
}

impl<N: Network + 'static, L: LeaderSchedule + 'static> ReplicaSpec<N, L> {
    /// Validates the configuration and checks that the leader schedule only names members of the replica
    /// set, then starts the algorithm thread and, if any event handler is
    /// registered or logging is enabled, the event bus thread. Returns the handles to them in a
    /// [Replica] struct.
    pub fn start(self) -> Result<Replica, ConfigurationError> {
        let replica_set = self.configuration.validate()?;
        if !self.leader_schedule.fits(&replica_set) {
            return Err(ConfigurationError::LeaderScheduleMismatch);
        }
        let me = self.configuration.me;

        let event_handlers = EventHandlers::new(
            self.configuration.log_events,
            me,
            UserHandlers {
                insert_block: self.on_insert_block,
                commit_block: self.on_commit_block,
                update_prepare_qc: self.on_update_prepare_qc,
                update_locked_qc: self.on_update_locked_qc,
                propose: self.on_propose,
                nudge: self.on_nudge,
                vote: self.on_vote,
                new_view: self.on_new_view,
                receive_proposal: self.on_receive_proposal,
                receive_nudge: self.on_receive_nudge,
                receive_vote: self.on_receive_vote,
                receive_new_view: self.on_receive_new_view,
                start_view: self.on_start_view,
                view_timeout: self.on_view_timeout,
                collect_qc: self.on_collect_qc,
            },
        );

        let (event_publisher, event_bus) = if event_handlers.is_empty() {
            (None, None)
        } else {
            let (event_publisher, event_subscriber) = mpsc::channel();
            (
                Some(event_publisher),
                Some(start_event_bus(event_handlers, event_subscriber)),
            )
        };

        let hotstuff_config = HotStuffConfiguration {
            me,
            replica_set,
            view_timeout: self.configuration.view_timeout(),
        };
        let (commands, command_receiver) = mpsc::channel();
        let (algorithm_shutdown, algorithm_shutdown_receiver) = mpsc::channel();
        let stopped = Arc::new(AtomicBool::new(false));

        let algorithm = Algorithm::new(
            hotstuff_config,
            self.network,
            self.configuration.network_delay,
            self.leader_schedule,
            self.mailbox,
            command_receiver,
            algorithm_shutdown_receiver,
            stopped.clone(),
            event_publisher,
        )
        .start();

        log::debug!("Replica {} started", me);

        Ok(Replica {
            me,
            commands,
            algorithm: Some(algorithm),
            algorithm_shutdown,
            event_bus,
            stopped,
        })
    }
}

/// A handle to the background threads of a replica. When this value is dropped, all background threads
/// are gracefully shut down.
pub struct Replica {
    me: ReplicaID,
    commands: Sender<String>,
    algorithm: Option<JoinHandle<()>>,
    algorithm_shutdown: Sender<()>,
    event_bus: Option<JoinHandle<()>>,
    stopped: Arc<AtomicBool>,
}

impl Replica {
    pub fn id(&self) -> ReplicaID {
        self.me
    }

    /// Submit `command` for inclusion in the chain. It is proposed right away if this replica is the
    /// leader waiting to propose in its view, and queued otherwise.
    ///
    /// Commands submitted to a stopped replica are discarded.
    pub fn propose(&self, command: impl Into<String>) {
        if self.commands.send(command.into()).is_err() {
            log::debug!("Replica {} has stopped, dropped a command", self.me);
        }
    }

    /// Stop the replica and wait for its threads to exit. Messages sent to it from now on are never
    /// consumed. Killing a replica more than once has no further effect.
    pub fn kill(&mut self) {
        // The event bus exits once the algorithm thread, which holds its only publisher, has exited.
        let _ = self.algorithm_shutdown.send(());
        if let Some(algorithm) = self.algorithm.take() {
            let _ = algorithm.join();
        }
        if let Some(event_bus) = self.event_bus.take() {
            let _ = event_bus.join();
        }
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Whether the replica has been killed, or stopped on its own after detecting an inconsistency in its
    /// state.
    pub fn has_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for Replica {
    fn drop(&mut self) {
        self.kill()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leader_schedule::RoundRobin;
    use crate::networking::{mailbox::Mailbox, simulated::SimulationSpec};

    fn configuration(me: u32, num_replicas: u32) -> Configuration {
        Configuration::builder()
            .me(ReplicaID::new(me))
            .num_replicas(num_replicas)
            .network_delay(Duration::from_millis(50))
            .build()
    }

    #[test]
    fn default_timeout_is_four_network_delays() {
        let configuration = configuration(0, 4);

        assert_eq!(configuration.timeout_multiple, 4);
        assert!(!configuration.log_events);
        assert_eq!(configuration.view_timeout(), Duration::from_millis(200));
        assert!(configuration.validate().is_ok());
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        assert_eq!(
            configuration(0, 5).validate(),
            Err(ConfigurationError::InvalidReplicaCount(5))
        );
        assert_eq!(
            configuration(4, 4).validate(),
            Err(ConfigurationError::ReplicaOutOfRange {
                me: ReplicaID::new(4),
                num_replicas: 4
            })
        );

        let mut zero_delay = configuration(0, 4);
        zero_delay.network_delay = Duration::ZERO;
        assert_eq!(zero_delay.validate(), Err(ConfigurationError::ZeroNetworkDelay));

        let mut short_timeout = configuration(0, 4);
        short_timeout.timeout_multiple = 1;
        assert_eq!(
            short_timeout.validate(),
            Err(ConfigurationError::TimeoutNotAboveDelay { multiple: 1 })
        );
    }

    #[test]
    fn leader_schedule_over_another_replica_set_is_rejected() {
        let (addresses, mut mailboxes): (Vec<_>, Vec<_>) = (0..4).map(|_| Mailbox::new(10)).unzip();
        let (_delivery_service, mut networks) = SimulationSpec::builder().addresses(addresses).build().start();

        let result = ReplicaSpec::builder()
            .configuration(configuration(0, 4))
            .network(networks.remove(0))
            .mailbox(mailboxes.remove(0))
            .leader_schedule(RoundRobin::new(&ReplicaSet::new(7).unwrap()))
            .build()
            .start();

        assert!(matches!(result, Err(ConfigurationError::LeaderScheduleMismatch)));
    }
}
