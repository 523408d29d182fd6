use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use basic_hotstuff::{
    events::{CommitBlockEvent, ProposeEvent, StartViewEvent, ViewTimeoutEvent},
    leader_schedule::{LeaderSchedule, RoundRobin},
    networking::{
        mailbox::{Mailbox, MailboxAddress, DEFAULT_MAILBOX_CAPACITY},
        simulated::{DeliveryService, SimulatedNetwork, SimulationSpec},
    },
    replica::{Configuration, Replica, ReplicaSpec},
    types::{
        block::Block,
        data_types::{BlockHeight, ReplicaID, ViewNumber},
        replica_set::ReplicaSet,
    },
};

use super::logging::{first_seven_base64_chars, log_with_context};

pub(crate) const NETWORK_DELAY: Duration = Duration::from_millis(50);

/// 4 network delays, the default timeout multiple.
pub(crate) const VIEW_TIMEOUT: Duration = Duration::from_millis(200);

type Commits = Arc<Mutex<BTreeMap<BlockHeight, (Block, ViewNumber)>>>;

/// A replica together with the record of what it has committed, as observed through its event handlers.
pub(crate) struct Node {
    id: ReplicaID,
    replica: Replica,
    commits: Commits,
    view_timeouts: Arc<Mutex<Vec<ViewNumber>>>,
}

impl Node {
    pub(crate) fn new(
        id: ReplicaID,
        num_replicas: u32,
        network: SimulatedNetwork,
        mailbox: Mailbox,
        leader_schedule: impl LeaderSchedule + 'static,
    ) -> Node {
        let commits = Arc::new(Mutex::new(BTreeMap::new()));
        let view_timeouts = Arc::new(Mutex::new(Vec::new()));

        let configuration = Configuration::builder()
            .me(id)
            .num_replicas(num_replicas)
            .network_delay(NETWORK_DELAY)
            .log_events(false)
            .build();

        let replica = ReplicaSpec::builder()
            .configuration(configuration)
            .network(network)
            .mailbox(mailbox)
            .leader_schedule(leader_schedule)
            .on_commit_block(commit_block_handler(id, commits.clone()))
            .on_view_timeout(view_timeout_handler(id, view_timeouts.clone()))
            .on_propose(propose_handler(id))
            .on_start_view(start_view_handler(id))
            .build()
            .start()
            .unwrap();

        Node {
            id,
            replica,
            commits,
            view_timeouts,
        }
    }

    pub(crate) fn id(&self) -> ReplicaID {
        self.id
    }

    pub(crate) fn propose(&self, command: &str) {
        self.replica.propose(command)
    }

    pub(crate) fn committed_block(&self, height: BlockHeight) -> Option<(Block, ViewNumber)> {
        self.commits.lock().unwrap().get(&height).cloned()
    }

    pub(crate) fn committed_blocks(&self) -> BTreeMap<BlockHeight, (Block, ViewNumber)> {
        self.commits.lock().unwrap().clone()
    }

    /// Height of the highest block committed so far, or the genesis height if none.
    pub(crate) fn highest_committed_height(&self) -> BlockHeight {
        self.commits
            .lock()
            .unwrap()
            .keys()
            .next_back()
            .copied()
            .unwrap_or(BlockHeight::genesis())
    }

    pub(crate) fn view_timeouts(&self) -> Vec<ViewNumber> {
        self.view_timeouts.lock().unwrap().clone()
    }

    pub(crate) fn kill(&mut self) {
        self.replica.kill()
    }

    pub(crate) fn has_stopped(&self) -> bool {
        self.replica.has_stopped()
    }
}

/// A cluster of replicas connected by a simulated network.
pub(crate) struct Cluster {
    // Replicas are stopped before the network they are connected by.
    pub(crate) nodes: Vec<Node>,
    _delivery_service: DeliveryService,
}

impl Cluster {
    /// Start `num_replicas` replicas on a network that only delays messages.
    pub(crate) fn start(num_replicas: u32) -> Cluster {
        Cluster::start_with_network(num_replicas, |addresses| {
            SimulationSpec::builder().addresses(addresses).build().start()
        })
    }

    /// Start `num_replicas` replicas that share clones of `leader_schedule`, on a network that only delays
    /// messages.
    pub(crate) fn start_with_schedule(
        num_replicas: u32,
        leader_schedule: impl LeaderSchedule + 'static,
    ) -> Cluster {
        Cluster::start_with(num_replicas, leader_schedule, |addresses| {
            SimulationSpec::builder().addresses(addresses).build().start()
        })
    }

    /// Start `num_replicas` replicas on the network that `connect` builds out of their mailbox addresses.
    pub(crate) fn start_with_network(
        num_replicas: u32,
        connect: impl FnOnce(Vec<MailboxAddress>) -> (DeliveryService, Vec<SimulatedNetwork>),
    ) -> Cluster {
        let replica_set = ReplicaSet::new(num_replicas).unwrap();
        Cluster::start_with(num_replicas, RoundRobin::new(&replica_set), connect)
    }

    fn start_with(
        num_replicas: u32,
        leader_schedule: impl LeaderSchedule + 'static,
        connect: impl FnOnce(Vec<MailboxAddress>) -> (DeliveryService, Vec<SimulatedNetwork>),
    ) -> Cluster {
        let (addresses, mailboxes): (Vec<MailboxAddress>, Vec<Mailbox>) = (0..num_replicas)
            .map(|_| Mailbox::new(DEFAULT_MAILBOX_CAPACITY))
            .unzip();
        let (delivery_service, networks) = connect(addresses);

        let nodes = networks
            .into_iter()
            .zip(mailboxes)
            .enumerate()
            .map(|(id, (network, mailbox))| {
                Node::new(
                    ReplicaID::new(id as u32),
                    num_replicas,
                    network,
                    mailbox,
                    leader_schedule.clone(),
                )
            })
            .collect();

        Cluster {
            nodes,
            _delivery_service: delivery_service,
        }
    }

    /// Wait until every replica in `replicas` has committed a block at `height`. Returns whether they did
    /// before `timeout`.
    pub(crate) fn wait_for_commit(
        &self,
        replicas: &[usize],
        height: BlockHeight,
        timeout: Duration,
    ) -> bool {
        wait_until(timeout, || {
            replicas
                .iter()
                .all(|replica| self.nodes[*replica].committed_block(height).is_some())
        })
    }

    /// Assert that no two replicas committed different blocks at the same height.
    pub(crate) fn assert_consistent(&self) {
        let mut chain: BTreeMap<BlockHeight, (ReplicaID, Block)> = BTreeMap::new();
        for node in &self.nodes {
            for (height, (block, _)) in node.committed_blocks() {
                match chain.get(&height) {
                    Some((first_committer, committed)) => assert_eq!(
                        committed, &block,
                        "replicas {} and {} committed different blocks at height {}",
                        first_committer,
                        node.id(),
                        height
                    ),
                    None => {
                        chain.insert(height, (node.id(), block));
                    }
                }
            }
        }
    }
}

/// Poll `condition` until it holds or `timeout` passes. Returns whether it held.
pub(crate) fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

fn commit_block_handler(
    replica: ReplicaID,
    commits: Commits,
) -> impl Fn(&CommitBlockEvent) + Send + 'static {
    move |commit_block_event| {
        log_with_context(
            Some(replica),
            &format!(
                "Committed block {} at height {} ({}) in view {}",
                first_seven_base64_chars(&commit_block_event.block.hash.bytes()),
                commit_block_event.block.height,
                commit_block_event.block.command,
                commit_block_event.view
            ),
        );
        commits.lock().unwrap().insert(
            commit_block_event.block.height,
            (commit_block_event.block.clone(), commit_block_event.view),
        );
    }
}

fn view_timeout_handler(
    replica: ReplicaID,
    view_timeouts: Arc<Mutex<Vec<ViewNumber>>>,
) -> impl Fn(&ViewTimeoutEvent) + Send + 'static {
    move |view_timeout_event| {
        log_with_context(
            Some(replica),
            &format!("Timed out in view {}", view_timeout_event.view),
        );
        view_timeouts.lock().unwrap().push(view_timeout_event.view);
    }
}

fn propose_handler(replica: ReplicaID) -> impl Fn(&ProposeEvent) + Send + 'static {
    move |propose_event| {
        log_with_context(
            Some(replica),
            &format!(
                "Proposed {} at height {} in view {}",
                propose_event.proposal.block.command,
                propose_event.proposal.block.height,
                propose_event.proposal.view
            ),
        );
    }
}

fn start_view_handler(replica: ReplicaID) -> impl Fn(&StartViewEvent) + Send + 'static {
    move |start_view_event| {
        log_with_context(
            Some(replica),
            &format!(
                "Started view {}, led by {}",
                start_view_event.view, start_view_event.leader
            ),
        );
    }
}
