use std::time::Duration;

use basic_hotstuff::{
    leader_schedule::{LeaderSchedule, ManualSchedule},
    types::data_types::{BlockHeight, ReplicaID, ViewNumber},
};
use log::LevelFilter;

mod common;

use crate::common::{
    logging::setup_logger,
    node::{wait_until, Cluster},
};

const ALL_REPLICAS: [usize; 4] = [0, 1, 2, 3];

#[test]
fn manual_schedule_test() {
    setup_logger(LevelFilter::Debug);

    // 1. Start 4 replicas that share one schedule: replica 1 leads, and replica 2 leads next.
    let schedule = ManualSchedule::new(ReplicaID::new(1), ReplicaID::new(2));
    let cluster = Cluster::start_with_schedule(4, schedule.clone());

    // 2. Replica 1 commits transaction-0 in view 1.
    log::debug!("Submitting transaction-0 to replica 1.");
    cluster.nodes[1].propose("transaction-0");

    log::debug!("Waiting for every replica to commit height 1.");
    assert!(cluster.wait_for_commit(&ALL_REPLICAS, BlockHeight::new(1), Duration::from_secs(5)));
    for node in &cluster.nodes {
        let (block, view) = node.committed_block(BlockHeight::new(1)).unwrap();
        assert_eq!(block.command, "transaction-0");
        assert_eq!(block.proposer, Some(ReplicaID::new(1)));
        assert_eq!(view, ViewNumber::new(1));
    }

    // 3. After the Decide, replica 2 collects NewView messages, starts view 2, and records itself as the
    //    leader. The other replicas accept its proposal, and height 2 commits.
    log::debug!("Waiting for every replica to commit height 2.");
    assert!(cluster.wait_for_commit(&ALL_REPLICAS, BlockHeight::new(2), Duration::from_secs(5)));
    for node in &cluster.nodes {
        let (block, view) = node.committed_block(BlockHeight::new(2)).unwrap();
        assert_eq!(block.proposer, Some(ReplicaID::new(2)));
        assert_eq!(block.parent, BlockHeight::new(1));
        assert_eq!(view, ViewNumber::new(2));
    }
    assert_eq!(schedule.leader(ViewNumber::new(2)), ReplicaID::new(2));

    // 4. Hand the next view over to replica 3. Every replica eventually commits a block it proposed.
    log::debug!("Setting replica 3 as the next leader.");
    schedule.set(ReplicaID::new(2), ReplicaID::new(3));

    log::debug!("Waiting for every replica to commit a block proposed by replica 3.");
    assert!(wait_until(Duration::from_secs(10), || {
        cluster.nodes.iter().all(|node| {
            node.committed_blocks()
                .values()
                .any(|(block, _)| block.proposer == Some(ReplicaID::new(3)))
        })
    }));
    assert_eq!(schedule.next_leader(ViewNumber::init()), ReplicaID::new(3));

    cluster.assert_consistent();
}
