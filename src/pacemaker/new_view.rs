/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Collection of `NewView` evidence by the leader of an upcoming view.

use std::collections::{BTreeMap, HashMap};

use crate::types::{
    certificates::QuorumCertificate,
    data_types::{ReplicaID, ViewNumber},
};

/// Per-view collection of the `prepareQC`s carried by `NewView` messages, keyed by sender.
///
/// Evidence for views other than the current one may be collected at the same time, because a replica
/// can receive the `NewView` messages for a view before it has entered that view itself. A second
/// message from the same sender for the same view replaces the first.
pub(crate) struct NewViewCollector {
    quorum_size: usize,
    collections: BTreeMap<ViewNumber, HashMap<ReplicaID, QuorumCertificate>>,
}

impl NewViewCollector {
    pub(crate) fn new(quorum_size: usize) -> Self {
        Self {
            quorum_size,
            collections: BTreeMap::new(),
        }
    }

    /// Collect `justify` as `sender`'s evidence for `view`. Returns the number of distinct senders
    /// collected for `view` so far.
    pub(crate) fn collect(
        &mut self,
        view: ViewNumber,
        sender: ReplicaID,
        justify: QuorumCertificate,
    ) -> usize {
        let collection = self.collections.entry(view).or_default();
        collection.insert(sender, justify);
        collection.len()
    }

    pub(crate) fn has_quorum(&self, view: ViewNumber) -> bool {
        self.collections
            .get(&view)
            .is_some_and(|collection| collection.len() >= self.quorum_size)
    }

    /// Remove the evidence collected for `view` and every earlier view, returning the highest-view
    /// certificate for `view` that has at least a quorum of signers.
    ///
    /// Ties between certificates of the same view are broken in favour of the higher block.
    pub(crate) fn take_highest_qc(&mut self, view: ViewNumber) -> Option<QuorumCertificate> {
        let collection = self.collections.remove(&view);
        self.collections.retain(|collected_view, _| *collected_view > view);

        collection?
            .into_values()
            .filter(|qc| qc.has_quorum(self.quorum_size))
            .max_by_key(|qc| (qc.view, qc.block))
    }

    /// Remove the evidence collected for every view lower than `view`.
    pub(crate) fn discard_below(&mut self, view: ViewNumber) {
        self.collections.retain(|collected_view, _| *collected_view >= view);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::types::{
        certificates::Phase, data_types::BlockHeight, replica_set::ReplicaSet,
    };

    use super::*;

    fn qc(view: u64, block: u64, signers: usize) -> QuorumCertificate {
        QuorumCertificate::new(
            Phase::Prepare,
            ViewNumber::new(view),
            BlockHeight::new(block),
            ReplicaSet::new(4)
                .unwrap()
                .ids()
                .take(signers)
                .collect::<BTreeSet<_>>(),
        )
    }

    #[test]
    fn evidence_is_deduplicated_by_sender() {
        let mut collector = NewViewCollector::new(3);
        let view = ViewNumber::new(2);

        assert_eq!(collector.collect(view, ReplicaID::new(0), qc(1, 1, 3)), 1);
        assert_eq!(collector.collect(view, ReplicaID::new(0), qc(1, 1, 3)), 1);
        assert_eq!(collector.collect(view, ReplicaID::new(2), qc(1, 1, 3)), 2);
        assert!(!collector.has_quorum(view));

        collector.collect(view, ReplicaID::new(3), qc(1, 1, 3));
        assert!(collector.has_quorum(view));
    }

    #[test]
    fn highest_qc_meeting_quorum_is_chosen() {
        let mut collector = NewViewCollector::new(3);
        let view = ViewNumber::new(5);

        collector.collect(view, ReplicaID::new(0), qc(3, 2, 3));
        collector.collect(view, ReplicaID::new(1), qc(4, 3, 3));
        // Newest, but without a quorum of signers.
        collector.collect(view, ReplicaID::new(2), qc(4, 4, 2));

        assert_eq!(collector.take_highest_qc(view), Some(qc(4, 3, 3)));
        assert!(!collector.has_quorum(view));
    }

    #[test]
    fn taking_a_view_discards_earlier_views_only() {
        let mut collector = NewViewCollector::new(1);

        collector.collect(ViewNumber::new(2), ReplicaID::new(0), qc(1, 1, 3));
        collector.collect(ViewNumber::new(3), ReplicaID::new(0), qc(1, 1, 3));
        collector.collect(ViewNumber::new(4), ReplicaID::new(0), qc(1, 1, 3));

        assert!(collector.take_highest_qc(ViewNumber::new(3)).is_some());
        assert!(!collector.has_quorum(ViewNumber::new(2)));
        assert!(collector.has_quorum(ViewNumber::new(4)));

        collector.discard_below(ViewNumber::new(5));
        assert!(!collector.has_quorum(ViewNumber::new(4)));
    }
}
