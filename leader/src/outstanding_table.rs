use std::collections::BTreeMap;

use leader_types::{Proposal, Zxid};

use crate::ack_quorum_tracker::AckQuorumTracker;

/// A proposal together with the ack-aggregation state tracked for it while
/// it is outstanding. Exists only between `propose` and `tryToCommit`;
/// mutated exclusively under the leader lock.
pub struct OutstandingEntry {
    pub proposal: Proposal,
    pub tracker: AckQuorumTracker,
}

/// Proposed-but-not-yet-committed transactions, ordered by zxid. Backed by
/// a `BTreeMap` so insertion, lookup, removal, and in-order iteration are
/// all native operations — there is exactly one producer (the proposal
/// pipeline, under the leader lock), so no further synchronization is
/// needed inside the table itself.
#[derive(Default)]
pub struct OutstandingTable {
    entries: BTreeMap<Zxid, OutstandingEntry>,
}

impl OutstandingTable {
    pub fn new() -> Self {
        OutstandingTable {
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, proposal: Proposal, tracker: AckQuorumTracker) {
        let zxid = proposal.zxid;
        self.entries.insert(zxid, OutstandingEntry { proposal, tracker });
    }

    pub fn get(&self, zxid: Zxid) -> Option<&OutstandingEntry> {
        self.entries.get(&zxid)
    }

    pub fn get_mut(&mut self, zxid: Zxid) -> Option<&mut OutstandingEntry> {
        self.entries.get_mut(&zxid)
    }

    pub fn contains(&self, zxid: Zxid) -> bool {
        self.entries.contains_key(&zxid)
    }

    pub fn remove(&mut self, zxid: Zxid) -> Option<OutstandingEntry> {
        self.entries.remove(&zxid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first_zxid(&self) -> Option<Zxid> {
        self.entries.keys().next().copied()
    }

    /// In-order (ascending zxid) iteration, the order commits must be
    /// attempted/broadcast in.
    pub fn iter_in_order(&self) -> impl Iterator<Item = (&Zxid, &OutstandingEntry)> {
        self.entries.iter()
    }

    /// Zxids strictly after `from`, in ascending order — used by
    /// `tryToCommit`'s post-reconfig retry walk and by
    /// `ReconfigCoordinator`'s designated-leader scan.
    pub fn zxids_after(&self, from: Zxid) -> impl Iterator<Item = Zxid> + '_ {
        self.entries
            .range((std::ops::Bound::Excluded(from), std::ops::Bound::Unbounded))
            .map(|(zxid, _)| *zxid)
    }
}
