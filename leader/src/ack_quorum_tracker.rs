use std::collections::HashSet;

use leader_types::{QuorumVerifier, ServerId};

/// Per-proposal ack aggregation against one or two `QuorumVerifier`s: just
/// the current configuration while no reconfig is outstanding, or the
/// current configuration plus the pending next one once a reconfig
/// proposal is in flight — every subsequent proposal carries both pairs
/// until the reconfig commits (spec.md §4.3).
pub struct AckQuorumTracker {
    pairs: Vec<(QuorumVerifier, HashSet<ServerId>)>,
}

impl AckQuorumTracker {
    pub fn new(verifier: QuorumVerifier) -> Self {
        AckQuorumTracker {
            pairs: vec![(verifier, HashSet::new())],
        }
    }

    /// Attaches a pending-next verifier. A tracker only ever carries the
    /// current config plus at most one pending one.
    pub fn add_pending_verifier(&mut self, verifier: QuorumVerifier) {
        debug_assert!(self.pairs.len() < 2, "tracker already has a pending verifier");
        if self.pairs.len() < 2 {
            self.pairs.push((verifier, HashSet::new()));
        }
    }

    /// Records an ack from `sid` against every pair for which it is a
    /// voter. Returns whether it updated at least one pair's ackset (a
    /// no-op ack from a non-voter or an already-seen sid returns false).
    pub fn add_ack(&mut self, sid: ServerId) -> bool {
        let mut updated = false;
        for (verifier, ackset) in &mut self.pairs {
            if verifier.is_voter(sid) && ackset.insert(sid) {
                updated = true;
            }
        }
        updated
    }

    pub fn has_all_quorums(&self) -> bool {
        self.pairs
            .iter()
            .all(|(verifier, ackset)| verifier.contains_quorum(ackset))
    }

    pub fn verifiers(&self) -> impl Iterator<Item = &QuorumVerifier> {
        self.pairs.iter().map(|(v, _)| v)
    }

    /// Union of every pair's ackset, for diagnostics/logging.
    pub fn combined_ackset(&self) -> HashSet<ServerId> {
        self.pairs
            .iter()
            .flat_map(|(_, ackset)| ackset.iter().copied())
            .collect()
    }
}
