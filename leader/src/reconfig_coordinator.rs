use std::collections::HashSet;

use leader_types::{LearnerRole, PacketType, PeerInfo, ReconfigPayload, ServerId, Zxid};
use tracing::info;

use crate::leader_state::LeaderInner;

/// Outcome of applying a committed reconfig: who ends up driving the new
/// configuration, for the caller to decide whether to keep serving or shut
/// down (spec.md §4.8).
#[derive(Debug, PartialEq, Eq)]
pub struct ReconfigOutcome {
    pub zxid: Zxid,
    pub designated_leader: ServerId,
    pub still_leading: bool,
}

/// Applies a just-committed reconfig proposal to `inner`: builds the new
/// `PeerView`, selects the designated leader for the new configuration,
/// swaps in the new `QuorumVerifier`, and gates `allowed_to_commit` if
/// leadership moved elsewhere. Pure data manipulation plus non-blocking
/// packet sends; no collaborator I/O, so it runs synchronously under the
/// leader lock from `ProposalPipeline::try_to_commit`.
pub fn apply_reconfig_commit(
    inner: &mut LeaderInner,
    my_id: ServerId,
    zxid: Zxid,
    payload: &ReconfigPayload,
) -> ReconfigOutcome {
    let mut new_peer_view = inner.peer_view.clone();
    for sid in &payload.removed {
        new_peer_view.peers.remove(sid);
    }
    for (sid, info) in &payload.peer_updates {
        new_peer_view.peers.insert(*sid, info.clone());
    }

    let designated = select_designated_leader(inner, my_id, zxid, payload);

    inner.peer_view = new_peer_view;
    inner.current_verifier = payload.new_verifier.clone();
    inner.pending_verifier = None;
    inner.reconfig_outstanding = None;

    let still_leading = designated == my_id;
    if !still_leading {
        inner.allowed_to_commit = false;
        info!(
            new_leader = designated,
            "designated leader changed by reconfig; no longer allowed to commit"
        );
    }

    let forwarding: Vec<ServerId> = inner
        .forwarding_participants()
        .map(|h| h.sid)
        .collect();
    let observing: Vec<ServerId> = inner.observing_learners().map(|h| h.sid).collect();
    broadcast_activation(inner, zxid, &payload.encode().unwrap_or_default(), &forwarding, &observing);

    ReconfigOutcome {
        zxid,
        designated_leader: designated,
        still_leading,
    }
}

fn broadcast_activation(
    inner: &LeaderInner,
    zxid: Zxid,
    payload: &[u8],
    forwarding: &[ServerId],
    observing: &[ServerId],
) {
    let commit_and_activate = leader_types::Packet::new(PacketType::CommitAndActivate, zxid, payload.to_vec());
    for sid in forwarding {
        if let Some(handle) = inner.learners.get(sid) {
            handle.send(commit_and_activate.clone());
        }
    }
    let inform_and_activate = leader_types::Packet::new(PacketType::InformAndActivate, zxid, payload.to_vec());
    for sid in observing {
        if let Some(handle) = inner.learners.get(sid) {
            handle.send(inform_and_activate.clone());
        }
    }
}

/// Picks who leads under the new configuration: the current leader if it
/// remains a voter there, otherwise the new-config voter that acked the
/// longest consecutive run of proposals immediately following the reconfig
/// — the candidate set narrows zxid by zxid and the walk stops as soon as a
/// gap or an empty intersection appears (there is no proposal to extrapolate
/// from past that point). Ties break on the lowest server id for a
/// deterministic result across replicas replaying the same commit.
fn select_designated_leader(
    inner: &LeaderInner,
    my_id: ServerId,
    reconfig_zxid: Zxid,
    payload: &ReconfigPayload,
) -> ServerId {
    if payload.new_verifier.is_voter(my_id) {
        return my_id;
    }

    let mut candidates: HashSet<ServerId> = payload.new_verifier.voters();
    let mut cursor = reconfig_zxid.next();

    loop {
        let entry = match inner.outstanding.get(cursor) {
            Some(e) => e,
            None => break,
        };
        let ackset = entry.tracker.combined_ackset();
        let intersected: HashSet<ServerId> = candidates.intersection(&ackset).copied().collect();
        if intersected.is_empty() {
            break;
        }
        candidates = intersected;
        cursor = cursor.next();
    }

    *candidates
        .iter()
        .min()
        .expect("a reconfig's new configuration must name at least one voter")
}

#[cfg(test)]
mod test {
    use super::*;
    use leader_types::{QuorumVerifier, Zxid};
    use std::collections::HashMap;

    use crate::ack_quorum_tracker::AckQuorumTracker;
    use crate::leader_state::LeaderInner;
    use crate::outstanding_table::OutstandingTable;
    use crate::zxid_allocator::ZxidAllocator;
    use leader_types::Proposal;

    fn fresh_inner(verifier: QuorumVerifier) -> LeaderInner {
        LeaderInner {
            zxid_allocator: ZxidAllocator::new(5, 3),
            outstanding: OutstandingTable::new(),
            last_committed: Zxid::new(5, 3),
            last_proposed: Zxid::new(5, 3),
            current_verifier: verifier,
            pending_verifier: None,
            allowed_to_commit: true,
            learners: HashMap::new(),
            pending_syncs: HashMap::new(),
            peer_view: leader_types::PeerView::new(1, HashMap::new()),
            reconfig_outstanding: None,
            shutdown: false,
        }
    }

    fn reconfig_payload(new_voters: &[ServerId]) -> ReconfigPayload {
        ReconfigPayload {
            from_config_version: 0,
            new_verifier: QuorumVerifier::majority(new_voters.iter().copied(), 1),
            peer_updates: HashMap::new(),
            removed: HashSet::new(),
        }
    }

    #[test]
    fn self_remains_leader_when_still_a_voter() {
        let mut inner = fresh_inner(QuorumVerifier::majority([1, 2, 3], 0));
        let payload = reconfig_payload(&[1, 2]);
        let outcome = apply_reconfig_commit(&mut inner, 1, Zxid::new(5, 4), &payload);
        assert!(outcome.still_leading);
        assert_eq!(outcome.designated_leader, 1);
        assert!(inner.allowed_to_commit);
    }

    #[test]
    fn self_steps_down_when_dropped_from_new_config() {
        let mut inner = fresh_inner(QuorumVerifier::majority([1, 2, 3], 0));
        let payload = reconfig_payload(&[2, 3]);
        let outcome = apply_reconfig_commit(&mut inner, 1, Zxid::new(5, 4), &payload);
        assert!(!outcome.still_leading);
        assert!(!inner.allowed_to_commit);
        // deterministic: lowest sid in the surviving candidate set wins
        // when no subsequent proposals narrow it further.
        assert_eq!(outcome.designated_leader, 2);
    }

    #[test]
    fn designated_leader_narrows_by_subsequent_acks() {
        let mut inner = fresh_inner(QuorumVerifier::majority([1, 2, 3], 0));
        let reconfig_zxid = Zxid::new(5, 4);
        inner.last_committed = reconfig_zxid;

        let next_zxid = Zxid::new(5, 5);
        let mut tracker = AckQuorumTracker::new(QuorumVerifier::majority([2, 3], 1));
        tracker.add_ack(3);
        inner
            .outstanding
            .insert(Proposal::new(next_zxid, vec![9]), tracker);

        let payload = reconfig_payload(&[2, 3]);
        let outcome = apply_reconfig_commit(&mut inner, 1, reconfig_zxid, &payload);
        assert_eq!(outcome.designated_leader, 3);
    }

    #[test]
    fn verifier_and_peer_view_swap_on_commit() {
        let mut inner = fresh_inner(QuorumVerifier::majority([1, 2, 3], 0));
        inner.pending_verifier = Some(QuorumVerifier::majority([1, 2], 1));
        let payload = reconfig_payload(&[1, 2]);
        apply_reconfig_commit(&mut inner, 1, Zxid::new(5, 4), &payload);
        assert_eq!(inner.current_verifier, QuorumVerifier::majority([1, 2], 1));
        assert!(inner.pending_verifier.is_none());
        assert!(inner.reconfig_outstanding.is_none());
    }
}
