use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use leader_types::{
    PacketType, Proposal, ProposeError, ReconfigError, ReconfigPayload, RequestMetadata, ServerId, Zxid,
};
use tracing::{debug, warn};

use crate::ack_quorum_tracker::AckQuorumTracker;
use crate::collaborators::Request;
use crate::leader_state::{LeaderInner, LeaderShared};
use crate::reconfig_coordinator::{self, ReconfigOutcome};

/// What came out of committing one zxid: the generic mutation to apply to
/// `ReplicatedState`, plus the reconfig bookkeeping if it was one. Kept
/// separate from the synchronous commit bookkeeping because submitting to
/// `ReplicatedState` is the one step in the commit path that has to await,
/// and the leader lock cannot be held across an `.await` point.
enum CommitEvent {
    Ordinary { zxid: Zxid, payload: Vec<u8> },
    Reconfig { zxid: Zxid, payload: Vec<u8>, outcome: ReconfigOutcome },
}

/// Drives a proposal from client request through to commit: `propose`
/// allocates a zxid and broadcasts PROPOSAL, `process_ack` aggregates acks
/// and attempts to commit in order, cascading into subsequent proposals
/// when a reconfig commit may have unblocked them (spec.md §4.7, §4.8).
pub struct ProposalPipeline {
    shared: Arc<LeaderShared>,
    ack_counter: AtomicU64,
}

impl ProposalPipeline {
    pub fn new(shared: Arc<LeaderShared>) -> Self {
        ProposalPipeline {
            shared,
            ack_counter: AtomicU64::new(0),
        }
    }

    /// `propose(request)`.
    pub fn propose(
        &self,
        payload: Vec<u8>,
        metadata: Option<RequestMetadata>,
    ) -> Result<Proposal, ProposeError> {
        self.propose_inner(payload, metadata, false)
    }

    /// `propose(reconfig, ...)`: same shape as an ordinary proposal, but the
    /// resulting `Proposal` is marked `is_reconfig` and its ack tracker
    /// additionally carries the pending verifier until it commits.
    ///
    /// Rejected outright (no zxid consumed) when reconfiguration is
    /// disabled, another reconfig is already outstanding, `reconfig`'s
    /// `from_config_version` is stale, or the new configuration could not
    /// reach quorum from the learners currently synced (spec.md §7).
    pub fn propose_reconfig(&self, reconfig: ReconfigPayload) -> Result<Proposal, ReconfigError> {
        if !self.shared.config.reconfig_enabled {
            return Err(ReconfigError::Disabled);
        }

        let pending_verifier = reconfig.new_verifier.clone();
        let payload = reconfig
            .encode()
            .expect("ReconfigPayload always encodes under bcs");

        {
            let inner = self.shared.inner.lock();
            if inner.reconfig_outstanding.is_some() {
                return Err(ReconfigError::ReconfigInProgress);
            }
            let current_version = inner.current_verifier.version();
            if reconfig.from_config_version != current_version {
                return Err(ReconfigError::BadVersion {
                    given: reconfig.from_config_version,
                    current: current_version,
                });
            }
            let mut synced = inner.synced_participant_sids();
            synced.insert(self.shared.my_id);
            if !pending_verifier.contains_quorum(&synced) {
                return Err(ReconfigError::NewConfigNoQuorum);
            }
        }

        // The reconfig proposal itself only needs a quorum under the
        // *current* configuration — the new one doesn't exist until this
        // commits. Every proposal made after it, though, must satisfy both
        // until the reconfig lands, so the pending verifier is installed
        // only once this proposal's own tracker has already been built.
        let proposal = self.propose_inner(payload, None, true)?;
        let mut inner = self.shared.inner.lock();
        inner.pending_verifier = Some(pending_verifier);
        inner.reconfig_outstanding = Some(proposal.zxid);
        Ok(proposal)
    }

    fn propose_inner(
        &self,
        payload: Vec<u8>,
        metadata: Option<RequestMetadata>,
        is_reconfig: bool,
    ) -> Result<Proposal, ProposeError> {
        let mut inner = self.shared.inner.lock();
        if inner.shutdown {
            return Err(ProposeError::Throttled);
        }

        let zxid = inner.zxid_allocator.next()?;

        let mut proposal = Proposal::new(zxid, payload);
        if let Some(metadata) = metadata {
            proposal = proposal.with_metadata(metadata);
        }
        if is_reconfig {
            proposal = proposal.reconfig();
        }

        let mut tracker = AckQuorumTracker::new(inner.current_verifier.clone());
        if let Some(pending) = inner.pending_verifier.clone() {
            tracker.add_pending_verifier(pending);
        }

        inner.outstanding.insert(proposal.clone(), tracker);
        inner.last_proposed = zxid;

        let packet = leader_types::Packet::new(PacketType::Proposal, zxid, proposal.payload.clone());
        inner.broadcast_to_participants(packet);
        debug!(?zxid, is_reconfig, "proposal broadcast");

        Ok(proposal)
    }

    /// `processAck(sid, zxid, peerAddr)`: records the ack, then attempts to
    /// commit in zxid order starting from it. `peer_addr` only matters for
    /// NEWLEADER acks handled by `EpochAgreement`, not here.
    pub async fn process_ack(&self, sid: ServerId, zxid: Zxid) -> anyhow::Result<()> {
        let started = Instant::now();
        let result = self.process_ack_inner(sid, zxid).await;
        self.sample_ack_latency(started);
        result
    }

    async fn process_ack_inner(&self, sid: ServerId, zxid: Zxid) -> anyhow::Result<()> {
        if zxid.counter() == 0 {
            // the NEWLEADER ack; EpochAgreement::wait_for_new_leader_ack owns it.
            return Ok(());
        }

        let events = {
            let mut inner = self.shared.inner.lock();
            if !inner.allowed_to_commit || zxid <= inner.last_committed {
                return Ok(());
            }
            let had_entry = inner
                .outstanding
                .get_mut(zxid)
                .map(|entry| entry.tracker.add_ack(sid))
                .is_some();
            if !had_entry {
                return Ok(());
            }
            self.commit_cascade(&mut inner, zxid)
        };

        self.apply_commit_events(events).await
    }

    /// Modulo-N ack-latency sampler: emits a timing log every Nth ack
    /// processed, `leader_ack_logging_frequency` of 0 disables it entirely.
    fn sample_ack_latency(&self, started: Instant) {
        let frequency = self.shared.config.leader_ack_logging_frequency as u64;
        if frequency == 0 {
            return;
        }
        let count = self.ack_counter.fetch_add(1, Ordering::Relaxed) + 1;
        if count % frequency == 0 {
            debug!(
                sampled_ack = count,
                elapsed_us = started.elapsed().as_micros() as u64,
                "ack processing latency sample"
            );
        }
    }

    async fn apply_commit_events(&self, events: Vec<CommitEvent>) -> anyhow::Result<()> {
        for event in events {
            match event {
                CommitEvent::Ordinary { zxid, payload } => {
                    self.shared
                        .replicated_state
                        .submit_request(zxid, Request { payload })
                        .await?;
                }
                CommitEvent::Reconfig { zxid, payload, outcome } => {
                    self.shared
                        .replicated_state
                        .submit_request(zxid, Request { payload })
                        .await?;
                    if !outcome.still_leading {
                        warn!(
                            new_leader = outcome.designated_leader,
                            "stepping down: reconfig moved leadership elsewhere"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Attempts to commit `zxid`, then keeps walking subsequent zxids as
    /// long as each one's tracker already independently satisfies quorum.
    /// Acks can arrive out of order — a later zxid may have accumulated a
    /// full quorum while still blocked behind an earlier one that hadn't
    /// committed yet; once that earlier one lands, every already-satisfied
    /// successor falls in immediately rather than waiting for a re-ack.
    fn commit_cascade(&self, inner: &mut LeaderInner, start: Zxid) -> Vec<CommitEvent> {
        let mut events = Vec::new();
        let mut cursor = start;
        while let Some(event) = self.try_commit_one(inner, cursor) {
            cursor = cursor.next();
            events.push(event);
        }
        events
    }

    /// `tryToCommit(p, zxid)`. Returns `None` without effect unless the
    /// zxid directly preceding `zxid` has already committed (is absent from
    /// `OutstandingTable`) and `zxid` itself has quorum.
    fn try_commit_one(&self, inner: &mut LeaderInner, zxid: Zxid) -> Option<CommitEvent> {
        if !inner.allowed_to_commit {
            return None;
        }
        if zxid.counter() > 0 && inner.outstanding.contains(zxid.prev()) {
            return None;
        }
        let has_quorum = inner.outstanding.get(zxid)?.tracker.has_all_quorums();
        if !has_quorum {
            return None;
        }

        let entry = inner.outstanding.remove(zxid)?;
        inner.last_committed = zxid;

        if entry.proposal.is_reconfig {
            let reconfig = ReconfigPayload::decode(&entry.proposal.payload)
                .expect("a proposal marked is_reconfig always carries a ReconfigPayload");
            let outcome = reconfig_coordinator::apply_reconfig_commit(inner, self.shared.my_id, zxid, &reconfig);
            debug!(?zxid, designated = outcome.designated_leader, "reconfig committed");
            Some(CommitEvent::Reconfig {
                zxid,
                payload: entry.proposal.payload,
                outcome,
            })
        } else {
            let commit_packet = leader_types::Packet::new(PacketType::Commit, zxid, vec![]);
            inner.broadcast_to_participants(commit_packet);
            let inform_packet = leader_types::Packet::new(PacketType::Inform, zxid, entry.proposal.payload.clone());
            inner.broadcast_to_observers(inform_packet);

            if let Some(waiting) = inner.pending_syncs.remove(&zxid) {
                for sid in waiting {
                    if let Some(handle) = inner.learners.get(&sid) {
                        let sync_packet =
                            leader_types::Packet::new(PacketType::Sync, zxid, entry.proposal.payload.clone());
                        handle.send(sync_packet);
                        let uptodate = leader_types::Packet::new(PacketType::UpToDate, zxid, vec![]);
                        handle.send(uptodate);
                    }
                }
            }

            debug!(?zxid, "proposal committed");
            Some(CommitEvent::Ordinary {
                zxid,
                payload: entry.proposal.payload,
            })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use leader_types::{LearnerRole, PeerView, QuorumVerifier};
    use tokio::sync::mpsc;

    use crate::collaborators::{AcceptedEpochStore, QuorumAuthServer, ReplicatedState, SnapshotHandle};
    use crate::config::LeaderConfig;
    use crate::learner_handle::LearnerHandle;

    struct FakeReplicatedState {
        last: std::sync::Mutex<Zxid>,
        submitted: std::sync::Mutex<Vec<(Zxid, Vec<u8>)>>,
    }

    impl FakeReplicatedState {
        fn new() -> Self {
            FakeReplicatedState {
                last: std::sync::Mutex::new(Zxid::new(0, 0)),
                submitted: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl ReplicatedState for FakeReplicatedState {
        fn last_processed_zxid(&self) -> Zxid {
            *self.last.lock().unwrap()
        }
        async fn submit_request(&self, zxid: Zxid, request: Request) -> anyhow::Result<()> {
            *self.last.lock().unwrap() = zxid;
            self.submitted.lock().unwrap().push((zxid, request.payload));
            Ok(())
        }
        async fn touch_session(&self, _sid: ServerId, _timeout: Duration) -> anyhow::Result<()> {
            Ok(())
        }
        async fn check_if_valid_global_session(&self, _sid: ServerId, _timeout: Duration) -> bool {
            true
        }
        async fn snapshot_stream(&self) -> anyhow::Result<SnapshotHandle> {
            Ok(Vec::new())
        }
    }

    struct FakeEpochStore(AtomicU64);

    #[async_trait::async_trait]
    impl AcceptedEpochStore for FakeEpochStore {
        async fn get_accepted_epoch(&self) -> anyhow::Result<u32> {
            Ok(self.0.load(Ordering::SeqCst) as u32)
        }
        async fn set_accepted_epoch(&self, epoch: u32) -> anyhow::Result<()> {
            self.0.store(epoch as u64, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeTransactionLog;
    impl crate::collaborators::TransactionLog for FakeTransactionLog {
        fn min_committed_log(&self) -> Option<Zxid> {
            None
        }
        fn max_committed_log(&self) -> Option<Zxid> {
            None
        }
        fn committed_range(&self, _from: Zxid, _to: Zxid) -> anyhow::Result<Vec<(Zxid, Vec<u8>)>> {
            Ok(Vec::new())
        }
    }

    struct FakeQuorumAuth;
    #[async_trait::async_trait]
    impl QuorumAuthServer for FakeQuorumAuth {
        async fn authenticate(&self, _stream: &tokio::net::TcpStream) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn pipeline_with_learners(voters: &[ServerId]) -> (ProposalPipeline, Arc<LeaderShared>) {
        let verifier = QuorumVerifier::majority(voters.iter().copied(), 0);
        let shared = LeaderShared::new(
            1,
            LeaderConfig::default(),
            5,
            3,
            verifier,
            PeerView::new(1, HashMap::new()),
            Arc::new(FakeReplicatedState::new()),
            Arc::new(FakeTransactionLog),
            Arc::new(FakeEpochStore(AtomicU64::new(4))),
            Arc::new(FakeQuorumAuth),
            None,
        );
        {
            let mut inner = shared.inner.lock();
            for &sid in voters {
                let (tx, _rx) = mpsc::unbounded_channel();
                inner.learners.insert(
                    sid,
                    LearnerHandle {
                        sid,
                        role: LearnerRole::Participant,
                        outbound: tx,
                        synced: true,
                    },
                );
            }
        }
        (ProposalPipeline::new(shared.clone()), shared)
    }

    #[tokio::test]
    async fn propose_allocates_zxid_and_inserts_outstanding() {
        let (pipeline, shared) = pipeline_with_learners(&[1, 2, 3]);
        let proposal = pipeline.propose(vec![1, 2, 3], None).unwrap();
        assert_eq!(proposal.zxid, Zxid::new(5, 4));
        assert!(shared.inner.lock().outstanding.contains(proposal.zxid));
    }

    #[tokio::test]
    async fn ack_quorum_commits_in_order() {
        let (pipeline, shared) = pipeline_with_learners(&[1, 2, 3]);
        let proposal = pipeline.propose(vec![9], None).unwrap();
        pipeline.process_ack(1, proposal.zxid).await.unwrap();
        assert!(shared.inner.lock().outstanding.contains(proposal.zxid));
        pipeline.process_ack(2, proposal.zxid).await.unwrap();
        assert!(!shared.inner.lock().outstanding.contains(proposal.zxid));
        assert_eq!(shared.inner.lock().last_committed, proposal.zxid);
    }

    #[tokio::test]
    async fn commit_is_strictly_in_order() {
        let (pipeline, shared) = pipeline_with_learners(&[1, 2, 3]);
        let p1 = pipeline.propose(vec![1], None).unwrap();
        let p2 = pipeline.propose(vec![2], None).unwrap();

        // ack p2 to quorum first; it must not commit ahead of p1.
        pipeline.process_ack(1, p2.zxid).await.unwrap();
        pipeline.process_ack(2, p2.zxid).await.unwrap();
        assert!(shared.inner.lock().outstanding.contains(p2.zxid));

        // now p1 gets its quorum; both commit in order.
        pipeline.process_ack(1, p1.zxid).await.unwrap();
        pipeline.process_ack(2, p1.zxid).await.unwrap();
        assert!(!shared.inner.lock().outstanding.contains(p1.zxid));
        assert!(!shared.inner.lock().outstanding.contains(p2.zxid));
        assert_eq!(shared.inner.lock().last_committed, p2.zxid);
    }

    #[tokio::test]
    async fn reconfig_commit_cascades_into_already_acked_follow_up() {
        let (pipeline, shared) = pipeline_with_learners(&[1, 2, 3]);

        let reconfig = ReconfigPayload {
            from_config_version: 0,
            new_verifier: QuorumVerifier::majority([1, 2], 1),
            peer_updates: HashMap::new(),
            removed: [3].into_iter().collect(),
        };
        let reconfig_proposal = pipeline.propose_reconfig(reconfig).unwrap();
        let follow_up = pipeline.propose(vec![7], None).unwrap();

        // follow-up already has both old and new quorums before the
        // reconfig itself commits; it should fall in automatically.
        pipeline.process_ack(1, follow_up.zxid).await.unwrap();
        pipeline.process_ack(2, follow_up.zxid).await.unwrap();
        pipeline.process_ack(3, follow_up.zxid).await.unwrap();
        assert!(shared.inner.lock().outstanding.contains(follow_up.zxid));

        pipeline.process_ack(1, reconfig_proposal.zxid).await.unwrap();
        pipeline.process_ack(2, reconfig_proposal.zxid).await.unwrap();

        let inner = shared.inner.lock();
        assert!(!inner.outstanding.contains(reconfig_proposal.zxid));
        assert!(!inner.outstanding.contains(follow_up.zxid));
        assert_eq!(inner.last_committed, follow_up.zxid);
        assert_eq!(inner.current_verifier, QuorumVerifier::majority([1, 2], 1));
    }

    #[tokio::test]
    async fn unknown_zxid_ack_is_a_no_op() {
        let (pipeline, _shared) = pipeline_with_learners(&[1, 2, 3]);
        pipeline.process_ack(1, Zxid::new(99, 1)).await.unwrap();
    }

    fn sample_reconfig(from_config_version: u64, new_voters: &[ServerId]) -> ReconfigPayload {
        ReconfigPayload {
            from_config_version,
            new_verifier: QuorumVerifier::majority(new_voters.iter().copied(), 1),
            peer_updates: HashMap::new(),
            removed: HashSet::new(),
        }
    }

    #[tokio::test]
    async fn propose_reconfig_rejected_when_disabled() {
        let disabled_shared = LeaderShared::new(
            1,
            {
                let mut cfg = LeaderConfig::default();
                cfg.reconfig_enabled = false;
                cfg
            },
            5,
            3,
            QuorumVerifier::majority([1, 2, 3], 0),
            PeerView::new(1, HashMap::new()),
            Arc::new(FakeReplicatedState::new()),
            Arc::new(FakeTransactionLog),
            Arc::new(FakeEpochStore(AtomicU64::new(4))),
            Arc::new(FakeQuorumAuth),
            None,
        );
        let disabled_pipeline = ProposalPipeline::new(disabled_shared);
        let result = disabled_pipeline.propose_reconfig(sample_reconfig(0, &[1, 2]));
        assert!(matches!(result, Err(ReconfigError::Disabled)));
    }

    #[tokio::test]
    async fn propose_reconfig_rejected_while_one_is_outstanding() {
        let (pipeline, _shared) = pipeline_with_learners(&[1, 2, 3]);
        pipeline.propose_reconfig(sample_reconfig(0, &[1, 2])).unwrap();
        let result = pipeline.propose_reconfig(sample_reconfig(0, &[1, 2, 3]));
        assert!(matches!(result, Err(ReconfigError::ReconfigInProgress)));
    }

    #[tokio::test]
    async fn propose_reconfig_rejected_on_stale_from_config_version() {
        let (pipeline, _shared) = pipeline_with_learners(&[1, 2, 3]);
        let result = pipeline.propose_reconfig(sample_reconfig(7, &[1, 2]));
        assert!(matches!(
            result,
            Err(ReconfigError::BadVersion { given: 7, current: 0 })
        ));
    }

    #[tokio::test]
    async fn propose_reconfig_rejected_when_new_config_cannot_reach_quorum() {
        let (pipeline, _shared) = pipeline_with_learners(&[1, 2, 3]);
        // new config only knows about a voter no one has synced with.
        let result = pipeline.propose_reconfig(sample_reconfig(0, &[9]));
        assert!(matches!(result, Err(ReconfigError::NewConfigNoQuorum)));
    }
}
