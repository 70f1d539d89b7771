use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use leader_types::{PeerView, QuorumVerifier, ServerId, Zxid};

use crate::collaborators::{AcceptedEpochStore, QuorumAuthServer, QuorumOracle, ReplicatedState, TransactionLog};
use crate::config::LeaderConfig;
use crate::infallible::Mutex;
use crate::learner_handle::LearnerHandle;
use crate::outstanding_table::OutstandingTable;
use crate::zxid_allocator::ZxidAllocator;

/// Everything the single global leader lock serializes: proposal
/// creation, ack processing, commit, reconfig commit, and the tick health
/// check (spec.md §5). `Leader`'s various sub-components (`ProposalPipeline`,
/// `ReconfigCoordinator`, `TickLoop`) each borrow this through `LeaderShared`
/// rather than owning their own copies of the shared mutable state.
pub struct LeaderInner {
    pub zxid_allocator: ZxidAllocator,
    pub outstanding: OutstandingTable,
    pub last_committed: Zxid,
    pub last_proposed: Zxid,
    pub current_verifier: QuorumVerifier,
    pub pending_verifier: Option<QuorumVerifier>,
    pub allowed_to_commit: bool,
    pub learners: HashMap<ServerId, LearnerHandle>,
    pub pending_syncs: HashMap<Zxid, Vec<ServerId>>,
    pub peer_view: PeerView,
    pub reconfig_outstanding: Option<Zxid>,
    pub shutdown: bool,
}

impl LeaderInner {
    pub fn forwarding_participants(&self) -> impl Iterator<Item = &LearnerHandle> {
        self.learners
            .values()
            .filter(|h| h.synced && h.role == leader_types::LearnerRole::Participant)
    }

    pub fn observing_learners(&self) -> impl Iterator<Item = &LearnerHandle> {
        self.learners
            .values()
            .filter(|h| h.synced && h.role == leader_types::LearnerRole::Observer)
    }

    pub fn synced_participant_sids(&self) -> HashSet<ServerId> {
        self.forwarding_participants().map(|h| h.sid).collect()
    }

    pub fn broadcast_to_participants(&self, packet: leader_types::Packet) {
        for handle in self.forwarding_participants() {
            handle.send(packet.clone());
        }
    }

    pub fn broadcast_to_observers(&self, packet: leader_types::Packet) {
        for handle in self.observing_learners() {
            handle.send(packet.clone());
        }
    }
}

/// Shared, `Arc`-able handle to a running leader: the lock-protected
/// mutable state plus the immutable collaborators and configuration every
/// sub-component needs. Cloning this is cheap (one more `Arc` bump); it is
/// what `ProposalPipeline`, `ReconfigCoordinator`, `TickLoop`, and
/// `LearnerSession` each hold instead of referencing each other directly.
pub struct LeaderShared {
    pub my_id: ServerId,
    pub config: LeaderConfig,
    pub inner: Mutex<LeaderInner>,
    pub replicated_state: Arc<dyn ReplicatedState>,
    pub transaction_log: Arc<dyn TransactionLog>,
    pub accepted_epoch_store: Arc<dyn AcceptedEpochStore>,
    pub quorum_auth: Arc<dyn QuorumAuthServer>,
    pub quorum_oracle: Option<Arc<dyn QuorumOracle>>,
}

impl LeaderShared {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        my_id: ServerId,
        config: LeaderConfig,
        epoch: u32,
        initial_counter: u32,
        current_verifier: QuorumVerifier,
        peer_view: PeerView,
        replicated_state: Arc<dyn ReplicatedState>,
        transaction_log: Arc<dyn TransactionLog>,
        accepted_epoch_store: Arc<dyn AcceptedEpochStore>,
        quorum_auth: Arc<dyn QuorumAuthServer>,
        quorum_oracle: Option<Arc<dyn QuorumOracle>>,
    ) -> Arc<Self> {
        let new_leader_zxid = Zxid::epoch_seed(epoch);
        Arc::new(LeaderShared {
            my_id,
            config,
            inner: Mutex::new(LeaderInner {
                zxid_allocator: ZxidAllocator::new(epoch, initial_counter),
                outstanding: OutstandingTable::new(),
                last_committed: new_leader_zxid,
                last_proposed: new_leader_zxid,
                current_verifier,
                pending_verifier: None,
                allowed_to_commit: true,
                learners: HashMap::new(),
                pending_syncs: HashMap::new(),
                peer_view,
                reconfig_outstanding: None,
                shutdown: false,
            }),
            replicated_state,
            transaction_log,
            accepted_epoch_store,
            quorum_auth,
            quorum_oracle,
        })
    }
}
