use std::collections::HashMap;
use std::net::SocketAddr;

use crate::common::{LearnerRole, ServerId};

/// Network addresses and role of one cluster member, as known to the
/// leader. Updated only by `ReconfigCoordinator` on commit-and-activate.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PeerInfo {
    pub quorum_addr: SocketAddr,
    pub election_addr: SocketAddr,
    pub client_addr: Option<SocketAddr>,
    pub role: LearnerRole,
}

/// The leader's view of cluster membership: `sid -> PeerInfo`, plus which
/// sid the leader itself is.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PeerView {
    pub my_id: ServerId,
    pub peers: HashMap<ServerId, PeerInfo>,
}

impl PeerView {
    pub fn new(my_id: ServerId, peers: HashMap<ServerId, PeerInfo>) -> Self {
        PeerView { my_id, peers }
    }

    pub fn participants(&self) -> impl Iterator<Item = ServerId> + '_ {
        self.peers
            .iter()
            .filter(|(_, info)| info.role == LearnerRole::Participant)
            .map(|(sid, _)| *sid)
    }

    pub fn observers(&self) -> impl Iterator<Item = ServerId> + '_ {
        self.peers
            .iter()
            .filter(|(_, info)| info.role == LearnerRole::Observer)
            .map(|(sid, _)| *sid)
    }

    pub fn role_of(&self, sid: ServerId) -> Option<LearnerRole> {
        self.peers.get(&sid).map(|info| info.role)
    }
}
