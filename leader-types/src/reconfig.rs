use std::collections::{HashMap, HashSet};

use crate::common::ServerId;
use crate::peer_view::PeerInfo;
use crate::quorum_verifier::QuorumVerifier;

/// The content carried by a `reconfig` proposal's payload: the resulting
/// membership. `propose(reconfig, leave={3}, joining={}, fromConfig=...)`
/// in spec.md's literal scenarios becomes `removed = {3}`,
/// `peer_updates = {}`, here.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReconfigPayload {
    pub from_config_version: u64,
    pub new_verifier: QuorumVerifier,
    pub peer_updates: HashMap<ServerId, PeerInfo>,
    pub removed: HashSet<ServerId>,
}

impl ReconfigPayload {
    pub fn encode(&self) -> Result<Vec<u8>, bcs::Error> {
        bcs::to_bytes(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bcs::Error> {
        bcs::from_bytes(bytes)
    }
}
