use crate::common::ServerId;
use crate::zxid::Zxid;

/// Metadata about the client request a proposal originated from, owned by
/// the session-management collaborator; the leader only carries it through
/// so the reply path (outside this crate's scope) can find its way back.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RequestMetadata {
    pub session_id: ServerId,
    pub cxid: i32,
}

/// The immutable content of a proposed transaction: what gets broadcast,
/// logged, and eventually applied. Ack-aggregation state (`ackset`,
/// `verifier_pairs`) is tracked alongside this record by the
/// `OutstandingTable` / `AckQuorumTracker` pair in the `leader` crate,
/// which is the single place allowed to mutate it.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Proposal {
    pub zxid: Zxid,
    pub payload: Vec<u8>,
    pub request_metadata: Option<RequestMetadata>,
    pub is_reconfig: bool,
}

impl Proposal {
    pub fn new(zxid: Zxid, payload: Vec<u8>) -> Self {
        Proposal {
            zxid,
            payload,
            request_metadata: None,
            is_reconfig: false,
        }
    }

    pub fn with_metadata(mut self, metadata: RequestMetadata) -> Self {
        self.request_metadata = Some(metadata);
        self
    }

    pub fn reconfig(mut self) -> Self {
        self.is_reconfig = true;
        self
    }
}
