//! Trait boundaries for the components spec.md §6 names as external
//! collaborators. Production code injects real implementations (data
//! tree, on-disk log, secure storage, election module); tests inject
//! in-memory fakes. No reflection, no private-field pokes — the
//! injection surface lives entirely in these trait objects.

use std::time::Duration;

use async_trait::async_trait;
use leader_types::{ServerId, ShutdownReason, Zxid};

/// A handle to a point-in-time snapshot of the replicated state, opaque
/// to the leader; `LearnerSession` only ever forwards it byte-wise over a
/// SNAP packet.
pub type SnapshotHandle = Vec<u8>;

/// A fully-formed client mutation the pipeline submits for local
/// application once its proposal commits. Opaque payload; what it means
/// is the data tree's business, not the leader's.
#[derive(Clone, Debug)]
pub struct Request {
    pub payload: Vec<u8>,
}

/// The in-memory replicated state the leader drives via ordered
/// `submitRequest` calls. Session bookkeeping lives here too since it is
/// logically part of the same collaborator in the source system.
#[async_trait]
pub trait ReplicatedState: Send + Sync {
    fn last_processed_zxid(&self) -> Zxid;
    async fn submit_request(&self, zxid: Zxid, request: Request) -> anyhow::Result<()>;
    async fn touch_session(&self, sid: ServerId, timeout: Duration) -> anyhow::Result<()>;
    async fn check_if_valid_global_session(&self, sid: ServerId, timeout: Duration) -> bool;
    async fn snapshot_stream(&self) -> anyhow::Result<SnapshotHandle>;
}

/// Durable store for the epoch this peer most recently accepted, consulted
/// and updated by `EpochAgreement::get_epoch_to_propose`.
#[async_trait]
pub trait AcceptedEpochStore: Send + Sync {
    async fn get_accepted_epoch(&self) -> anyhow::Result<u32>;
    async fn set_accepted_epoch(&self, epoch: u32) -> anyhow::Result<()>;
}

/// The on-disk transaction log, queried by `LearnerSession`'s sync
/// strategy to decide between DIFF/TRUNC/SNAP and to replay a committed
/// tail.
pub trait TransactionLog: Send + Sync {
    fn min_committed_log(&self) -> Option<Zxid>;
    fn max_committed_log(&self) -> Option<Zxid>;
    /// Committed `(zxid, payload)` pairs in `(exclusive_from, inclusive_to]`,
    /// in ascending zxid order.
    fn committed_range(
        &self,
        exclusive_from: Zxid,
        inclusive_to: Zxid,
    ) -> anyhow::Result<Vec<(Zxid, Vec<u8>)>>;
}

/// Authenticates a freshly accepted learner connection before the
/// handshake begins.
#[async_trait]
pub trait QuorumAuthServer: Send + Sync {
    async fn authenticate(&self, stream: &tokio::net::TcpStream) -> anyhow::Result<()>;
}

/// Notified on leader shutdown so the peer re-enters LOOKING and restarts
/// `FastLeaderElection`.
pub trait ElectionDriver: Send + Sync {
    fn return_to_looking(&self, reason: ShutdownReason);
}

/// Optional operator override consulted by `TickLoop` before declaring
/// quorum lost, mirroring the "oracle-override hook" spec.md §4.9 allows.
pub trait QuorumOracle: Send + Sync {
    /// Returns `true` if the leader should keep running despite the
    /// synced set failing the configured verifiers.
    fn override_quorum_loss(&self) -> bool {
        false
    }
}
