use std::io;

use crate::zxid::Zxid;

/// Errors that invalidate the leader's quorum or ability to operate and
/// therefore terminate the leader role, handing control back to the
/// election driver.
#[derive(thiserror::Error, Debug)]
pub enum LeaderError {
    #[error("failed to bind learner acceptor on all configured addresses: {0}")]
    BindFailure(String),

    #[error("follower {sid} reported a state summary ahead of the leader's own during epoch ack")]
    FollowerAhead { sid: crate::common::ServerId },

    #[error("timed out waiting for epoch agreement after {waited_ms}ms")]
    EpochTimeout { waited_ms: u64 },

    #[error("synced set no longer satisfies quorum: {detail}")]
    QuorumLost { detail: String },

    #[error("zxid counter saturated at epoch {epoch}; a fresh epoch is required")]
    ZxidRollover { epoch: u32 },

    #[error("failed to persist accepted epoch: {0}")]
    PersistenceFailure(String),
}

/// Per-connection failure; never propagates past the owning
/// `LearnerSession` (the acceptor and every other peer continue).
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("learner I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("session timed out waiting for a packet")]
    Timeout,

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("packet decode failure: {0}")]
    Decode(#[from] bcs::Error),

    #[error("session closed")]
    Closed,
}

/// Reconfiguration requests rejected by the caller-facing validation in
/// `ReconfigCoordinator`, distinct from the fatal `LeaderError` family.
#[derive(thiserror::Error, Debug)]
pub enum ReconfigError {
    #[error("a reconfiguration is already outstanding; retry after it commits")]
    ReconfigInProgress,

    #[error("reconfig's fromConfig version {given} does not match current version {current}")]
    BadVersion { given: u64, current: u64 },

    #[error("the proposed new configuration cannot form a quorum from currently connected learners")]
    NewConfigNoQuorum,

    #[error("reconfiguration is disabled by configuration")]
    Disabled,

    #[error(transparent)]
    Propose(#[from] ProposeError),
}

/// Why the leader shut down, surfaced to the `ElectionDriver`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShutdownReason {
    BindFailure,
    FollowerAhead,
    EpochTimeout,
    QuorumLost,
    ZxidRollover,
    PersistenceFailure,
    DesignatedLeaderChanged { new_leader: crate::common::ServerId },
    Requested,
}

impl From<&LeaderError> for ShutdownReason {
    fn from(e: &LeaderError) -> Self {
        match e {
            LeaderError::BindFailure(_) => ShutdownReason::BindFailure,
            LeaderError::FollowerAhead { .. } => ShutdownReason::FollowerAhead,
            LeaderError::EpochTimeout { .. } => ShutdownReason::EpochTimeout,
            LeaderError::QuorumLost { .. } => ShutdownReason::QuorumLost,
            LeaderError::ZxidRollover { .. } => ShutdownReason::ZxidRollover,
            LeaderError::PersistenceFailure(_) => ShutdownReason::PersistenceFailure,
        }
    }
}

/// Marker error returned by `propose` when the zxid counter is saturated
/// or the pipeline is otherwise throttled; carries the zxid that would
/// have been assigned so callers can log it.
#[derive(thiserror::Error, Debug)]
pub enum ProposeError {
    #[error("zxid counter saturated at {0:?}; leader must shut down")]
    Saturated(Zxid),

    #[error("proposal pipeline is throttled")]
    Throttled,
}
