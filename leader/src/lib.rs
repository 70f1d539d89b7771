//! Leader-side Zab atomic broadcast engine: epoch agreement, the learner
//! acceptor and per-learner session state machine, the proposal/commit
//! pipeline, reconfiguration, and the tick-driven liveness check.
//!
//! This crate owns only the leader role. A peer constructs a [`Leader`]
//! once its election module promotes it, calls [`Leader::lead`], and on
//! return re-enters LOOKING; the crate has no opinion on how election or
//! persistence are implemented beyond the trait boundaries in
//! [`collaborators`].

pub mod acceptor;
pub mod ack_quorum_tracker;
pub mod collaborators;
pub mod config;
pub mod epoch_agreement;
pub mod infallible;
pub mod leader;
pub mod leader_state;
pub mod learner_handle;
pub mod learner_session;
pub mod outstanding_table;
pub mod proposal_pipeline;
pub mod reconfig_coordinator;
pub mod sync_strategy;
pub mod tick_loop;
pub mod wire;
pub mod zxid_allocator;

pub use acceptor::LearnerConnectionAcceptor;
pub use collaborators::{
    AcceptedEpochStore, ElectionDriver, QuorumAuthServer, QuorumOracle, ReplicatedState, Request,
    SnapshotHandle, TransactionLog,
};
pub use config::LeaderConfig;
pub use epoch_agreement::EpochAgreement;
pub use leader::Leader;
pub use leader_state::{LeaderInner, LeaderShared};
pub use learner_handle::LearnerHandle;
pub use outstanding_table::OutstandingTable;
pub use proposal_pipeline::ProposalPipeline;
pub use reconfig_coordinator::{apply_reconfig_commit, ReconfigOutcome};
pub use tick_loop::TickLoop;
pub use zxid_allocator::ZxidAllocator;
