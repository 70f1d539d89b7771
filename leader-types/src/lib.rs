//! Shared data and wire types for the Zab leader engine: the pieces that
//! are pure values with no mutable tracking state, mirroring the split
//! between `consensus-types` and `consensus` in the teacher codebase.

pub mod common;
pub mod error;
pub mod packet;
pub mod peer_view;
pub mod proposal;
pub mod quorum_verifier;
pub mod reconfig;
pub mod state_summary;
pub mod zxid;

pub use common::{LearnerRole, ServerId};
pub use error::{LeaderError, ProposeError, ReconfigError, ShutdownReason, SessionError};
pub use packet::{LeaderInfo, LearnerInfo, Packet, PacketType};
pub use peer_view::{PeerInfo, PeerView};
pub use proposal::{Proposal, RequestMetadata};
pub use reconfig::ReconfigPayload;
pub use quorum_verifier::{QuorumVerifier, WeightedGroup};
pub use state_summary::StateSummary;
pub use zxid::{Zxid, ZXID_COUNTER_SATURATED};
