use crate::zxid::Zxid;

/// Packet type codes from the leader<->learner wire protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum PacketType {
    Request = 1,
    Proposal = 2,
    Ack = 3,
    Commit = 4,
    Ping = 5,
    Revalidate = 6,
    Sync = 7,
    Inform = 8,
    CommitAndActivate = 9,
    NewLeader = 10,
    FollowerInfo = 11,
    UpToDate = 12,
    Diff = 13,
    Trunc = 14,
    Snap = 15,
    ObserverInfo = 16,
    LeaderInfo = 17,
    AckEpoch = 18,
    InformAndActivate = 19,
}

impl PacketType {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => PacketType::Request,
            2 => PacketType::Proposal,
            3 => PacketType::Ack,
            4 => PacketType::Commit,
            5 => PacketType::Ping,
            6 => PacketType::Revalidate,
            7 => PacketType::Sync,
            8 => PacketType::Inform,
            9 => PacketType::CommitAndActivate,
            10 => PacketType::NewLeader,
            11 => PacketType::FollowerInfo,
            12 => PacketType::UpToDate,
            13 => PacketType::Diff,
            14 => PacketType::Trunc,
            15 => PacketType::Snap,
            16 => PacketType::ObserverInfo,
            17 => PacketType::LeaderInfo,
            18 => PacketType::AckEpoch,
            19 => PacketType::InformAndActivate,
            _ => return None,
        })
    }
}

/// One wire packet exchanged between a leader and a learner.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Packet {
    pub packet_type: PacketType,
    pub zxid: Zxid,
    pub payload: Vec<u8>,
    pub auth: Vec<u8>,
}

impl Packet {
    pub fn new(packet_type: PacketType, zxid: Zxid, payload: Vec<u8>) -> Self {
        Packet {
            packet_type,
            zxid,
            payload,
            auth: Vec::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, bcs::Error> {
        bcs::to_bytes(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bcs::Error> {
        bcs::from_bytes(bytes)
    }
}

/// Handshake payload carried by FOLLOWERINFO / OBSERVERINFO.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LearnerInfo {
    pub sid: crate::common::ServerId,
    pub accepted_epoch: u32,
    pub protocol_version: u32,
}

/// Handshake reply carried by LEADERINFO.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LeaderInfo {
    pub epoch: u32,
    pub protocol_version: u32,
}
