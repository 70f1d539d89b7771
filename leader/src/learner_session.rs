use std::sync::Arc;

use leader_types::{
    LeaderError, LeaderInfo, LearnerInfo, LearnerRole, Packet, PacketType, ServerId, SessionError,
    StateSummary, Zxid,
};
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::epoch_agreement::EpochAgreement;
use crate::learner_handle::LearnerHandle;
use crate::leader_state::LeaderShared;
use crate::proposal_pipeline::ProposalPipeline;
use crate::sync_strategy::{compute_sync_strategy, SyncStrategy};
use crate::wire::{PacketReader, PacketWriter};

/// Per-follower protocol handler (spec.md §4.5): drives one learner
/// connection from its handshake through `SERVING`, contributing to the
/// shared `EpochAgreement` barriers along the way and forwarding acks into
/// `ProposalPipeline` once caught up. One instance per accepted connection;
/// the acceptor spawns `run` and forgets the handle.
pub struct LearnerSession {
    shared: Arc<LeaderShared>,
    epoch_agreement: Arc<EpochAgreement>,
    proposal_pipeline: Arc<ProposalPipeline>,
    fatal_tx: mpsc::UnboundedSender<LeaderError>,
}

impl LearnerSession {
    pub fn new(
        shared: Arc<LeaderShared>,
        epoch_agreement: Arc<EpochAgreement>,
        proposal_pipeline: Arc<ProposalPipeline>,
        fatal_tx: mpsc::UnboundedSender<LeaderError>,
    ) -> Self {
        LearnerSession {
            shared,
            epoch_agreement,
            proposal_pipeline,
            fatal_tx,
        }
    }

    /// Drives the session to completion; errors are local (the session
    /// simply closes) except where `drive_protocol` has already reported a
    /// quorum-breaking `LeaderError` on `fatal_tx`.
    pub async fn run(self, stream: TcpStream) {
        if let Err(err) = self.run_inner(stream).await {
            debug!(error = %err, "learner session closed");
        }
    }

    async fn run_inner(self, stream: TcpStream) -> Result<(), SessionError> {
        let _ = stream.set_nodelay(self.shared.config.leader_nodelay);
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = PacketReader::new(read_half);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Packet>();
        let writer_task = tokio::spawn(run_writer(write_half, outbound_rx));

        let result = self.drive_protocol(&mut reader, &outbound_tx).await;

        drop(outbound_tx);
        let _ = writer_task.await;
        result
    }

    async fn drive_protocol(
        &self,
        reader: &mut PacketReader<tokio::io::ReadHalf<TcpStream>>,
        outbound: &mpsc::UnboundedSender<Packet>,
    ) -> Result<(), SessionError> {
        let init_deadline = self.shared.config.init_limit_duration();
        let sync_deadline = self.shared.config.sync_limit_duration();

        // READING_INFO
        let info_packet = read_or_close(reader, init_deadline).await?;
        let (sid, role, learner_info) = match info_packet.packet_type {
            PacketType::FollowerInfo => {
                let info: LearnerInfo = decode_payload(&info_packet)?;
                (info.sid, LearnerRole::Participant, info)
            }
            PacketType::ObserverInfo => {
                let info: LearnerInfo = decode_payload(&info_packet)?;
                (info.sid, LearnerRole::Observer, info)
            }
            other => {
                return Err(SessionError::ProtocolViolation(format!(
                    "expected FOLLOWERINFO/OBSERVERINFO, got {other:?}"
                )))
            }
        };

        let _guard = self.register(sid, role, outbound.clone());

        // SENT_LEADERINFO
        let epoch = match self
            .epoch_agreement
            .get_epoch_to_propose(sid, learner_info.accepted_epoch)
            .await
        {
            Ok(epoch) => epoch,
            Err(err) => return self.fail_fatal(err),
        };
        let leader_info = LeaderInfo {
            epoch,
            protocol_version: learner_info.protocol_version,
        };
        send(outbound, Packet::new(PacketType::LeaderInfo, Zxid::epoch_seed(epoch), encode(&leader_info)?));

        let ackepoch_packet = read_or_close(reader, init_deadline).await?;
        require_type(&ackepoch_packet, PacketType::AckEpoch)?;
        let summary: StateSummary = decode_payload(&ackepoch_packet)?;
        if let Err(err) = self.epoch_agreement.wait_for_epoch_ack(sid, summary).await {
            return self.fail_fatal(err);
        }

        // SYNCING
        let (leader_last_zxid, new_leader_zxid) = {
            let inner = self.shared.inner.lock();
            (inner.last_proposed, inner.zxid_allocator.new_leader_zxid())
        };
        let strategy = compute_sync_strategy(
            summary.last_zxid,
            leader_last_zxid,
            self.shared.transaction_log.as_ref(),
        )
        .map_err(|e| SessionError::ProtocolViolation(e.to_string()))?;
        self.send_sync_strategy(outbound, &strategy);
        send(outbound, Packet::new(PacketType::NewLeader, new_leader_zxid, vec![]));

        let nl_ack = read_or_close(reader, init_deadline).await?;
        require_type(&nl_ack, PacketType::Ack)?;
        if let Err(err) = self
            .epoch_agreement
            .wait_for_new_leader_ack(sid, nl_ack.zxid)
            .await
        {
            return self.fail_fatal(err);
        }

        // UPTODATE_WAIT
        send(outbound, Packet::new(PacketType::UpToDate, new_leader_zxid, vec![]));
        let ud_ack = read_or_close(reader, sync_deadline).await?;
        require_type(&ud_ack, PacketType::Ack)?;
        self.mark_synced(sid);

        // SERVING
        loop {
            let packet = match reader_read_timeout(reader, sync_deadline).await? {
                Some(p) => p,
                None => break,
            };
            match packet.packet_type {
                PacketType::Ack => {
                    if let Err(err) = self.proposal_pipeline.process_ack(sid, packet.zxid).await {
                        warn!(sid, error = %err, "failed to apply committed request");
                    }
                }
                PacketType::Ping => {
                    let _ = self
                        .shared
                        .replicated_state
                        .touch_session(sid, sync_deadline)
                        .await;
                }
                PacketType::Revalidate => {
                    let valid = self
                        .shared
                        .replicated_state
                        .check_if_valid_global_session(sid, sync_deadline)
                        .await;
                    send(
                        outbound,
                        Packet::new(PacketType::Revalidate, packet.zxid, vec![valid as u8]),
                    );
                }
                PacketType::Request => {
                    if let Err(err) = self.proposal_pipeline.propose(packet.payload, None) {
                        warn!(sid, error = %err, "dropped forwarded request");
                    }
                }
                other => {
                    return Err(SessionError::ProtocolViolation(format!(
                        "unexpected packet {other:?} while SERVING"
                    )))
                }
            }
        }

        Ok(())
    }

    fn register(&self, sid: ServerId, role: LearnerRole, outbound: mpsc::UnboundedSender<Packet>) -> DeregisterGuard {
        let mut inner = self.shared.inner.lock();
        inner.learners.insert(
            sid,
            LearnerHandle {
                sid,
                role,
                outbound,
                synced: false,
            },
        );
        DeregisterGuard {
            shared: self.shared.clone(),
            sid,
        }
    }

    fn mark_synced(&self, sid: ServerId) {
        let mut inner = self.shared.inner.lock();
        if let Some(handle) = inner.learners.get_mut(&sid) {
            handle.synced = true;
        }
    }

    fn send_sync_strategy(&self, outbound: &mpsc::UnboundedSender<Packet>, strategy: &SyncStrategy) {
        match strategy {
            SyncStrategy::Diff { replay } => {
                send(outbound, Packet::new(PacketType::Diff, Zxid::new(0, 0), vec![]));
                for (zxid, payload) in replay {
                    send(outbound, Packet::new(PacketType::Proposal, *zxid, payload.clone()));
                    send(outbound, Packet::new(PacketType::Commit, *zxid, vec![]));
                }
            }
            SyncStrategy::Trunc { trunc_to } => {
                send(outbound, Packet::new(PacketType::Trunc, *trunc_to, vec![]));
            }
            SyncStrategy::Snap => {
                send(outbound, Packet::new(PacketType::Snap, Zxid::new(0, 0), vec![]));
            }
        }
    }

    fn fail_fatal(&self, err: LeaderError) -> Result<(), SessionError> {
        let message = err.to_string();
        let _ = self.fatal_tx.send(err);
        Err(SessionError::ProtocolViolation(message))
    }
}

/// Removes the learner handle on every exit path from `drive_protocol`
/// (return, error, or panic unwind), matching the CLOSED state's "leader
/// removes from forwarding/observer sets" transition.
struct DeregisterGuard {
    shared: Arc<LeaderShared>,
    sid: ServerId,
}

impl Drop for DeregisterGuard {
    fn drop(&mut self) {
        self.shared.inner.lock().learners.remove(&self.sid);
    }
}

async fn run_writer(write_half: tokio::io::WriteHalf<TcpStream>, mut rx: mpsc::UnboundedReceiver<Packet>) {
    let mut writer = PacketWriter::new(write_half);
    while let Some(packet) = rx.recv().await {
        if writer.write_packet(&packet).await.is_err() {
            break;
        }
    }
}

fn send(outbound: &mpsc::UnboundedSender<Packet>, packet: Packet) {
    let _ = outbound.send(packet);
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, SessionError> {
    bcs::to_bytes(value).map_err(SessionError::Decode)
}

fn decode_payload<T: DeserializeOwned>(packet: &Packet) -> Result<T, SessionError> {
    bcs::from_bytes(&packet.payload).map_err(SessionError::Decode)
}

fn require_type(packet: &Packet, expected: PacketType) -> Result<(), SessionError> {
    if packet.packet_type == expected {
        Ok(())
    } else {
        Err(SessionError::ProtocolViolation(format!(
            "expected {expected:?}, got {:?}",
            packet.packet_type
        )))
    }
}

async fn reader_read_timeout(
    reader: &mut PacketReader<tokio::io::ReadHalf<TcpStream>>,
    deadline: std::time::Duration,
) -> Result<Option<Packet>, SessionError> {
    match tokio::time::timeout(deadline, reader.read_packet()).await {
        Ok(result) => result,
        Err(_) => Err(SessionError::Timeout),
    }
}

async fn read_or_close(
    reader: &mut PacketReader<tokio::io::ReadHalf<TcpStream>>,
    deadline: std::time::Duration,
) -> Result<Packet, SessionError> {
    reader_read_timeout(reader, deadline)
        .await?
        .ok_or(SessionError::Closed)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use leader_types::{PeerView, QuorumVerifier};
    use tokio::net::{TcpListener, TcpStream};

    use crate::collaborators::{
        AcceptedEpochStore, QuorumAuthServer, ReplicatedState, Request, SnapshotHandle, TransactionLog,
    };
    use crate::config::LeaderConfig;

    struct FakeReplicatedState;
    #[async_trait::async_trait]
    impl ReplicatedState for FakeReplicatedState {
        fn last_processed_zxid(&self) -> Zxid {
            Zxid::new(0, 0)
        }
        async fn submit_request(&self, _zxid: Zxid, _request: Request) -> anyhow::Result<()> {
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

    struct FakeEpochStore;
    #[async_trait::async_trait]
    impl AcceptedEpochStore for FakeEpochStore {
        async fn get_accepted_epoch(&self) -> anyhow::Result<u32> {
            Ok(4)
        }
        async fn set_accepted_epoch(&self, _epoch: u32) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct FakeTransactionLog;
    impl TransactionLog for FakeTransactionLog {
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
        async fn authenticate(&self, _stream: &TcpStream) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn test_shared() -> Arc<LeaderShared> {
        LeaderShared::new(
            1,
            LeaderConfig::default(),
            5,
            0,
            QuorumVerifier::majority([1, 2], 0),
            PeerView::new(1, HashMap::new()),
            Arc::new(FakeReplicatedState),
            Arc::new(FakeTransactionLog),
            Arc::new(FakeEpochStore),
            Arc::new(FakeQuorumAuth),
            None,
        )
    }

    #[tokio::test]
    async fn follower_handshake_reaches_serving_and_acks_commit() {
        let shared = test_shared();
        let epoch_agreement = Arc::new(crate::epoch_agreement::EpochAgreement::new(
            1,
            QuorumVerifier::majority([1, 2], 0),
            StateSummary::new(4, Zxid::new(4, 0)),
            Zxid::new(5, 0),
            shared.config.init_limit_duration(),
            None,
            shared.accepted_epoch_store.clone(),
        ));
        let pipeline = Arc::new(ProposalPipeline::new(shared.clone()));
        let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let session_shared = shared.clone();
        let session_epoch = epoch_agreement.clone();
        let session_pipeline = pipeline.clone();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            LearnerSession::new(session_shared, session_epoch, session_pipeline, fatal_tx)
                .run(stream)
                .await;
        });

        let client = TcpStream::connect(addr).await.unwrap();
        let (read_half, write_half) = tokio::io::split(client);
        let mut reader = PacketReader::new(read_half);
        let mut writer = PacketWriter::new(write_half);

        // also drive self's own contribution so the 2-voter quorum forms.
        let self_epoch = epoch_agreement.clone();
        tokio::spawn(async move {
            let _ = self_epoch.get_epoch_to_propose(1, 4).await;
        });

        let info = LearnerInfo {
            sid: 2,
            accepted_epoch: 4,
            protocol_version: 1,
        };
        writer
            .write_packet(&Packet::new(
                PacketType::FollowerInfo,
                Zxid::new(0, 0),
                bcs::to_bytes(&info).unwrap(),
            ))
            .await
            .unwrap();

        let leader_info_packet = reader.read_packet().await.unwrap().unwrap();
        assert_eq!(leader_info_packet.packet_type, PacketType::LeaderInfo);

        writer
            .write_packet(&Packet::new(
                PacketType::AckEpoch,
                Zxid::new(0, 0),
                bcs::to_bytes(&StateSummary::new(4, Zxid::new(4, 0))).unwrap(),
            ))
            .await
            .unwrap();

        // DIFF (matching follower, no replay) then NEWLEADER.
        let diff_packet = reader.read_packet().await.unwrap().unwrap();
        assert_eq!(diff_packet.packet_type, PacketType::Diff);
        let new_leader_packet = reader.read_packet().await.unwrap().unwrap();
        assert_eq!(new_leader_packet.packet_type, PacketType::NewLeader);

        writer
            .write_packet(&Packet::new(PacketType::Ack, new_leader_packet.zxid, vec![]))
            .await
            .unwrap();

        let uptodate_packet = reader.read_packet().await.unwrap().unwrap();
        assert_eq!(uptodate_packet.packet_type, PacketType::UpToDate);

        writer
            .write_packet(&Packet::new(PacketType::Ack, uptodate_packet.zxid, vec![]))
            .await
            .unwrap();

        // give SERVING time to mark this handle synced, then propose and
        // confirm the PROPOSAL packet reaches this learner.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let proposal = pipeline.propose(vec![42], None).unwrap();
        let proposal_packet = reader.read_packet().await.unwrap().unwrap();
        assert_eq!(proposal_packet.packet_type, PacketType::Proposal);
        assert_eq!(proposal_packet.zxid, proposal.zxid);

        writer
            .write_packet(&Packet::new(PacketType::Ack, proposal.zxid, vec![]))
            .await
            .unwrap();

        let commit_packet = reader.read_packet().await.unwrap().unwrap();
        assert_eq!(commit_packet.packet_type, PacketType::Commit);

        drop(writer);
        let _ = server.await;
        assert!(fatal_rx.try_recv().is_err());
    }
}
