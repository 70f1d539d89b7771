use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use leader_types::LeaderError;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::epoch_agreement::EpochAgreement;
use crate::leader_state::LeaderShared;
use crate::learner_session::LearnerSession;
use crate::proposal_pipeline::ProposalPipeline;

/// Binds one `TcpListener` per configured quorum address and spawns a
/// `LearnerSession` for every accepted connection that passes
/// `QuorumAuthServer` authentication (spec.md §4.4). Bind failure on every
/// address is fatal; bind failure on a subset is logged and skipped — the
/// remaining listeners still carry the cluster.
pub struct LearnerConnectionAcceptor {
    shared: Arc<LeaderShared>,
    epoch_agreement: Arc<EpochAgreement>,
    proposal_pipeline: Arc<ProposalPipeline>,
    fatal_tx: mpsc::UnboundedSender<LeaderError>,
}

impl LearnerConnectionAcceptor {
    pub fn new(
        shared: Arc<LeaderShared>,
        epoch_agreement: Arc<EpochAgreement>,
        proposal_pipeline: Arc<ProposalPipeline>,
        fatal_tx: mpsc::UnboundedSender<LeaderError>,
    ) -> Self {
        LearnerConnectionAcceptor {
            shared,
            epoch_agreement,
            proposal_pipeline,
            fatal_tx,
        }
    }

    /// Binds every address in `addrs` (or fails if none bind), then runs
    /// the accept loops until `shutdown_rx` fires. Each bound listener
    /// services its own accept task. When `listen_on_all_ips` is set, each
    /// configured address is bound as its family's wildcard instead, per
    /// spec.md §4.4.
    pub async fn run(
        self,
        addrs: Vec<SocketAddr>,
        shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), LeaderError> {
        let addrs = self.effective_bind_addrs(addrs);
        let mut listeners = Vec::new();
        for addr in &addrs {
            match TcpListener::bind(addr).await {
                Ok(listener) => {
                    info!(%addr, "learner acceptor bound");
                    listeners.push(listener);
                }
                Err(err) => warn!(%addr, error = %err, "failed to bind learner acceptor address"),
            }
        }

        if listeners.is_empty() {
            return Err(LeaderError::BindFailure(format!(
                "failed to bind any of {addrs:?}"
            )));
        }

        let shared = Arc::new(self);
        let mut tasks = Vec::new();
        for listener in listeners {
            let shared = shared.clone();
            let mut shutdown_rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        accepted = listener.accept() => {
                            match accepted {
                                Ok((stream, peer)) => shared.clone().spawn_session(stream, peer),
                                Err(err) => warn!(error = %err, "accept failed"),
                            }
                        }
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            }));
        }

        for task in tasks {
            let _ = task.await;
        }
        Ok(())
    }

    /// Substitutes each address's family-wildcard (`0.0.0.0` / `[::]`) when
    /// `listen_on_all_ips` is configured, deduping the result so binding
    /// several configured ports on the same family doesn't yield repeat
    /// wildcard binds.
    fn effective_bind_addrs(&self, addrs: Vec<SocketAddr>) -> Vec<SocketAddr> {
        if !self.shared.config.listen_on_all_ips {
            return addrs;
        }
        let mut seen = HashSet::new();
        addrs
            .into_iter()
            .map(wildcard_for)
            .filter(|addr| seen.insert(*addr))
            .collect()
    }

    fn spawn_session(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let quorum_auth = self.shared.quorum_auth.clone();
        let shared = self.shared.clone();
        let epoch_agreement = self.epoch_agreement.clone();
        let proposal_pipeline = self.proposal_pipeline.clone();
        let fatal_tx = self.fatal_tx.clone();
        tokio::spawn(async move {
            if let Err(err) = quorum_auth.authenticate(&stream).await {
                warn!(%peer, error = %err, "learner connection failed authentication");
                return;
            }
            LearnerSession::new(shared, epoch_agreement, proposal_pipeline, fatal_tx)
                .run(stream)
                .await;
        });
    }
}

/// Maps an address to its family's wildcard, keeping the port.
fn wildcard_for(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V4(v4) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), v4.port()),
        SocketAddr::V6(v6) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), v6.port()),
    }
}
