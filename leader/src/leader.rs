use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use leader_types::{LeaderError, ShutdownReason, StateSummary};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::acceptor::LearnerConnectionAcceptor;
use crate::collaborators::ElectionDriver;
use crate::epoch_agreement::EpochAgreement;
use crate::leader_state::LeaderShared;
use crate::proposal_pipeline::ProposalPipeline;
use crate::tick_loop::TickLoop;

/// Top-level control flow (spec.md §2): once election promotes this peer,
/// `lead()` drives the three epoch barriers for its own vote, starts the
/// learner acceptor and proposal pipeline, then runs the tick loop until
/// either a quorum-breaking error surfaces from some learner session or the
/// tick loop itself detects quorum loss — at which point it shuts
/// everything down and hands control back to the `ElectionDriver`.
///
/// Simplification (see DESIGN.md): the epoch this leader proposes is fixed
/// at construction time rather than recomputed if barrier negotiation would
/// freeze a higher epoch than the caller's initial guess; callers are
/// expected to seed `LeaderShared` with `accepted_epoch + 1`.
pub struct Leader {
    shared: Arc<LeaderShared>,
    epoch_agreement: Arc<EpochAgreement>,
    proposal_pipeline: Arc<ProposalPipeline>,
    election_driver: Arc<dyn ElectionDriver>,
}

impl Leader {
    pub fn new(
        shared: Arc<LeaderShared>,
        election_driver: Arc<dyn ElectionDriver>,
        my_summary: StateSummary,
    ) -> Self {
        let (verifier, new_leader_zxid) = {
            let inner = shared.inner.lock();
            (inner.current_verifier.clone(), inner.zxid_allocator.new_leader_zxid())
        };
        let epoch_agreement = Arc::new(EpochAgreement::new(
            shared.my_id,
            verifier,
            my_summary,
            new_leader_zxid,
            shared.config.init_limit_duration(),
            shared
                .config
                .leader_max_time_to_wait_for_epoch
                .map(Duration::from_millis),
            shared.accepted_epoch_store.clone(),
        ));
        let proposal_pipeline = Arc::new(ProposalPipeline::new(shared.clone()));
        Leader {
            shared,
            epoch_agreement,
            proposal_pipeline,
            election_driver,
        }
    }

    /// Runs until shutdown, then returns the reason and notifies the
    /// election driver so the peer re-enters LOOKING.
    pub async fn lead(self, listen_addrs: Vec<SocketAddr>) -> ShutdownReason {
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel::<LeaderError>();

        let acceptor = LearnerConnectionAcceptor::new(
            self.shared.clone(),
            self.epoch_agreement.clone(),
            self.proposal_pipeline.clone(),
            fatal_tx,
        );
        let acceptor_handle = tokio::spawn(acceptor.run(listen_addrs, shutdown_rx.clone()));

        let reason = match self.negotiate_own_epoch().await {
            Ok(()) => self.serve(shutdown_rx.clone(), &mut fatal_rx).await,
            Err(err) => {
                error!(error = %err, "epoch negotiation failed; aborting leadership");
                ShutdownReason::from(&err)
            }
        };

        let _ = shutdown_tx.send(true);
        let _ = acceptor_handle.await;
        info!(?reason, "leader shut down");
        self.election_driver.return_to_looking(reason.clone());
        reason
    }

    /// The leader's own contribution to all three epoch barriers — the
    /// `connecting`/`electing`/NEWLEADER-ackset each require the leader
    /// itself to vote, not only its learners.
    async fn negotiate_own_epoch(&self) -> Result<(), LeaderError> {
        let my_id = self.shared.my_id;
        let last_accepted_epoch = self
            .shared
            .accepted_epoch_store
            .get_accepted_epoch()
            .await
            .map_err(|e| LeaderError::PersistenceFailure(e.to_string()))?;

        self.epoch_agreement
            .get_epoch_to_propose(my_id, last_accepted_epoch)
            .await?;

        let my_summary = {
            let inner = self.shared.inner.lock();
            StateSummary::new(inner.zxid_allocator.epoch(), inner.last_committed)
        };
        self.epoch_agreement.wait_for_epoch_ack(my_id, my_summary).await?;

        let new_leader_zxid = self.shared.inner.lock().zxid_allocator.new_leader_zxid();
        self.epoch_agreement
            .wait_for_new_leader_ack(my_id, new_leader_zxid)
            .await?;

        let mut inner = self.shared.inner.lock();
        if inner.last_committed < new_leader_zxid {
            inner.last_committed = new_leader_zxid;
            inner.last_proposed = new_leader_zxid;
        }
        Ok(())
    }

    async fn serve(
        &self,
        shutdown_rx: tokio::sync::watch::Receiver<bool>,
        fatal_rx: &mut mpsc::UnboundedReceiver<LeaderError>,
    ) -> ShutdownReason {
        let tick_loop = TickLoop::new(self.shared.clone());
        let mut tick_handle = Box::pin(tick_loop.run(shutdown_rx));

        tokio::select! {
            Some(err) = fatal_rx.recv() => {
                let mut inner = self.shared.inner.lock();
                inner.shutdown = true;
                ShutdownReason::from(&err)
            }
            result = &mut tick_handle => match result {
                Ok(()) => ShutdownReason::Requested,
                Err(err) => ShutdownReason::from(&err),
            },
        }
    }
}
