use std::sync::Arc;

use leader_types::{LeaderError, Packet, PacketType, Zxid};
use tracing::{info, warn};

use crate::leader_state::LeaderShared;

/// Periodic quorum-health check driving §4.9: every `tickTime/2`, checks
/// whether the currently synced forwarding set still satisfies both the
/// current and (if a reconfig is outstanding) pending `QuorumVerifier`,
/// shutting the leader down with `QuorumLost` if not. Pings every learner
/// every other tick, outside the leader lock.
pub struct TickLoop {
    shared: Arc<LeaderShared>,
    tick_counter: u64,
}

impl TickLoop {
    pub fn new(shared: Arc<LeaderShared>) -> Self {
        TickLoop {
            shared,
            tick_counter: 0,
        }
    }

    /// Runs until a quorum-loss shutdown or `shutdown_rx` signals true.
    /// Returns the error that caused the shutdown, or `Ok(())` on a clean
    /// external shutdown request.
    pub async fn run(
        mut self,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), LeaderError> {
        let mut interval = tokio::time::interval(self.shared.config.tick_interval());

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return Ok(());
                    }
                    continue;
                }
            }

            if let Err(err) = self.check_quorum() {
                warn!(error = %err, "tick loop detected quorum loss");
                let mut inner = self.shared.inner.lock();
                inner.shutdown = true;
                return Err(err);
            }

            self.tick_counter += 1;
            if self.tick_counter % 2 == 0 {
                self.ping_all_learners();
            }
        }
    }

    fn check_quorum(&self) -> Result<(), LeaderError> {
        let inner = self.shared.inner.lock();
        if inner.shutdown {
            return Ok(());
        }

        let mut synced = inner.synced_participant_sids();
        synced.insert(self.shared.my_id);

        let satisfies_current = inner.current_verifier.contains_quorum(&synced);
        let satisfies_pending = inner
            .pending_verifier
            .as_ref()
            .map(|v| v.contains_quorum(&synced))
            .unwrap_or(true);

        if satisfies_current && satisfies_pending {
            return Ok(());
        }

        if let Some(oracle) = &self.shared.quorum_oracle {
            if oracle.override_quorum_loss() {
                info!("quorum loss overridden by QuorumOracle");
                return Ok(());
            }
        }

        Err(LeaderError::QuorumLost {
            detail: format!("synced set {:?} no longer satisfies configured quorum", synced),
        })
    }

    fn ping_all_learners(&self) {
        let handles: Vec<_> = {
            let inner = self.shared.inner.lock();
            inner.learners.values().cloned().collect()
        };
        for handle in handles {
            let ping = Packet::new(PacketType::Ping, last_ping_zxid(&self.shared), vec![]);
            handle.send(ping);
        }
    }
}

fn last_ping_zxid(shared: &LeaderShared) -> Zxid {
    shared.inner.lock().last_committed
}
