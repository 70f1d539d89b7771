use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use leader_types::{LeaderError, QuorumVerifier, ServerId, StateSummary, Zxid};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::collaborators::AcceptedEpochStore;
use crate::infallible::Mutex;

struct Inner {
    connecting: HashSet<ServerId>,
    tentative_epoch: u32,
    epoch_frozen: Option<u32>,
    electing: HashSet<ServerId>,
    new_leader_acks: HashSet<ServerId>,
    disloyal_voters: HashSet<ServerId>,
}

/// The three blocking barriers a newly elected leader drives through
/// before it may serve: `getEpochToPropose`, `waitForEpochAck`, and
/// `waitForNewLeaderAck` (spec.md §4.6). One instance is created per
/// takeover attempt and discarded once the leader reaches `SERVING` (or
/// the attempt fails).
///
/// All three barriers share one `Notify`: any state change pulses every
/// waiter, each of which re-checks its own completion condition under the
/// lock. This mirrors the single leader-lock condition variable the
/// source system waits on for all three barriers at once.
pub struct EpochAgreement {
    my_id: ServerId,
    verifier: QuorumVerifier,
    my_summary: StateSummary,
    new_leader_zxid: Zxid,
    init_limit: Duration,
    max_time_to_wait_for_epoch: Option<Duration>,
    epoch_store: Arc<dyn AcceptedEpochStore>,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl EpochAgreement {
    pub fn new(
        my_id: ServerId,
        verifier: QuorumVerifier,
        my_summary: StateSummary,
        new_leader_zxid: Zxid,
        init_limit: Duration,
        max_time_to_wait_for_epoch: Option<Duration>,
        epoch_store: Arc<dyn AcceptedEpochStore>,
    ) -> Self {
        EpochAgreement {
            my_id,
            verifier,
            my_summary,
            new_leader_zxid,
            init_limit,
            max_time_to_wait_for_epoch,
            epoch_store,
            inner: Mutex::new(Inner {
                connecting: HashSet::new(),
                tentative_epoch: 0,
                epoch_frozen: None,
                electing: HashSet::new(),
                new_leader_acks: HashSet::new(),
                disloyal_voters: HashSet::new(),
            }),
            notify: Notify::new(),
        }
    }

    /// Called when `ElectionDriver` observes a tracked voter return to
    /// LOOKING while we are still in an epoch barrier. Once wall time
    /// exceeds `maxTimeToWaitForEpoch` this fast-fails the barrier instead
    /// of waiting out the full `init_limit`.
    pub fn note_voter_returned_to_election(&self, sid: ServerId) {
        let mut inner = self.inner.lock();
        inner.disloyal_voters.insert(sid);
        self.notify.notify_waiters();
    }

    /// `getEpochToPropose(sid, lastAcceptedEpoch)`.
    pub async fn get_epoch_to_propose(
        &self,
        sid: ServerId,
        last_accepted_epoch: u32,
    ) -> Result<u32, LeaderError> {
        let started = Instant::now();
        let deadline = started + self.init_limit;
        loop {
            // Registering interest before inspecting shared state closes
            // the race where another caller freezes the epoch and fires
            // notify_waiters() between our check and our wait.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock();
                inner.connecting.insert(sid);
                inner.tentative_epoch = inner.tentative_epoch.max(last_accepted_epoch + 1);
                if let Some(epoch) = inner.epoch_frozen {
                    return Ok(epoch);
                }
                if inner.connecting.contains(&self.my_id)
                    && self.verifier.contains_quorum(&inner.connecting)
                {
                    let epoch = inner.tentative_epoch;
                    inner.epoch_frozen = Some(epoch);
                    info!(epoch, "epoch frozen by getEpochToPropose quorum");
                    self.notify.notify_waiters();
                    drop(inner);
                    self.epoch_store
                        .set_accepted_epoch(epoch)
                        .await
                        .map_err(|e| LeaderError::PersistenceFailure(e.to_string()))?;
                    return Ok(epoch);
                }
            }
            self.wait_or_timeout(sid, started, deadline, notified).await?;
        }
    }

    /// `waitForEpochAck(sid, summary)`.
    pub async fn wait_for_epoch_ack(
        &self,
        sid: ServerId,
        summary: StateSummary,
    ) -> Result<(), LeaderError> {
        let started = Instant::now();
        let deadline = started + self.init_limit;
        if summary > self.my_summary {
            return Err(LeaderError::FollowerAhead { sid });
        }
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock();
                inner.electing.insert(sid);
                if self.verifier.contains_quorum(&inner.electing) {
                    debug!(electing = inner.electing.len(), "epoch ack quorum reached");
                    self.notify.notify_waiters();
                    return Ok(());
                }
            }
            self.wait_or_timeout(sid, started, deadline, notified).await?;
        }
    }

    /// `waitForNewLeaderAck(sid, zxid)`. ACKs whose zxid does not match
    /// the NEWLEADER zxid are ignored (ZooKeeper uses the same ACK packet
    /// type for both ordinary proposal acks and the NEWLEADER ack).
    pub async fn wait_for_new_leader_ack(
        &self,
        sid: ServerId,
        zxid: Zxid,
    ) -> Result<(), LeaderError> {
        let started = Instant::now();
        let deadline = started + self.init_limit;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock();
                if zxid == self.new_leader_zxid {
                    inner.new_leader_acks.insert(sid);
                }
                if self.verifier.contains_quorum(&inner.new_leader_acks) {
                    self.notify.notify_waiters();
                    return Ok(());
                }
            }
            self.wait_or_timeout(sid, started, deadline, notified).await?;
        }
    }

    /// Blocks on an already-`enable()`d `Notified` future until the next
    /// state change or `deadline`, applying the voter-disloyalty
    /// fast-fail along the way.
    async fn wait_or_timeout(
        &self,
        sid: ServerId,
        started: Instant,
        deadline: Instant,
        notified: std::pin::Pin<&mut tokio::sync::Notified<'_>>,
    ) -> Result<(), LeaderError> {
        let now = Instant::now();
        if now >= deadline {
            return Err(LeaderError::EpochTimeout {
                waited_ms: started.elapsed().as_millis() as u64,
            });
        }
        if let Some(max_wait) = self.max_time_to_wait_for_epoch {
            let disloyal = {
                let inner = self.inner.lock();
                !inner.disloyal_voters.is_empty()
            };
            if disloyal && started.elapsed() > max_wait {
                return Err(LeaderError::EpochTimeout {
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
        }
        debug!(sid, "epoch barrier still waiting for quorum");
        let remaining = deadline - now;
        let _ = tokio::time::timeout(remaining, notified).await;
        Ok(())
    }
}
