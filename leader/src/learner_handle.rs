use leader_types::{LearnerRole, Packet, ServerId};
use tokio::sync::mpsc;

/// What the leader keeps about a learner once its session has been
/// accepted: just enough to forward packets to it. The session task that
/// owns the socket is the only thing holding the other end of `outbound`;
/// the leader never touches the socket directly, avoiding the
/// leader/session/state cyclic reference spec.md §9 calls out.
#[derive(Clone)]
pub struct LearnerHandle {
    pub sid: ServerId,
    pub role: LearnerRole,
    pub outbound: mpsc::UnboundedSender<Packet>,
    pub synced: bool,
}

impl LearnerHandle {
    /// Enqueues `packet` on this learner's FIFO outbound queue. A closed
    /// receiver (the session already tore down) is not an error here —
    /// the session task's own teardown is what deregisters the handle.
    pub fn send(&self, packet: Packet) {
        let _ = self.outbound.send(packet);
    }
}
