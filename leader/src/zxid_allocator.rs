use leader_types::zxid::{Zxid, ZXID_COUNTER_SATURATED};
use leader_types::ProposeError;

/// Mints the monotonically increasing zxids a freshly elected leader hands
/// out for the rest of its epoch. Seeded once at takeover with
/// `(new_epoch << 32) | 0`; every `next()` call issues the next integer.
/// Once the low 32 bits would wrap (`0xFFFFFFFF` already issued), further
/// allocation is refused — the caller is expected to treat that as fatal
/// and shut the leader down so re-election can start a fresh epoch.
pub struct ZxidAllocator {
    epoch: u32,
    last_issued: Zxid,
    saturated: bool,
}

impl ZxidAllocator {
    /// `initial_counter` lets `testingonly.initialZxid` force a starting
    /// low-32 value; production callers pass 0.
    pub fn new(epoch: u32, initial_counter: u32) -> Self {
        ZxidAllocator {
            epoch,
            last_issued: Zxid::new(epoch, initial_counter),
            saturated: initial_counter == ZXID_COUNTER_SATURATED,
        }
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn last_issued(&self) -> Zxid {
        self.last_issued
    }

    /// The zxid reserved for the NEWLEADER announcement: `(epoch << 32)`,
    /// counter zero, never reissued by `next()`.
    pub fn new_leader_zxid(&self) -> Zxid {
        Zxid::epoch_seed(self.epoch)
    }

    /// Allocates the next zxid, or `Err(ProposeError::Saturated)` if doing
    /// so would wrap the counter. Idempotently refuses again on every
    /// subsequent call once saturated.
    pub fn next(&mut self) -> Result<Zxid, ProposeError> {
        if self.saturated || self.last_issued.is_counter_saturated() {
            self.saturated = true;
            return Err(ProposeError::Saturated(self.last_issued));
        }
        let candidate = self.last_issued.next();
        self.last_issued = candidate;
        if candidate.is_counter_saturated() {
            self.saturated = true;
        }
        Ok(candidate)
    }

    pub fn is_saturated(&self) -> bool {
        self.saturated
    }
}
