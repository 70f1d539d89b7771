use std::cmp::Ordering;

use crate::zxid::Zxid;

/// `{currentEpoch, lastZxid}` exchanged during epoch agreement (ACKEPOCH).
/// Ordering is lexicographic on `(current_epoch, last_zxid)`: a summary is
/// "more recent" iff its epoch is higher, or epochs tie and its zxid is
/// higher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StateSummary {
    pub current_epoch: u32,
    pub last_zxid: Zxid,
}

impl StateSummary {
    pub fn new(current_epoch: u32, last_zxid: Zxid) -> Self {
        StateSummary {
            current_epoch,
            last_zxid,
        }
    }
}

impl PartialOrd for StateSummary {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StateSummary {
    fn cmp(&self, other: &Self) -> Ordering {
        self.current_epoch
            .cmp(&other.current_epoch)
            .then(self.last_zxid.cmp(&other.last_zxid))
    }
}
