use leader_types::Zxid;

use crate::collaborators::TransactionLog;

/// How the leader will bring a reconnecting learner's log in line with its
/// own before admitting it to `UPTODATE_WAIT` (spec.md §4.5).
#[derive(Debug, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Follower already matches the leader exactly; nothing to replay.
    Diff { replay: Vec<(Zxid, Vec<u8>)> },
    /// Follower has uncommitted entries past the leader's committed tail
    /// (from a prior, now-abandoned leader); truncate to `trunc_to` first.
    /// The follower is then exactly caught up, so no replay follows.
    Trunc { trunc_to: Zxid },
    /// Follower is too far behind (or ahead with no usable log overlap) to
    /// catch up incrementally; ship the full snapshot.
    Snap,
}

/// Computes the strategy for bringing a follower reporting `follower_zxid`
/// in line with the leader's `leader_last_zxid`, consulting the
/// transaction log for the replayable committed window.
pub fn compute_sync_strategy(
    follower_zxid: Zxid,
    leader_last_zxid: Zxid,
    log: &dyn TransactionLog,
) -> anyhow::Result<SyncStrategy> {
    if follower_zxid == leader_last_zxid {
        return Ok(SyncStrategy::Diff { replay: Vec::new() });
    }

    if follower_zxid > leader_last_zxid {
        // The follower has proposals from a leader whose epoch never
        // reached quorum; roll it back to what this leader actually
        // committed. Nothing further to replay since leader_last_zxid is,
        // by definition, where the follower ends up.
        return Ok(SyncStrategy::Trunc {
            trunc_to: leader_last_zxid,
        });
    }

    let min_committed = log.min_committed_log();
    let max_committed = log.max_committed_log();
    let in_replayable_window = match (min_committed, max_committed) {
        (Some(min), Some(_max)) => follower_zxid >= min,
        _ => false,
    };

    if in_replayable_window {
        let replay = log.committed_range(follower_zxid, leader_last_zxid)?;
        Ok(SyncStrategy::Diff { replay })
    } else {
        Ok(SyncStrategy::Snap)
    }
}
