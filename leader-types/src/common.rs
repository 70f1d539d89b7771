/// A cluster member identifier ("sid" in Zab parlance). ZooKeeper assigns
/// these as small positive integers configured out of band.
pub type ServerId = i64;

/// Role a learner plays once synced: participants vote and are counted by
/// a `QuorumVerifier`; observers only ever receive commits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LearnerRole {
    Participant,
    Observer,
}
