use std::collections::{BTreeMap, HashSet};

use crate::common::ServerId;

/// A voting group in a hierarchical (weighted) configuration: members and
/// their weights, plus the weight threshold the group must clear for its
/// vote to count towards the overall quorum.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WeightedGroup {
    pub members: BTreeMap<ServerId, u64>,
    pub threshold: u64,
}

impl WeightedGroup {
    fn weight_present(&self, acks: &HashSet<ServerId>) -> u64 {
        self.members
            .iter()
            .filter(|(sid, _)| acks.contains(sid))
            .map(|(_, weight)| *weight)
            .sum()
    }

    fn satisfied_by(&self, acks: &HashSet<ServerId>) -> bool {
        self.weight_present(acks) >= self.threshold
    }
}

/// Immutable decision function over a membership configuration. Two
/// variants mirror ZooKeeper's `QuorumMaj` and `QuorumHierarchical`.
/// A verifier's configuration identity is its `version` (the zxid of the
/// reconfig proposal, or 0 for the static config the leader boots with);
/// equality compares full configuration contents, ordering compares only
/// `version`.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum QuorumVerifier {
    Majority {
        voters: BTreeMap<ServerId, ()>,
        version: u64,
    },
    Hierarchical {
        groups: Vec<WeightedGroup>,
        /// weighted majority across groups: a reconfiguration threshold
        /// over the number of groups that must themselves be satisfied.
        group_threshold: u64,
        version: u64,
    },
}

impl QuorumVerifier {
    pub fn majority<I: IntoIterator<Item = ServerId>>(voters: I, version: u64) -> Self {
        QuorumVerifier::Majority {
            voters: voters.into_iter().map(|sid| (sid, ())).collect(),
            version,
        }
    }

    pub fn hierarchical(groups: Vec<WeightedGroup>, group_threshold: u64, version: u64) -> Self {
        QuorumVerifier::Hierarchical {
            groups,
            group_threshold,
            version,
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            QuorumVerifier::Majority { version, .. } => *version,
            QuorumVerifier::Hierarchical { version, .. } => *version,
        }
    }

    pub fn voters(&self) -> HashSet<ServerId> {
        match self {
            QuorumVerifier::Majority { voters, .. } => voters.keys().copied().collect(),
            QuorumVerifier::Hierarchical { groups, .. } => groups
                .iter()
                .flat_map(|g| g.members.keys().copied())
                .collect(),
        }
    }

    pub fn is_voter(&self, sid: ServerId) -> bool {
        match self {
            QuorumVerifier::Majority { voters, .. } => voters.contains_key(&sid),
            QuorumVerifier::Hierarchical { groups, .. } => {
                groups.iter().any(|g| g.members.contains_key(&sid))
            }
        }
    }

    /// Pure, side-effect free: does `acks` form a quorum under this
    /// configuration?
    pub fn contains_quorum(&self, acks: &HashSet<ServerId>) -> bool {
        match self {
            QuorumVerifier::Majority { voters, .. } => {
                let present = voters.keys().filter(|sid| acks.contains(sid)).count();
                present > voters.len() / 2
            }
            QuorumVerifier::Hierarchical {
                groups,
                group_threshold,
                ..
            } => {
                let satisfied_groups = groups.iter().filter(|g| g.satisfied_by(acks)).count();
                satisfied_groups as u64 >= *group_threshold
            }
        }
    }
}

impl PartialEq for QuorumVerifier {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                QuorumVerifier::Majority {
                    voters: a,
                    version: va,
                },
                QuorumVerifier::Majority {
                    voters: b,
                    version: vb,
                },
            ) => a == b && va == vb,
            (
                QuorumVerifier::Hierarchical {
                    groups: a,
                    group_threshold: ta,
                    version: va,
                },
                QuorumVerifier::Hierarchical {
                    groups: b,
                    group_threshold: tb,
                    version: vb,
                },
            ) => a == b && ta == tb && va == vb,
            _ => false,
        }
    }
}

impl Eq for QuorumVerifier {}

impl PartialOrd for QuorumVerifier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QuorumVerifier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.version().cmp(&other.version())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn set(ids: &[ServerId]) -> HashSet<ServerId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn majority_of_three_needs_two() {
        let v = QuorumVerifier::majority([1, 2, 3], 0);
        assert!(!v.contains_quorum(&set(&[1])));
        assert!(v.contains_quorum(&set(&[1, 2])));
        assert!(v.contains_quorum(&set(&[1, 2, 3])));
    }

    #[test]
    fn majority_of_two_needs_two() {
        // reconfig removing one voter: {1,2} needs both to ack.
        let v = QuorumVerifier::majority([1, 2], 1);
        assert!(!v.contains_quorum(&set(&[1])));
        assert!(v.contains_quorum(&set(&[1, 2])));
    }

    #[test]
    fn hierarchical_group_weighted_majority() {
        let mut members_a = BTreeMap::new();
        members_a.insert(1, 1);
        members_a.insert(2, 1);
        members_a.insert(3, 1);
        let group_a = WeightedGroup {
            members: members_a,
            threshold: 2,
        };
        let mut members_b = BTreeMap::new();
        members_b.insert(4, 1);
        members_b.insert(5, 1);
        let group_b = WeightedGroup {
            members: members_b,
            threshold: 1,
        };
        let v = QuorumVerifier::hierarchical(vec![group_a, group_b], 2, 0);
        assert!(!v.contains_quorum(&set(&[1, 2]))); // group a satisfied, b not -> only 1 group
        assert!(v.contains_quorum(&set(&[1, 2, 4])));
    }

    #[test]
    fn equality_is_by_configuration_not_version_alone() {
        let a = QuorumVerifier::majority([1, 2, 3], 5);
        let b = QuorumVerifier::majority([1, 2, 3], 5);
        let c = QuorumVerifier::majority([1, 2], 5);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn ordering_is_by_version() {
        let a = QuorumVerifier::majority([1, 2, 3], 1);
        let b = QuorumVerifier::majority([1, 2], 2);
        assert!(a < b);
    }
}
