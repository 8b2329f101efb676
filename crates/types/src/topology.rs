//! Topology trait and static implementation.

use crate::{Epoch, OffchainPublicKey, OnchainPublicKey, OracleId};
use std::sync::Arc;

/// Public identity of one oracle in the configured set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleIdentity {
    pub offchain_public_key: OffchainPublicKey,
    pub onchain_public_key: OnchainPublicKey,
}

/// The oracle set as seen by one oracle.
///
/// Every method is a pure function of the configured set, so all correct
/// oracles derive the same leader and the same quorum sizes.
pub trait Topology: Send + Sync {
    /// Get the local oracle's ID.
    fn local_oracle_id(&self) -> OracleId;

    /// Total number of oracles.
    fn n(&self) -> usize;

    /// Maximum number of faulty oracles tolerated.
    fn f(&self) -> usize;

    /// Offchain (Ed25519) public key of an oracle.
    fn offchain_public_key(&self, oracle: OracleId) -> Option<OffchainPublicKey>;

    /// On-chain style (secp256k1) public key of an oracle.
    fn onchain_public_key(&self, oracle: OracleId) -> Option<OnchainPublicKey>;

    // Derived methods

    /// Whether `oracle` is a member of the set.
    fn contains(&self, oracle: OracleId) -> bool {
        oracle.index() < self.n()
    }

    /// All oracle IDs in index order.
    fn oracles(&self) -> Vec<OracleId> {
        (0..self.n()).map(|i| OracleId(i as u8)).collect()
    }

    /// Get the leader for an epoch: `epoch mod n`.
    fn leader_for(&self, epoch: Epoch) -> OracleId {
        OracleId((epoch.0 as usize % self.n()) as u8)
    }

    /// Check if the local oracle leads this epoch.
    fn is_leader(&self, epoch: Epoch) -> bool {
        self.leader_for(epoch) == self.local_oracle_id()
    }

    /// Quorum size for the certified variant: `(n + f) / 2 + 1`.
    ///
    /// Any two such quorums intersect in at least one correct oracle.
    fn byzantine_quorum(&self) -> usize {
        (self.n() + self.f()) / 2 + 1
    }
}

/// Errors that can occur when building a topology.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    #[error("oracle set is empty")]
    Empty,

    #[error("oracle set has {0} members, at most 255 are supported")]
    TooLarge(usize),

    #[error("local oracle {0} is not in the oracle set")]
    LocalNotInSet(OracleId),

    #[error("{n} oracles cannot tolerate f = {f} faults (need n > 3f)")]
    TooManyFaults { n: usize, f: usize },
}

/// A static topology implementation.
#[derive(Debug, Clone)]
pub struct StaticTopology {
    local_oracle_id: OracleId,
    f: usize,
    oracles: Vec<OracleIdentity>,
}

impl StaticTopology {
    /// Create a new static topology. Oracle `i` is `oracles[i]`.
    pub fn new(
        local_oracle_id: OracleId,
        f: usize,
        oracles: Vec<OracleIdentity>,
    ) -> Result<Self, TopologyError> {
        if oracles.is_empty() {
            return Err(TopologyError::Empty);
        }
        if oracles.len() > u8::MAX as usize {
            return Err(TopologyError::TooLarge(oracles.len()));
        }
        if local_oracle_id.index() >= oracles.len() {
            return Err(TopologyError::LocalNotInSet(local_oracle_id));
        }
        if oracles.len() <= 3 * f {
            return Err(TopologyError::TooManyFaults {
                n: oracles.len(),
                f,
            });
        }
        Ok(Self {
            local_oracle_id,
            f,
            oracles,
        })
    }

    /// Create a topology as an Arc.
    pub fn into_arc(self) -> Arc<dyn Topology> {
        Arc::new(self)
    }

    /// The same oracle set seen from another oracle.
    pub fn for_oracle(&self, local_oracle_id: OracleId) -> Result<Self, TopologyError> {
        Self::new(local_oracle_id, self.f, self.oracles.clone())
    }
}

impl Topology for StaticTopology {
    fn local_oracle_id(&self) -> OracleId {
        self.local_oracle_id
    }

    fn n(&self) -> usize {
        self.oracles.len()
    }

    fn f(&self) -> usize {
        self.f
    }

    fn offchain_public_key(&self, oracle: OracleId) -> Option<OffchainPublicKey> {
        self.oracles
            .get(oracle.index())
            .map(|o| o.offchain_public_key)
    }

    fn onchain_public_key(&self, oracle: OracleId) -> Option<OnchainPublicKey> {
        self.oracles
            .get(oracle.index())
            .map(|o| o.onchain_public_key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_oracle_set;

    #[test]
    fn test_set_basics() {
        let topology = test_oracle_set(4).topology(OracleId(2));

        assert_eq!(topology.n(), 4);
        assert_eq!(topology.f(), 1);
        assert_eq!(topology.local_oracle_id(), OracleId(2));
        assert!(topology.contains(OracleId(3)));
        assert!(!topology.contains(OracleId(4)));
        assert!(topology.onchain_public_key(OracleId(4)).is_none());
    }

    #[test]
    fn test_leader_rotation() {
        let topology = test_oracle_set(4).topology(OracleId(0));

        assert_eq!(topology.leader_for(Epoch(0)), OracleId(0));
        assert_eq!(topology.leader_for(Epoch(1)), OracleId(1));
        assert_eq!(topology.leader_for(Epoch(4)), OracleId(0));
        assert_eq!(topology.leader_for(Epoch(u32::MAX)), OracleId(3));
        assert!(topology.is_leader(Epoch(8)));
    }

    #[test]
    fn test_byzantine_quorum() {
        let topology = test_oracle_set(4).topology(OracleId(0));
        assert_eq!(topology.byzantine_quorum(), 3);

        let topology = test_oracle_set(7).topology(OracleId(0));
        assert_eq!(topology.byzantine_quorum(), 5);
    }

    #[test]
    fn test_rejects_bad_sets() {
        assert_eq!(
            StaticTopology::new(OracleId(0), 0, vec![]).unwrap_err(),
            TopologyError::Empty
        );
        let set = test_oracle_set(4).topology(OracleId(0));
        assert_eq!(
            set.for_oracle(OracleId(9)).unwrap_err(),
            TopologyError::LocalNotInSet(OracleId(9))
        );
        assert_eq!(
            StaticTopology::new(OracleId(0), 1, test_oracle_set(3).identities()).unwrap_err(),
            TopologyError::TooManyFaults { n: 3, f: 1 }
        );
        assert!(StaticTopology::new(OracleId(0), 1, test_oracle_set(4).identities()).is_ok());
    }
}
