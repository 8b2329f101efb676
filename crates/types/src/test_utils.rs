//! Deterministic oracle sets for tests.

use crate::{
    OffchainKeyPair, OnchainKeyPair, OracleId, OracleIdentity, StaticTopology,
};

/// Key material for a whole oracle set, index-aligned with `OracleId`.
pub struct TestOracleSet {
    pub f: usize,
    pub offchain: Vec<OffchainKeyPair>,
    pub onchain: Vec<OnchainKeyPair>,
}

impl TestOracleSet {
    /// Public identities of every oracle.
    pub fn identities(&self) -> Vec<OracleIdentity> {
        self.offchain
            .iter()
            .zip(&self.onchain)
            .map(|(off, on)| OracleIdentity {
                offchain_public_key: off.public_key(),
                onchain_public_key: on.public_key(),
            })
            .collect()
    }

    /// The set as seen from `local`.
    ///
    /// # Panics
    ///
    /// Panics if `local` is outside the set.
    pub fn topology(&self, local: OracleId) -> StaticTopology {
        StaticTopology::new(local, self.f, self.identities())
            .expect("test oracle set is well formed")
    }
}

/// Build `n` oracles with seed-derived keys and `f = (n - 1) / 3`.
pub fn test_oracle_set(n: usize) -> TestOracleSet {
    let offchain = (0..n)
        .map(|i| OffchainKeyPair::from_seed([i as u8 + 1; 32]))
        .collect();
    let onchain = (0..n)
        .map(|i| {
            OnchainKeyPair::from_secret([i as u8 + 1; 32]).expect("small scalars are valid keys")
        })
        .collect();
    TestOracleSet {
        f: n.saturating_sub(1) / 3,
        offchain,
        onchain,
    }
}
