//! Certified state carried across epochs by the PBFT-style variant.

use crate::signing::highest_certified_message;
use crate::{
    ConfigDigest, CryptoError, Epoch, Hash, OffchainKeyPair, OffchainPublicKey, OffchainSignature,
    OracleId, SeqNr,
};
use sbor::prelude::*;
use std::cmp::Ordering;

/// The highest sequence number an oracle has certified, and whether that
/// certification was a commit (`true`) or only a prepare (`false`).
///
/// Ordered by `(seq_nr, committed_else_prepared)`: at equal sequence numbers a
/// commit outranks a prepare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BasicSbor)]
pub struct HighestCertifiedTimestamp {
    pub seq_nr: SeqNr,
    pub committed_else_prepared: bool,
}

impl HighestCertifiedTimestamp {
    pub const GENESIS: Self = Self {
        seq_nr: SeqNr::GENESIS,
        committed_else_prepared: true,
    };
}

impl PartialOrd for HighestCertifiedTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HighestCertifiedTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.seq_nr, self.committed_else_prepared).cmp(&(other.seq_nr, other.committed_else_prepared))
    }
}

/// An offchain signature attributed to its signer.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct AttributedOffchainSignature {
    pub signer: OracleId,
    pub signature: OffchainSignature,
}

/// A set of attributed signatures over the same payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, BasicSbor)]
pub struct QuorumCertificate {
    pub signatures: Vec<AttributedOffchainSignature>,
}

impl QuorumCertificate {
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

/// An outcome that a quorum prepared in `epoch` at `seq_nr`.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct CertifiedPrepare {
    pub epoch: Epoch,
    pub seq_nr: SeqNr,
    pub outcome_digest: Hash,
    pub outcome: Vec<u8>,
    pub quorum_certificate: QuorumCertificate,
}

/// An outcome that a quorum committed in `epoch` at `seq_nr`.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct CertifiedCommit {
    pub epoch: Epoch,
    pub seq_nr: SeqNr,
    pub outcome_digest: Hash,
    pub outcome: Vec<u8>,
    pub quorum_certificate: QuorumCertificate,
}

/// Either certified form; what an oracle reports as its highest certified
/// state when a new epoch starts.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub enum CertifiedPrepareOrCommit {
    Prepare(CertifiedPrepare),
    Commit(CertifiedCommit),
}

impl CertifiedPrepareOrCommit {
    /// The commit every oracle starts from. Needs no signatures.
    pub fn genesis() -> Self {
        CertifiedPrepareOrCommit::Commit(CertifiedCommit {
            epoch: Epoch(0),
            seq_nr: SeqNr::GENESIS,
            outcome_digest: Hash::from_bytes(&[]),
            outcome: Vec::new(),
            quorum_certificate: QuorumCertificate::default(),
        })
    }

    pub fn is_genesis(&self) -> bool {
        matches!(self, CertifiedPrepareOrCommit::Commit(c) if c.seq_nr == SeqNr::GENESIS)
    }

    pub fn epoch(&self) -> Epoch {
        match self {
            CertifiedPrepareOrCommit::Prepare(p) => p.epoch,
            CertifiedPrepareOrCommit::Commit(c) => c.epoch,
        }
    }

    pub fn seq_nr(&self) -> SeqNr {
        match self {
            CertifiedPrepareOrCommit::Prepare(p) => p.seq_nr,
            CertifiedPrepareOrCommit::Commit(c) => c.seq_nr,
        }
    }

    pub fn outcome(&self) -> &[u8] {
        match self {
            CertifiedPrepareOrCommit::Prepare(p) => &p.outcome,
            CertifiedPrepareOrCommit::Commit(c) => &c.outcome,
        }
    }

    pub fn timestamp(&self) -> HighestCertifiedTimestamp {
        HighestCertifiedTimestamp {
            seq_nr: self.seq_nr(),
            committed_else_prepared: matches!(self, CertifiedPrepareOrCommit::Commit(_)),
        }
    }
}

/// A highest certified timestamp signed for a specific new epoch.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct SignedHighestCertifiedTimestamp {
    pub timestamp: HighestCertifiedTimestamp,
    pub signature: OffchainSignature,
}

impl SignedHighestCertifiedTimestamp {
    pub fn sign(
        config_digest: &ConfigDigest,
        new_epoch: Epoch,
        timestamp: HighestCertifiedTimestamp,
        keys: &OffchainKeyPair,
    ) -> Self {
        let message = highest_certified_message(
            config_digest,
            new_epoch,
            timestamp.seq_nr,
            timestamp.committed_else_prepared,
        );
        Self {
            timestamp,
            signature: keys.sign(message.as_bytes()),
        }
    }

    pub fn verify(
        &self,
        config_digest: &ConfigDigest,
        new_epoch: Epoch,
        public_key: &OffchainPublicKey,
    ) -> Result<(), CryptoError> {
        let message = highest_certified_message(
            config_digest,
            new_epoch,
            self.timestamp.seq_nr,
            self.timestamp.committed_else_prepared,
        );
        public_key.verify(message.as_bytes(), &self.signature)
    }
}

/// A signed highest certified timestamp tagged with its signer.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct AttributedSignedHighestCertifiedTimestamp {
    pub signed: SignedHighestCertifiedTimestamp,
    pub signer: OracleId,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(seq: u64, committed: bool) -> HighestCertifiedTimestamp {
        HighestCertifiedTimestamp {
            seq_nr: SeqNr(seq),
            committed_else_prepared: committed,
        }
    }

    #[test]
    fn test_commit_outranks_prepare_at_same_seq() {
        assert!(ts(5, true) > ts(5, false));
        assert!(ts(6, false) > ts(5, true));
        assert_eq!(ts(3, true).max(ts(3, false)), ts(3, true));
    }

    #[test]
    fn test_genesis_is_commit_at_zero() {
        let genesis = CertifiedPrepareOrCommit::genesis();
        assert!(genesis.is_genesis());
        assert_eq!(genesis.timestamp(), HighestCertifiedTimestamp::GENESIS);
    }

    #[test]
    fn test_signed_timestamp_bound_to_epoch() {
        let keys = OffchainKeyPair::from_seed([5u8; 32]);
        let cd = ConfigDigest([1u8; 32]);
        let signed = SignedHighestCertifiedTimestamp::sign(&cd, Epoch(4), ts(9, false), &keys);
        assert_eq!(signed.verify(&cd, Epoch(4), &keys.public_key()), Ok(()));
        assert!(signed.verify(&cd, Epoch(5), &keys.public_key()).is_err());
    }
}
