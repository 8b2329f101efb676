//! Carrying certified state across a leader change.
//!
//! At the start of an epoch every oracle sends the new leader its highest
//! certificate together with a signed claim of that certificate's timestamp.
//! Once a byzantine quorum of claims is verified, the leader assembles an
//! [`EpochStartProof`]: the highest claim plus its certificate. Followers
//! check the proof and learn where the epoch resumes.

use crate::pool::{BoundedQuorumPool, PoolPutResult};
use attestor_types::signing::{commit_message, prepare_message};
use attestor_types::{
    AttributedOffchainSignature, AttributedSignedHighestCertifiedTimestamp,
    CertifiedPrepareOrCommit, ConfigDigest, CryptoError, Epoch, Hash, HighestCertifiedTimestamp,
    OffchainKeyPair, OracleId, SeqNr, SignedHighestCertifiedTimestamp, Topology,
};
use sbor::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Reasons a prepare or commit certificate is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CertificateError {
    #[error("outcome digest does not match the outcome bytes")]
    OutcomeDigestMismatch,

    #[error("only {got} distinct signers, need {need}")]
    InsufficientSigners { got: usize, need: usize },

    #[error("signer {0} appears more than once")]
    DuplicateSigner(OracleId),

    #[error("signer {0} is not in the oracle set")]
    UnknownSigner(OracleId),

    #[error("signature from {signer} is invalid: {source}")]
    InvalidSignature {
        signer: OracleId,
        #[source]
        source: CryptoError,
    },
}

/// Reasons an epoch start response or proof is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CarryOverError {
    #[error("local oracle does not lead epoch {0}")]
    NotLeader(Epoch),

    #[error("response not admitted to the pool: {0:?}")]
    NotAdmitted(PoolPutResult),

    #[error("claim from {signer} has an invalid signature: {source}")]
    InvalidClaimSignature {
        signer: OracleId,
        #[source]
        source: CryptoError,
    },

    #[error("claim from {0} is from an unknown oracle")]
    UnknownSigner(OracleId),

    #[error("claim from {0} appears more than once")]
    DuplicateSigner(OracleId),

    #[error("claimed timestamp {claimed:?} does not match certificate {certified:?}")]
    TimestampMismatch {
        claimed: HighestCertifiedTimestamp,
        certified: HighestCertifiedTimestamp,
    },

    #[error("certificate from epoch {certificate_epoch} is not older than epoch {epoch}")]
    CertificateNotOlder {
        certificate_epoch: Epoch,
        epoch: Epoch,
    },

    #[error("only {got} claims, need {need}")]
    InsufficientClaims { got: usize, need: usize },

    #[error("attached certificate {attached:?} is not the highest claim {highest:?}")]
    HighestMismatch {
        highest: HighestCertifiedTimestamp,
        attached: HighestCertifiedTimestamp,
    },

    #[error("invalid certificate: {0}")]
    InvalidCertificate(#[from] CertificateError),
}

/// Digest of an outcome, as signed in prepare and commit votes.
pub fn outcome_digest(outcome: &[u8]) -> Hash {
    Hash::from_bytes(outcome)
}

/// Check a prepare or commit certificate.
///
/// Requires a byzantine quorum of distinct known signers, each with a valid
/// signature over the prepare or commit digest. The genesis commit needs no
/// signatures.
pub fn verify_certified(
    certificate: &CertifiedPrepareOrCommit,
    topology: &dyn Topology,
    config_digest: &ConfigDigest,
) -> Result<(), CertificateError> {
    if *certificate == CertifiedPrepareOrCommit::genesis() {
        return Ok(());
    }

    let (digest, outcome, qc) = match certificate {
        CertifiedPrepareOrCommit::Prepare(p) => (
            prepare_message(config_digest, p.epoch, p.seq_nr, &p.outcome_digest),
            &p.outcome,
            &p.quorum_certificate,
        ),
        CertifiedPrepareOrCommit::Commit(c) => (
            commit_message(config_digest, c.epoch, c.seq_nr, &c.outcome_digest),
            &c.outcome,
            &c.quorum_certificate,
        ),
    };
    let claimed_digest = match certificate {
        CertifiedPrepareOrCommit::Prepare(p) => p.outcome_digest,
        CertifiedPrepareOrCommit::Commit(c) => c.outcome_digest,
    };
    if outcome_digest(outcome) != claimed_digest {
        return Err(CertificateError::OutcomeDigestMismatch);
    }

    verify_signatures(&qc.signatures, topology, digest.as_bytes())?;
    let need = topology.byzantine_quorum();
    if qc.len() < need {
        return Err(CertificateError::InsufficientSigners {
            got: qc.len(),
            need,
        });
    }
    Ok(())
}

fn verify_signatures(
    signatures: &[AttributedOffchainSignature],
    topology: &dyn Topology,
    message: &[u8],
) -> Result<(), CertificateError> {
    let mut seen = BTreeSet::new();
    for attributed in signatures {
        if !seen.insert(attributed.signer) {
            return Err(CertificateError::DuplicateSigner(attributed.signer));
        }
        let public_key = topology
            .offchain_public_key(attributed.signer)
            .ok_or(CertificateError::UnknownSigner(attributed.signer))?;
        public_key
            .verify(message, &attributed.signature)
            .map_err(|source| CertificateError::InvalidSignature {
                signer: attributed.signer,
                source,
            })?;
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// Epoch start response
// ═══════════════════════════════════════════════════════════════════════════

/// One oracle's answer to a new leader: its highest certificate and a signed
/// claim of that certificate's timestamp.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct EpochStartResponse {
    pub signed_highest_certified_timestamp: SignedHighestCertifiedTimestamp,
    pub highest_certified: CertifiedPrepareOrCommit,
}

impl EpochStartResponse {
    pub fn new(
        config_digest: &ConfigDigest,
        new_epoch: Epoch,
        highest_certified: CertifiedPrepareOrCommit,
        keys: &OffchainKeyPair,
    ) -> Self {
        Self {
            signed_highest_certified_timestamp: SignedHighestCertifiedTimestamp::sign(
                config_digest,
                new_epoch,
                highest_certified.timestamp(),
                keys,
            ),
            highest_certified,
        }
    }

    /// Check the claim signature, that the claim matches the attached
    /// certificate, and the certificate itself.
    pub fn verify(
        &self,
        sender: OracleId,
        new_epoch: Epoch,
        topology: &dyn Topology,
        config_digest: &ConfigDigest,
    ) -> Result<(), CarryOverError> {
        let public_key = topology
            .offchain_public_key(sender)
            .ok_or(CarryOverError::UnknownSigner(sender))?;
        self.signed_highest_certified_timestamp
            .verify(config_digest, new_epoch, &public_key)
            .map_err(|source| CarryOverError::InvalidClaimSignature {
                signer: sender,
                source,
            })?;

        let claimed = self.signed_highest_certified_timestamp.timestamp;
        let certified = self.highest_certified.timestamp();
        if claimed != certified {
            return Err(CarryOverError::TimestampMismatch { claimed, certified });
        }
        check_older(&self.highest_certified, new_epoch)?;
        verify_certified(&self.highest_certified, topology, config_digest)?;
        Ok(())
    }
}

fn check_older(certificate: &CertifiedPrepareOrCommit, epoch: Epoch) -> Result<(), CarryOverError> {
    if certificate.epoch() >= epoch {
        return Err(CarryOverError::CertificateNotOlder {
            certificate_epoch: certificate.epoch(),
            epoch,
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// Proof
// ═══════════════════════════════════════════════════════════════════════════

/// What a new epoch does with the carried state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CarryOverDecision {
    /// The highest certificate is a commit: continue after it.
    ResumeAfter(SeqNr),
    /// The highest certificate is a prepare: propose its outcome again.
    Repropose { seq_nr: SeqNr, outcome: Vec<u8> },
}

/// The new leader's evidence of where its epoch resumes.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct EpochStartProof {
    pub epoch: Epoch,
    pub highest_certified: CertifiedPrepareOrCommit,
    pub highest_certified_proof: Vec<AttributedSignedHighestCertifiedTimestamp>,
}

impl EpochStartProof {
    /// Verify the proof and decide how the epoch resumes.
    ///
    /// The claims must come from a byzantine quorum of distinct oracles, and
    /// the attached certificate must be valid and match the highest claim.
    pub fn verify(
        &self,
        topology: &dyn Topology,
        config_digest: &ConfigDigest,
    ) -> Result<CarryOverDecision, CarryOverError> {
        let mut seen = BTreeSet::new();
        for claim in &self.highest_certified_proof {
            if !seen.insert(claim.signer) {
                return Err(CarryOverError::DuplicateSigner(claim.signer));
            }
            let public_key = topology
                .offchain_public_key(claim.signer)
                .ok_or(CarryOverError::UnknownSigner(claim.signer))?;
            claim
                .signed
                .verify(config_digest, self.epoch, &public_key)
                .map_err(|source| CarryOverError::InvalidClaimSignature {
                    signer: claim.signer,
                    source,
                })?;
        }
        let need = topology.byzantine_quorum();
        if seen.len() < need {
            return Err(CarryOverError::InsufficientClaims {
                got: seen.len(),
                need,
            });
        }

        let highest = self
            .highest_certified_proof
            .iter()
            .map(|claim| claim.signed.timestamp)
            .max()
            .unwrap_or(HighestCertifiedTimestamp::GENESIS);
        let attached = self.highest_certified.timestamp();
        if attached != highest {
            return Err(CarryOverError::HighestMismatch { highest, attached });
        }
        check_older(&self.highest_certified, self.epoch)?;
        verify_certified(&self.highest_certified, topology, config_digest)?;

        Ok(match &self.highest_certified {
            CertifiedPrepareOrCommit::Commit(c) => CarryOverDecision::ResumeAfter(c.seq_nr),
            CertifiedPrepareOrCommit::Prepare(p) => CarryOverDecision::Repropose {
                seq_nr: p.seq_nr,
                outcome: p.outcome.clone(),
            },
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Collector
// ═══════════════════════════════════════════════════════════════════════════

/// Gathers epoch start responses at the leader, across the epochs it leads.
///
/// Responses are pooled by epoch with a per-sender budget, each is verified
/// once, and a proof is produced as soon as a byzantine quorum of verified
/// responses exists for an epoch. That epoch is then closed.
pub struct EpochStartCollector {
    topology: Arc<dyn Topology>,
    config_digest: ConfigDigest,
    pool: BoundedQuorumPool<Epoch, EpochStartResponse>,
    /// Responses checked so far.
    verifications: u64,
}

impl std::fmt::Debug for EpochStartCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpochStartCollector")
            .field("oracle", &self.topology.local_oracle_id())
            .field("completed", &self.pool.completed_watermark())
            .finish()
    }
}

impl EpochStartCollector {
    pub fn new(
        topology: Arc<dyn Topology>,
        config_digest: ConfigDigest,
        max_items_per_sender: usize,
    ) -> Self {
        Self {
            topology,
            config_digest,
            pool: BoundedQuorumPool::new(max_items_per_sender),
            verifications: 0,
        }
    }

    /// Number of responses whose signatures and certificate were checked.
    pub fn verifications(&self) -> u64 {
        self.verifications
    }

    /// Admit `response` from `sender` for `epoch`.
    ///
    /// Returns the proof once this response completes a verified quorum.
    pub fn add(
        &mut self,
        sender: OracleId,
        epoch: Epoch,
        response: EpochStartResponse,
    ) -> Result<Option<EpochStartProof>, CarryOverError> {
        if !self.topology.is_leader(epoch) {
            return Err(CarryOverError::NotLeader(epoch));
        }
        match self.pool.put(epoch, sender, response) {
            PoolPutResult::Ok => {}
            rejected => return Err(CarryOverError::NotAdmitted(rejected)),
        }

        // Only admitted responses are verified, each exactly once.
        let Some(entry) = self.pool.entries(epoch).and_then(|by_sender| by_sender.get(&sender))
        else {
            return Ok(None);
        };
        let verification =
            entry
                .item
                .verify(sender, epoch, self.topology.as_ref(), &self.config_digest);
        self.verifications += 1;
        self.pool.store_verified(epoch, sender, verification.is_ok());
        if let Err(e) = verification {
            warn!(epoch = epoch.0, sender = sender.0, error = %e, "Invalid epoch start response");
            return Err(e);
        }

        Ok(self.try_build_proof(epoch))
    }

    fn try_build_proof(&mut self, epoch: Epoch) -> Option<EpochStartProof> {
        let entries = self.pool.entries(epoch)?;
        let verified: Vec<_> = entries
            .iter()
            .filter(|(_, entry)| entry.verified == Some(true))
            .collect();
        let need = self.topology.byzantine_quorum();
        if verified.len() < need {
            debug!(epoch = epoch.0, verified = verified.len(), need, "Waiting for epoch start responses");
            return None;
        }

        let (_, highest) = verified.iter().max_by(|(a_sender, a), (b_sender, b)| {
            a.item
                .highest_certified
                .timestamp()
                .cmp(&b.item.highest_certified.timestamp())
                // Prefer the lowest oracle among equal claims.
                .then(b_sender.cmp(a_sender))
        })?;
        let proof = EpochStartProof {
            epoch,
            highest_certified: highest.item.highest_certified.clone(),
            highest_certified_proof: verified
                .iter()
                .map(|(signer, entry)| AttributedSignedHighestCertifiedTimestamp {
                    signed: entry.item.signed_highest_certified_timestamp.clone(),
                    signer: **signer,
                })
                .collect(),
        };

        info!(
            epoch = epoch.0,
            seq_nr = proof.highest_certified.seq_nr().0,
            claims = proof.highest_certified_proof.len(),
            "Epoch start proof assembled"
        );
        self.pool.reap_completed(epoch);
        Some(proof)
    }
}
