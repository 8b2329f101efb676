//! Attested reports: single follower attestations and quorum-certified reports.

use crate::signing::{report_message, skip_message};
use crate::{
    CryptoError, Hash, OnchainKeyPair, OnchainPublicKey, OnchainSignature, OracleId, ReportContext,
    Topology,
};
use sbor::prelude::*;
use std::collections::BTreeSet;
use thiserror::Error;

/// One follower's response to a `ReportReq`.
///
/// A skip vote carries an empty report and a signature bound to the round's
/// commitment hash. A real attestation signs the report bytes and context.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct AttestedReportOne {
    pub skip: bool,
    pub report: Vec<u8>,
    pub signature: OnchainSignature,
}

impl AttestedReportOne {
    /// Attest to `report` in `ctx`.
    pub fn attest(ctx: &ReportContext, report: Vec<u8>, keys: &OnchainKeyPair) -> Self {
        let signature = keys.sign(&report_message(ctx, &report));
        Self {
            skip: false,
            report,
            signature,
        }
    }

    /// Vote to skip the round identified by `ctx` and `commitment`.
    pub fn skip(ctx: &ReportContext, commitment: &Hash, keys: &OnchainKeyPair) -> Self {
        let signature = keys.sign(&skip_message(ctx, commitment));
        Self {
            skip: true,
            report: Vec::new(),
            signature,
        }
    }

    /// Verify the attestation against the signer's on-chain key.
    pub fn verify(
        &self,
        ctx: &ReportContext,
        commitment: &Hash,
        public_key: &OnchainPublicKey,
    ) -> Result<(), CryptoError> {
        if self.skip {
            public_key.verify(&skip_message(ctx, commitment), &self.signature)
        } else {
            public_key.verify(&report_message(ctx, &self.report), &self.signature)
        }
    }
}

/// An on-chain style signature attributed to its signer.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct AttributedOnchainSignature {
    pub signer: OracleId,
    pub signature: OnchainSignature,
}

/// Reasons a quorum certificate over a report can be invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportCertificateError {
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

/// The quorum-certified artifact handed to transmission.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct AttestedReportMany {
    pub report: Vec<u8>,
    pub attributed_signatures: Vec<AttributedOnchainSignature>,
}

impl AttestedReportMany {
    /// Check that at least `quorum` distinct known oracles signed `report` in
    /// `ctx`, each signature independently valid.
    pub fn verify(
        &self,
        ctx: &ReportContext,
        topology: &dyn Topology,
        quorum: usize,
    ) -> Result<(), ReportCertificateError> {
        let message = report_message(ctx, &self.report);
        let mut seen = BTreeSet::new();
        for attributed in &self.attributed_signatures {
            if !seen.insert(attributed.signer) {
                return Err(ReportCertificateError::DuplicateSigner(attributed.signer));
            }
            let public_key = topology
                .onchain_public_key(attributed.signer)
                .ok_or(ReportCertificateError::UnknownSigner(attributed.signer))?;
            public_key
                .verify(&message, &attributed.signature)
                .map_err(|source| ReportCertificateError::InvalidSignature {
                    signer: attributed.signer,
                    source,
                })?;
        }
        if seen.len() < quorum {
            return Err(ReportCertificateError::InsufficientSigners {
                got: seen.len(),
                need: quorum,
            });
        }
        Ok(())
    }

    /// Signers in ascending order.
    pub fn signers(&self) -> Vec<OracleId> {
        let mut signers: Vec<_> = self.attributed_signatures.iter().map(|s| s.signer).collect();
        signers.sort();
        signers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_oracle_set;
    use crate::{ConfigDigest, Epoch, Round};

    fn ctx() -> ReportContext {
        ReportContext::new(ConfigDigest([4u8; 32]), Epoch(1), Round(1))
    }

    fn certify(signers: &[u8], report: &[u8]) -> AttestedReportMany {
        let set = test_oracle_set(4);
        AttestedReportMany {
            report: report.to_vec(),
            attributed_signatures: signers
                .iter()
                .map(|&i| AttributedOnchainSignature {
                    signer: OracleId(i),
                    signature: AttestedReportOne::attest(&ctx(), report.to_vec(), &set.onchain[i as usize])
                        .signature,
                })
                .collect(),
        }
    }

    #[test]
    fn test_quorum_certificate_verifies() {
        let topology = test_oracle_set(4).topology(OracleId(0));
        assert_eq!(certify(&[0, 1, 2], b"price=42").verify(&ctx(), &topology, 2), Ok(()));
    }

    #[test]
    fn test_rejects_short_or_duplicate_certificates() {
        let topology = test_oracle_set(4).topology(OracleId(0));
        assert_eq!(
            certify(&[1], b"r").verify(&ctx(), &topology, 2),
            Err(ReportCertificateError::InsufficientSigners { got: 1, need: 2 })
        );
        assert_eq!(
            certify(&[1, 1], b"r").verify(&ctx(), &topology, 2),
            Err(ReportCertificateError::DuplicateSigner(OracleId(1)))
        );
    }

    #[test]
    fn test_rejects_signature_over_other_report() {
        let topology = test_oracle_set(4).topology(OracleId(0));
        let mut cert = certify(&[0, 1], b"a");
        cert.report = b"b".to_vec();
        assert!(matches!(
            cert.verify(&ctx(), &topology, 2),
            Err(ReportCertificateError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn test_skip_vote_bound_to_commitment() {
        let set = test_oracle_set(4);
        let commitment = Hash::from_bytes(b"c1");
        let vote = AttestedReportOne::skip(&ctx(), &commitment, &set.onchain[2]);
        let pk = set.onchain[2].public_key();
        assert_eq!(vote.verify(&ctx(), &commitment, &pk), Ok(()));
        assert!(vote.verify(&ctx(), &Hash::from_bytes(b"c2"), &pk).is_err());
    }
}
