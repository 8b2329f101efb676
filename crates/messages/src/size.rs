//! Size bounds checked before any other processing.

use crate::message::{FinalMessage, ProtocolMessage};
use attestor_types::{
    AttributedSignedObservation, CertifiedPrepareOrCommit, MessageLimits, SignedObservation,
    OFFCHAIN_SIGNATURE_LENGTH, ONCHAIN_SIGNATURE_LENGTH,
};

fn observation_fits(so: &SignedObservation, limits: &MessageLimits) -> bool {
    so.observation.len() <= limits.max_observation_length
        && so.signature.0.len() <= OFFCHAIN_SIGNATURE_LENGTH
}

fn final_fits(msg: &FinalMessage, limits: &MessageLimits) -> bool {
    msg.report.report.len() <= limits.max_report_length
        && msg.report.attributed_signatures.len() <= limits.n
        && msg
            .report
            .attributed_signatures
            .iter()
            .all(|s| s.signature.0.len() <= ONCHAIN_SIGNATURE_LENGTH)
}

fn certificate_fits(cert: &CertifiedPrepareOrCommit, limits: &MessageLimits) -> bool {
    let qc = match cert {
        CertifiedPrepareOrCommit::Prepare(p) => &p.quorum_certificate,
        CertifiedPrepareOrCommit::Commit(c) => &c.quorum_certificate,
    };
    cert.outcome().len() <= limits.max_report_length
        && qc.len() <= limits.n
        && qc
            .signatures
            .iter()
            .all(|s| s.signature.0.len() <= OFFCHAIN_SIGNATURE_LENGTH)
}

impl ProtocolMessage {
    /// Whether every variable-length field is within `limits`.
    ///
    /// Lists of attributed observations or signatures may hold at most one
    /// entry per oracle.
    pub fn check_size(&self, limits: &MessageLimits) -> bool {
        match self {
            ProtocolMessage::NewEpoch(_) => true,
            ProtocolMessage::ObserveReq(m) => m.query.len() <= limits.max_query_length,
            ProtocolMessage::Observe(m) => observation_fits(&m.signed_observation, limits),
            ProtocolMessage::ReportReq(m) => {
                m.query.len() <= limits.max_query_length
                    && m.attributed_signed_observations.len() <= limits.n
                    && m.attributed_signed_observations
                        .iter()
                        .all(|AttributedSignedObservation { signed_observation, .. }| {
                            observation_fits(signed_observation, limits)
                        })
            }
            ProtocolMessage::Report(m) => {
                m.report.report.len() <= limits.max_report_length
                    && m.report.signature.0.len() <= ONCHAIN_SIGNATURE_LENGTH
            }
            ProtocolMessage::Final(m) => final_fits(m, limits),
            ProtocolMessage::FinalEcho(m) => final_fits(&m.final_message, limits),
            ProtocolMessage::CommitVote(m) => m.signature.0.len() <= OFFCHAIN_SIGNATURE_LENGTH,
            ProtocolMessage::EpochStart(m) => {
                m.response.signed_highest_certified_timestamp.signature.0.len()
                    <= OFFCHAIN_SIGNATURE_LENGTH
                    && certificate_fits(&m.response.highest_certified, limits)
            }
            ProtocolMessage::EpochStartProof(m) => {
                m.proof.highest_certified_proof.len() <= limits.n
                    && m.proof
                        .highest_certified_proof
                        .iter()
                        .all(|claim| claim.signed.signature.0.len() <= OFFCHAIN_SIGNATURE_LENGTH)
                    && certificate_fits(&m.proof.highest_certified, limits)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ObserveMessage, ObserveReqMessage, ReportReqMessage};
    use attestor_types::{Epoch, OffchainSignature, OracleId, Round};

    fn limits() -> MessageLimits {
        MessageLimits {
            n: 4,
            max_query_length: 8,
            max_observation_length: 8,
            max_report_length: 8,
        }
    }

    fn observation(len: usize) -> SignedObservation {
        SignedObservation {
            observation: vec![0; len],
            signature: OffchainSignature(vec![0; OFFCHAIN_SIGNATURE_LENGTH]),
        }
    }

    #[test]
    fn test_oversize_query_rejected() {
        let msg = |len| {
            ProtocolMessage::ObserveReq(ObserveReqMessage {
                epoch: Epoch(1),
                round: Round(1),
                query: vec![0; len],
            })
        };
        assert!(msg(8).check_size(&limits()));
        assert!(!msg(9).check_size(&limits()));
    }

    #[test]
    fn test_oversize_observation_and_signature_rejected() {
        let observe = |so| {
            ProtocolMessage::Observe(ObserveMessage {
                epoch: Epoch(1),
                round: Round(1),
                signed_observation: so,
            })
        };
        assert!(observe(observation(8)).check_size(&limits()));
        assert!(!observe(observation(9)).check_size(&limits()));

        let mut long_sig = observation(1);
        long_sig.signature.0.push(0);
        assert!(!observe(long_sig).check_size(&limits()));
    }

    #[test]
    fn test_more_observations_than_oracles_rejected() {
        let req = |count: usize| {
            ProtocolMessage::ReportReq(ReportReqMessage {
                epoch: Epoch(1),
                round: Round(1),
                query: vec![],
                attributed_signed_observations: (0..count)
                    .map(|i| AttributedSignedObservation {
                        signed_observation: observation(1),
                        observer: OracleId(i as u8),
                    })
                    .collect(),
            })
        };
        assert!(req(4).check_size(&limits()));
        assert!(!req(5).check_size(&limits()));
    }

    #[test]
    fn test_oversize_carried_certificate_rejected() {
        use crate::message::EpochStartProofMessage;
        use attestor_certified::EpochStartProof;
        use attestor_types::{
            AttributedOffchainSignature, CertifiedCommit, Hash, QuorumCertificate, SeqNr,
        };

        let proof = |outcome_len: usize, signers: usize| {
            ProtocolMessage::EpochStartProof(EpochStartProofMessage {
                proof: EpochStartProof {
                    epoch: Epoch(2),
                    highest_certified: CertifiedPrepareOrCommit::Commit(CertifiedCommit {
                        epoch: Epoch(1),
                        seq_nr: SeqNr(0x101),
                        outcome_digest: Hash::ZERO,
                        outcome: vec![0; outcome_len],
                        quorum_certificate: QuorumCertificate {
                            signatures: (0..signers)
                                .map(|i| AttributedOffchainSignature {
                                    signer: OracleId(i as u8),
                                    signature: OffchainSignature(vec![0; OFFCHAIN_SIGNATURE_LENGTH]),
                                })
                                .collect(),
                        },
                    }),
                    highest_certified_proof: vec![],
                },
            })
        };
        assert!(proof(8, 4).check_size(&limits()));
        assert!(!proof(9, 4).check_size(&limits()));
        assert!(!proof(8, 5).check_size(&limits()));
    }
}
