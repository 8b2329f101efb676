//! Per-round tally of follower attestations at the leader.

use attestor_types::{
    AttestedReportMany, AttestedReportOne, AttributedOnchainSignature, OnchainSignature, OracleId,
};
use std::collections::{BTreeMap, BTreeSet};

/// Collects `Report` attestations for one round and detects quorum.
///
/// Attestations are grouped by report bytes; only identical non-skip reports
/// add up. Skip votes are recorded so the sender cannot vote twice, but never
/// count toward a certificate.
#[derive(Debug)]
pub(crate) struct ReportTally {
    /// Every oracle that has contributed (attestation or skip).
    senders: BTreeSet<OracleId>,
    /// Signatures grouped by report bytes.
    by_report: BTreeMap<Vec<u8>, BTreeMap<OracleId, OnchainSignature>>,
    /// Oracles that voted to skip.
    skips: BTreeSet<OracleId>,
    /// Distinct attestations required for a certificate.
    quorum: usize,
}

impl ReportTally {
    pub fn new(quorum: usize) -> Self {
        Self {
            senders: BTreeSet::new(),
            by_report: BTreeMap::new(),
            skips: BTreeSet::new(),
            quorum,
        }
    }

    /// Check if `sender` has already contributed this round.
    pub fn contains(&self, sender: OracleId) -> bool {
        self.senders.contains(&sender)
    }

    /// Record an already verified attestation.
    ///
    /// Returns the certified report once this attestation completes a quorum.
    /// The certificate lists signers in ascending order.
    pub fn add(
        &mut self,
        sender: OracleId,
        attestation: AttestedReportOne,
    ) -> Option<AttestedReportMany> {
        if !self.senders.insert(sender) {
            return None;
        }
        if attestation.skip {
            self.skips.insert(sender);
            return None;
        }

        let signatures = self.by_report.entry(attestation.report.clone()).or_default();
        signatures.insert(sender, attestation.signature);
        if signatures.len() < self.quorum {
            return None;
        }

        Some(AttestedReportMany {
            report: attestation.report,
            attributed_signatures: signatures
                .iter()
                .map(|(signer, signature)| AttributedOnchainSignature {
                    signer: *signer,
                    signature: signature.clone(),
                })
                .collect(),
        })
    }

    pub fn skip_count(&self) -> usize {
        self.skips.len()
    }

    /// Number of distinct report variants seen so far.
    pub fn distinct_reports(&self) -> usize {
        self.by_report.len()
    }

    pub fn total(&self) -> usize {
        self.senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attest(report: &[u8], sig: u8) -> AttestedReportOne {
        AttestedReportOne {
            skip: false,
            report: report.to_vec(),
            signature: OnchainSignature(vec![sig; 64]),
        }
    }

    fn skip() -> AttestedReportOne {
        AttestedReportOne {
            skip: true,
            report: vec![],
            signature: OnchainSignature(vec![0; 64]),
        }
    }

    #[test]
    fn test_tally_quorum() {
        let mut tally = ReportTally::new(2);
        assert!(tally.add(OracleId(2), attest(b"r", 2)).is_none());
        let certified = tally.add(OracleId(0), attest(b"r", 0)).unwrap();

        assert_eq!(certified.report, b"r".to_vec());
        assert_eq!(certified.signers(), vec![OracleId(0), OracleId(2)]);
        // Signatures are ordered by signer.
        assert_eq!(certified.attributed_signatures[0].signer, OracleId(0));
    }

    #[test]
    fn test_tally_split_reports_do_not_combine() {
        let mut tally = ReportTally::new(2);
        assert!(tally.add(OracleId(0), attest(b"a", 0)).is_none());
        assert!(tally.add(OracleId(1), attest(b"b", 1)).is_none());
        assert_eq!(tally.distinct_reports(), 2);

        assert!(tally.add(OracleId(2), attest(b"b", 2)).is_some());
    }

    #[test]
    fn test_tally_skips_never_count() {
        let mut tally = ReportTally::new(2);
        assert!(tally.add(OracleId(0), skip()).is_none());
        assert!(tally.add(OracleId(1), skip()).is_none());
        assert!(tally.add(OracleId(2), attest(b"r", 2)).is_none());
        assert_eq!(tally.skip_count(), 2);
        assert_eq!(tally.total(), 3);
    }

    #[test]
    fn test_tally_one_vote_per_sender() {
        let mut tally = ReportTally::new(2);
        assert!(tally.add(OracleId(0), attest(b"r", 0)).is_none());
        assert!(tally.contains(OracleId(0)));
        assert!(tally.add(OracleId(0), attest(b"r", 9)).is_none());
        assert_eq!(tally.total(), 1);
    }
}
