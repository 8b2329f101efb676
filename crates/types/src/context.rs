//! Report context: the immutable identity of one protocol instance.

use crate::{ConfigDigest, Epoch, Round, SeqNr};
use sbor::prelude::*;
use std::fmt;

/// `(ConfigDigest, Epoch, Round)`.
///
/// Every signed payload is domain separated by this tuple so a signature made
/// for one round can never be replayed in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BasicSbor)]
pub struct ReportContext {
    pub config_digest: ConfigDigest,
    pub epoch: Epoch,
    pub round: Round,
}

impl ReportContext {
    pub fn new(config_digest: ConfigDigest, epoch: Epoch, round: Round) -> Self {
        Self {
            config_digest,
            epoch,
            round,
        }
    }

    /// `(epoch, round)` as a totally ordered key.
    pub fn timestamp(&self) -> (Epoch, Round) {
        (self.epoch, self.round)
    }

    /// Sequence number under which a report of this round is certified.
    ///
    /// `epoch ‖ round` packed into one counter: strictly increasing in
    /// `(epoch, round)`, and never the genesis `SeqNr(0)` for a real epoch.
    pub fn seq_nr(&self) -> SeqNr {
        SeqNr((u64::from(self.epoch.0) << 8) | u64::from(self.round.0))
    }

    /// Canonical byte encoding: `config_digest ‖ epoch_be32 ‖ round_u8`.
    pub fn to_bytes(&self) -> [u8; 37] {
        let mut out = [0u8; 37];
        out[..32].copy_from_slice(self.config_digest.as_bytes());
        out[32..36].copy_from_slice(&self.epoch.0.to_be_bytes());
        out[36] = self.round.0;
        out
    }
}

impl fmt::Display for ReportContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch={} round={}", self.epoch, self.round)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(epoch: u32, round: u8) -> ReportContext {
        ReportContext::new(ConfigDigest([0; 32]), Epoch(epoch), Round(round))
    }

    #[test]
    fn test_seq_nr_follows_epoch_and_round() {
        assert!(ctx(1, 1).seq_nr() > SeqNr::GENESIS);
        assert!(ctx(1, 255).seq_nr() < ctx(2, 0).seq_nr());
        assert!(ctx(2, 3).seq_nr() < ctx(2, 4).seq_nr());
        assert_eq!(ctx(u32::MAX, u8::MAX).seq_nr(), SeqNr((1u64 << 40) - 1));
    }
}
