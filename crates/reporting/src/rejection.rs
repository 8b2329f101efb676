//! Typed reasons for dropping a report generation message.

use attestor_types::{CryptoError, Epoch, OracleId, ReportCertificateError, Round};
use thiserror::Error;

/// Why an inbound message was not accepted.
///
/// Rejections are absorbed by the state machine: they are logged with the
/// sender, epoch, round and message type and never propagated further.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageRejection {
    #[error("local oracle is not the leader of epoch {epoch}")]
    NotLeader { epoch: Epoch },

    #[error("sender {sender} is not the leader {leader}")]
    NotFromLeader { sender: OracleId, leader: OracleId },

    #[error("wrong epoch: expected {expected}, got {got}")]
    WrongEpoch { expected: Epoch, got: Epoch },

    #[error("wrong round: expected {expected}, got {got}")]
    WrongRound { expected: Round, got: Round },

    #[error("stale round {got}, already at {current}")]
    StaleRound { current: Round, got: Round },

    #[error("round {round} exceeds r_max {r_max}")]
    RoundOutOfRange { round: Round, r_max: u8 },

    #[error("unexpected in phase {phase}")]
    WrongPhase { phase: &'static str },

    #[error("duplicate contribution from {0}")]
    Duplicate(OracleId),

    #[error("unknown oracle {0}")]
    UnknownSender(OracleId),

    #[error("{field} too long: {len} > {max}")]
    Oversize {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("invalid signature from {signer}: {source}")]
    InvalidSignature {
        signer: OracleId,
        #[source]
        source: CryptoError,
    },

    #[error("{got} observations, need more than {min}")]
    InsufficientObservations { got: usize, min: usize },

    #[error("observations not strictly ordered by observer")]
    UnorderedObservations,

    #[error("commitment hash does not match the local one")]
    CommitmentMismatch,

    #[error("round {0} already finalized")]
    AlreadyFinalized(Round),

    #[error("invalid report certificate: {0}")]
    InvalidCertificate(#[from] ReportCertificateError),
}

impl MessageRejection {
    /// Rejections that honest-but-slow peers never cause.
    ///
    /// Logged at warn; everything else is normal protocol noise (late or
    /// duplicate traffic) and is logged at debug.
    pub fn is_suspicious(&self) -> bool {
        matches!(
            self,
            MessageRejection::UnknownSender(_)
                | MessageRejection::Oversize { .. }
                | MessageRejection::InvalidSignature { .. }
                | MessageRejection::UnorderedObservations
                | MessageRejection::CommitmentMismatch
                | MessageRejection::InvalidCertificate(_)
                | MessageRejection::RoundOutOfRange { .. }
        )
    }
}
