//! The closed set of protocol messages.

use attestor_certified::{EpochStartProof, EpochStartResponse};
use attestor_types::{
    AttestedReportMany, AttestedReportOne, AttributedSignedObservation, Epoch, Hash,
    OffchainSignature, Round, SeqNr, SignedObservation,
};
use sbor::prelude::BasicSbor;

/// Sub-protocol a message is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubProtocol {
    Pacemaker,
    ReportGeneration,
    Certified,
}

/// Vote to move to `epoch`. Handled by the pacemaker.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct NewEpochMessage {
    pub epoch: Epoch,
}

/// Leader asks every oracle for an observation.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct ObserveReqMessage {
    pub epoch: Epoch,
    pub round: Round,
    pub query: Vec<u8>,
}

/// A follower's signed observation, unicast to the leader.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct ObserveMessage {
    pub epoch: Epoch,
    pub round: Round,
    pub signed_observation: SignedObservation,
}

/// Leader's collated observations.
///
/// Carries the query so followers can verify every observation and recompute
/// the round's commitment hash on their own.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct ReportReqMessage {
    pub epoch: Epoch,
    pub round: Round,
    pub query: Vec<u8>,
    pub attributed_signed_observations: Vec<AttributedSignedObservation>,
}

/// A follower's attestation or skip vote, unicast to the leader.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct ReportMessage {
    pub epoch: Epoch,
    pub round: Round,
    pub report: AttestedReportOne,
}

/// Quorum-certified report for a round.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct FinalMessage {
    pub epoch: Epoch,
    pub round: Round,
    pub commitment: Hash,
    pub report: AttestedReportMany,
}

/// Re-broadcast of a `Final` so every oracle learns it even if the leader
/// crashes right after assembling the quorum.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct FinalEchoMessage {
    pub final_message: FinalMessage,
}

/// An oracle's signature over a finalized report's commit digest.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct CommitVoteMessage {
    pub epoch: Epoch,
    pub seq_nr: SeqNr,
    pub outcome_digest: Hash,
    pub signature: OffchainSignature,
}

/// Highest certified state, unicast to the leader of a new epoch.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct EpochStartMessage {
    pub epoch: Epoch,
    pub response: EpochStartResponse,
}

/// The leader's proof of where its epoch resumes.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct EpochStartProofMessage {
    pub proof: EpochStartProof,
}

/// Every message exchanged between oracles.
///
/// The variant set is fixed by the wire version; decoding an unknown variant
/// is an error.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub enum ProtocolMessage {
    NewEpoch(NewEpochMessage),
    ObserveReq(ObserveReqMessage),
    Observe(ObserveMessage),
    ReportReq(ReportReqMessage),
    Report(ReportMessage),
    Final(FinalMessage),
    FinalEcho(FinalEchoMessage),
    CommitVote(CommitVoteMessage),
    EpochStart(EpochStartMessage),
    EpochStartProof(EpochStartProofMessage),
}

impl ProtocolMessage {
    /// The sub-protocol that handles this message.
    pub fn destination(&self) -> SubProtocol {
        match self {
            ProtocolMessage::NewEpoch(_) => SubProtocol::Pacemaker,
            ProtocolMessage::CommitVote(_)
            | ProtocolMessage::EpochStart(_)
            | ProtocolMessage::EpochStartProof(_) => SubProtocol::Certified,
            _ => SubProtocol::ReportGeneration,
        }
    }

    pub fn epoch(&self) -> Epoch {
        match self {
            ProtocolMessage::NewEpoch(m) => m.epoch,
            ProtocolMessage::ObserveReq(m) => m.epoch,
            ProtocolMessage::Observe(m) => m.epoch,
            ProtocolMessage::ReportReq(m) => m.epoch,
            ProtocolMessage::Report(m) => m.epoch,
            ProtocolMessage::Final(m) => m.epoch,
            ProtocolMessage::FinalEcho(m) => m.final_message.epoch,
            ProtocolMessage::CommitVote(m) => m.epoch,
            ProtocolMessage::EpochStart(m) => m.epoch,
            ProtocolMessage::EpochStartProof(m) => m.proof.epoch,
        }
    }

    /// The round, for report generation messages.
    pub fn round(&self) -> Option<Round> {
        match self {
            ProtocolMessage::NewEpoch(_)
            | ProtocolMessage::CommitVote(_)
            | ProtocolMessage::EpochStart(_)
            | ProtocolMessage::EpochStartProof(_) => None,
            ProtocolMessage::ObserveReq(m) => Some(m.round),
            ProtocolMessage::Observe(m) => Some(m.round),
            ProtocolMessage::ReportReq(m) => Some(m.round),
            ProtocolMessage::Report(m) => Some(m.round),
            ProtocolMessage::Final(m) => Some(m.round),
            ProtocolMessage::FinalEcho(m) => Some(m.final_message.round),
        }
    }

    /// Get the message type name for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            ProtocolMessage::NewEpoch(_) => "NewEpoch",
            ProtocolMessage::ObserveReq(_) => "ObserveReq",
            ProtocolMessage::Observe(_) => "Observe",
            ProtocolMessage::ReportReq(_) => "ReportReq",
            ProtocolMessage::Report(_) => "Report",
            ProtocolMessage::Final(_) => "Final",
            ProtocolMessage::FinalEcho(_) => "FinalEcho",
            ProtocolMessage::CommitVote(_) => "CommitVote",
            ProtocolMessage::EpochStart(_) => "EpochStart",
            ProtocolMessage::EpochStartProof(_) => "EpochStartProof",
        }
    }
}
