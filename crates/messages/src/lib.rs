//! Network messages for the reporting protocol.

mod codec;
mod message;
mod size;

pub use codec::{decode_message, encode_message, CodecError, WIRE_VERSION};
pub use message::{
    CommitVoteMessage, EpochStartMessage, EpochStartProofMessage, FinalEchoMessage, FinalMessage,
    NewEpochMessage, ObserveMessage, ObserveReqMessage, ProtocolMessage, ReportMessage,
    ReportReqMessage, SubProtocol,
};
