//! Message encoding and decoding for network transport.
//!
//! # Wire Format
//!
//! ```text
//! [version: u8][payload: SBOR-encoded ProtocolMessage]
//! ```
//!
//! - Version is currently `1`
//! - The SBOR enum discriminator identifies the message kind; an unknown
//!   discriminator fails decoding

use crate::message::ProtocolMessage;
use thiserror::Error;

/// Current wire format version.
pub const WIRE_VERSION: u8 = 1;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Unknown wire version: {0}")]
    UnknownVersion(u8),

    #[error("Message too short")]
    MessageTooShort,

    #[error("SBOR decode error: {0}")]
    SborDecode(String),

    #[error("SBOR encode error: {0}")]
    SborEncode(String),
}

/// Encode a message to wire format.
pub fn encode_message(message: &ProtocolMessage) -> Result<Vec<u8>, CodecError> {
    let payload =
        sbor::basic_encode(message).map_err(|e| CodecError::SborEncode(format!("{:?}", e)))?;

    // Prepend version byte
    let mut bytes = Vec::with_capacity(1 + payload.len());
    bytes.push(WIRE_VERSION);
    bytes.extend(payload);
    Ok(bytes)
}

/// Decode a message from wire format.
pub fn decode_message(data: &[u8]) -> Result<ProtocolMessage, CodecError> {
    let (&version, payload) = data.split_first().ok_or(CodecError::MessageTooShort)?;
    if version != WIRE_VERSION {
        return Err(CodecError::UnknownVersion(version));
    }
    sbor::basic_decode(payload).map_err(|e| CodecError::SborDecode(format!("{:?}", e)))
}
