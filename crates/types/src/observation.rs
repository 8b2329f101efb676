//! Signed observation codec.

use crate::signing::observation_message;
use crate::{CryptoError, OffchainPublicKey, OffchainSignature, OracleId, ReportContext};
use sbor::prelude::*;

/// An observation bound to a report context and query, signed with the
/// observer's offchain key.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct SignedObservation {
    pub observation: Vec<u8>,
    pub signature: OffchainSignature,
}

impl SignedObservation {
    /// Sign `observation` for `(ctx, query)`.
    ///
    /// The signer receives the digest bytes; keeping it a closure lets callers
    /// sign without handing key material to this type.
    pub fn sign<F>(ctx: &ReportContext, query: &[u8], observation: Vec<u8>, signer: F) -> Self
    where
        F: FnOnce(&[u8]) -> OffchainSignature,
    {
        let message = observation_message(ctx, query, &observation);
        let signature = signer(message.as_bytes());
        Self {
            observation,
            signature,
        }
    }

    /// Verify against `(ctx, query)` and the observer's public key.
    pub fn verify(
        &self,
        ctx: &ReportContext,
        query: &[u8],
        public_key: &OffchainPublicKey,
    ) -> Result<(), CryptoError> {
        let message = observation_message(ctx, query, &self.observation);
        public_key.verify(message.as_bytes(), &self.signature)
    }
}

/// A signed observation tagged with the oracle that produced it.
#[derive(Debug, Clone, PartialEq, Eq, BasicSbor)]
pub struct AttributedSignedObservation {
    pub signed_observation: SignedObservation,
    pub observer: OracleId,
}

impl AttributedSignedObservation {
    /// Strip the signature for the plugin-facing form.
    pub fn to_attributed(&self) -> AttributedObservation {
        AttributedObservation {
            observation: self.signed_observation.observation.clone(),
            observer: self.observer,
        }
    }
}

/// The plugin-facing form of a validated observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributedObservation {
    pub observation: Vec<u8>,
    pub observer: OracleId,
}
