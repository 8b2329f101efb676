//! Oracle key material.
//!
//! Two independent schemes are used:
//!
//! - **Offchain keys** (Ed25519) sign observations, epoch-start claims and
//!   certified-state votes between oracles.
//! - **On-chain keys** (secp256k1 ECDSA) sign report attestations so that a
//!   contract can verify every signature in a quorum certificate.
//!
//! Signatures travel as raw byte vectors. Malformed lengths are rejected
//! explicitly at verification time instead of being silently treated as
//! invalid.

use ed25519_dalek::Signer as _;
use k256::ecdsa::signature::{Signer as _, Verifier as _};
use sbor::prelude::*;
use std::fmt;
use thiserror::Error;

/// Length of an Ed25519 signature.
pub const OFFCHAIN_SIGNATURE_LENGTH: usize = 64;

/// Length of a compact secp256k1 ECDSA signature (`r ‖ s`).
pub const ONCHAIN_SIGNATURE_LENGTH: usize = 64;

/// Length of a SEC1 compressed secp256k1 public key.
pub const ONCHAIN_PUBLIC_KEY_LENGTH: usize = 33;

/// Errors from key construction and signature verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid public key bytes")]
    InvalidPublicKey,

    #[error("invalid secret key bytes")]
    InvalidSecretKey,

    #[error("invalid signature length: expected {expected}, got {actual}")]
    InvalidSignatureLength { expected: usize, actual: usize },

    #[error("signature verification failed")]
    VerificationFailed,
}

// ═══════════════════════════════════════════════════════════════════════════
// Offchain (Ed25519)
// ═══════════════════════════════════════════════════════════════════════════

/// An Ed25519 signature over an offchain payload.
#[derive(Clone, PartialEq, Eq, Hash, BasicSbor)]
#[sbor(transparent)]
pub struct OffchainSignature(pub Vec<u8>);

impl fmt::Debug for OffchainSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = hex::encode(&self.0);
        write!(f, "OffchainSignature({})", &encoded[..encoded.len().min(16)])
    }
}

/// An Ed25519 verifying key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BasicSbor)]
#[sbor(transparent)]
pub struct OffchainPublicKey(pub [u8; 32]);

impl OffchainPublicKey {
    /// Verify `signature` over `message`.
    ///
    /// Uses strict verification so that malleated signatures and small-order
    /// keys are refused.
    pub fn verify(&self, message: &[u8], signature: &OffchainSignature) -> Result<(), CryptoError> {
        let key = ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        if signature.0.len() != OFFCHAIN_SIGNATURE_LENGTH {
            return Err(CryptoError::InvalidSignatureLength {
                expected: OFFCHAIN_SIGNATURE_LENGTH,
                actual: signature.0.len(),
            });
        }
        let sig = ed25519_dalek::Signature::from_slice(&signature.0)
            .map_err(|_| CryptoError::VerificationFailed)?;
        key.verify_strict(message, &sig)
            .map_err(|_| CryptoError::VerificationFailed)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidPublicKey)?;
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        ed25519_dalek::VerifyingKey::from_bytes(&array)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(array))
    }
}

impl fmt::Debug for OffchainPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OffchainPublicKey({})", &self.to_hex()[..16])
    }
}

/// An Ed25519 signing key.
pub struct OffchainKeyPair {
    signing_key: ed25519_dalek::SigningKey,
}

impl OffchainKeyPair {
    /// Deterministically derive a key pair from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(&seed),
        }
    }

    /// Generate a fresh key pair from the given RNG.
    pub fn generate<R: rand::RngCore + rand::CryptoRng>(rng: &mut R) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    pub fn public_key(&self) -> OffchainPublicKey {
        OffchainPublicKey(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> OffchainSignature {
        OffchainSignature(self.signing_key.sign(message).to_bytes().to_vec())
    }
}

impl fmt::Debug for OffchainKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OffchainKeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// On-chain style (secp256k1 ECDSA)
// ═══════════════════════════════════════════════════════════════════════════

/// A compact secp256k1 ECDSA signature.
#[derive(Clone, PartialEq, Eq, Hash, BasicSbor)]
#[sbor(transparent)]
pub struct OnchainSignature(pub Vec<u8>);

impl fmt::Debug for OnchainSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = hex::encode(&self.0);
        write!(f, "OnchainSignature({})", &encoded[..encoded.len().min(16)])
    }
}

/// A SEC1-encoded secp256k1 verifying key.
#[derive(Clone, PartialEq, Eq, Hash, BasicSbor)]
#[sbor(transparent)]
pub struct OnchainPublicKey(pub Vec<u8>);

impl OnchainPublicKey {
    pub fn verify(&self, message: &[u8], signature: &OnchainSignature) -> Result<(), CryptoError> {
        let key = k256::ecdsa::VerifyingKey::from_sec1_bytes(&self.0)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        if signature.0.len() != ONCHAIN_SIGNATURE_LENGTH {
            return Err(CryptoError::InvalidSignatureLength {
                expected: ONCHAIN_SIGNATURE_LENGTH,
                actual: signature.0.len(),
            });
        }
        let sig = k256::ecdsa::Signature::from_slice(&signature.0)
            .map_err(|_| CryptoError::VerificationFailed)?;
        key.verify(message, &sig)
            .map_err(|_| CryptoError::VerificationFailed)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidPublicKey)?;
        k256::ecdsa::VerifyingKey::from_sec1_bytes(&bytes)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for OnchainPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = self.to_hex();
        write!(f, "OnchainPublicKey({})", &encoded[..encoded.len().min(16)])
    }
}

/// A secp256k1 signing key.
pub struct OnchainKeyPair {
    signing_key: k256::ecdsa::SigningKey,
}

impl OnchainKeyPair {
    /// Build a key pair from a 32-byte secret scalar.
    ///
    /// Fails for the zero scalar and for values not below the curve order.
    pub fn from_secret(secret: [u8; 32]) -> Result<Self, CryptoError> {
        let signing_key = k256::ecdsa::SigningKey::from_slice(&secret)
            .map_err(|_| CryptoError::InvalidSecretKey)?;
        Ok(Self { signing_key })
    }

    pub fn generate<R: rand::RngCore + rand::CryptoRng>(rng: &mut R) -> Self {
        Self {
            signing_key: k256::ecdsa::SigningKey::random(rng),
        }
    }

    pub fn public_key(&self) -> OnchainPublicKey {
        OnchainPublicKey(
            self.signing_key
                .verifying_key()
                .to_encoded_point(true)
                .as_bytes()
                .to_vec(),
        )
    }

    pub fn sign(&self, message: &[u8]) -> OnchainSignature {
        let sig: k256::ecdsa::Signature = self.signing_key.sign(message);
        OnchainSignature(sig.to_bytes().to_vec())
    }
}

impl fmt::Debug for OnchainKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnchainKeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Oracle key bundle
// ═══════════════════════════════════════════════════════════════════════════

/// Both private keys of one oracle. Immutable after construction and shared
/// by reference between sub-protocols.
#[derive(Debug)]
pub struct OracleKeys {
    pub offchain: OffchainKeyPair,
    pub onchain: OnchainKeyPair,
}

impl OracleKeys {
    pub fn new(offchain: OffchainKeyPair, onchain: OnchainKeyPair) -> Self {
        Self { offchain, onchain }
    }
}
