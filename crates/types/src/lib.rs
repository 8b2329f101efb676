//! Core types for the attestor reporting protocol.
//!
//! This crate provides the foundational types used throughout the protocol:
//!
//! - **Primitives**: Hash, offchain (Ed25519) and on-chain (secp256k1) keys
//! - **Identifiers**: OracleId, Epoch, Round, SeqNr, ConfigDigest
//! - **Protocol types**: ReportContext, SignedObservation, attested reports
//! - **Certified state**: prepare/commit certificates carried across epochs
//! - **Topology and configuration**
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend on
//! any other workspace crates, making it the foundation layer.

mod crypto;
mod hash;
mod identifiers;
pub mod signing;

mod certified;
mod config;
mod context;
mod observation;
mod report;
mod topology;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use crypto::{
    CryptoError, OffchainKeyPair, OffchainPublicKey, OffchainSignature, OnchainKeyPair,
    OnchainPublicKey, OnchainSignature, OracleKeys, OFFCHAIN_SIGNATURE_LENGTH, ONCHAIN_PUBLIC_KEY_LENGTH,
    ONCHAIN_SIGNATURE_LENGTH,
};
pub use hash::{Hash, HexError};
pub use identifiers::{ConfigDigest, Epoch, OracleId, Round, SeqNr};

pub use certified::{
    AttributedOffchainSignature, AttributedSignedHighestCertifiedTimestamp, CertifiedCommit,
    CertifiedPrepare, CertifiedPrepareOrCommit, HighestCertifiedTimestamp, QuorumCertificate,
    SignedHighestCertifiedTimestamp,
};
pub use config::{ConfigError, MessageLimits, ProtocolConfig};
pub use context::ReportContext;
pub use observation::{AttributedObservation, AttributedSignedObservation, SignedObservation};
pub use report::{
    AttestedReportMany, AttestedReportOne, AttributedOnchainSignature, ReportCertificateError,
};
pub use topology::{OracleIdentity, StaticTopology, Topology, TopologyError};
