//! Domain-separated signing payloads.
//!
//! Every payload an oracle signs is built here, so that the layout of signed
//! bytes lives in exactly one place. Each payload starts with a distinct
//! domain tag and carries the report context (or the certified-state
//! equivalent), which prevents a signature from being replayed for a
//! different message kind, config, epoch or round.

use crate::{ConfigDigest, Epoch, Hash, ReportContext, SeqNr};
use sha3::{Digest, Keccak256};

/// Observation signatures (offchain key).
pub const DOMAIN_OBSERVATION: &[u8] = b"attestor/observation/v1";

/// Commitment over a round's query and collated observations.
pub const DOMAIN_COMMITMENT: &[u8] = b"attestor/commitment/v1";

/// Explicit "skip this round" attestation (on-chain key).
pub const DOMAIN_SKIP: &[u8] = b"attestor/skip/v1";

/// Prepare vote in the certified variant (offchain key).
pub const DOMAIN_PREPARE: &[u8] = b"attestor/prepare/v1";

/// Commit vote in the certified variant (offchain key).
pub const DOMAIN_COMMIT: &[u8] = b"attestor/commit/v1";

/// Highest certified timestamp claim sent to a new leader (offchain key).
pub const DOMAIN_HIGHEST_CERTIFIED: &[u8] = b"attestor/highest-certified/v1";

fn len_prefix(bytes: &[u8]) -> [u8; 4] {
    (bytes.len() as u32).to_be_bytes()
}

/// Digest an observation signature commits to.
///
/// `H(domain ‖ config_digest ‖ epoch ‖ round ‖ len(query) ‖ query ‖ len(obs) ‖ obs)`
pub fn observation_message(ctx: &ReportContext, query: &[u8], observation: &[u8]) -> Hash {
    Hash::from_parts(&[
        DOMAIN_OBSERVATION,
        &ctx.to_bytes(),
        &len_prefix(query),
        query,
        &len_prefix(observation),
        observation,
    ])
}

/// One entry of the commitment: observer index, observation and signature.
pub struct CommitmentEntry<'a> {
    pub observer: u8,
    pub observation: &'a [u8],
    pub signature: &'a [u8],
}

/// Commitment hash over a round's query and collated observations.
///
/// Entries must already be sorted by observer so that leader and followers
/// compute the same value.
pub fn commitment_hash<'a>(query: &[u8], entries: impl IntoIterator<Item = CommitmentEntry<'a>>) -> Hash {
    let mut buf = Vec::with_capacity(64 + query.len());
    buf.extend_from_slice(DOMAIN_COMMITMENT);
    buf.extend_from_slice(&len_prefix(query));
    buf.extend_from_slice(query);

    let entries: Vec<_> = entries.into_iter().collect();
    buf.extend_from_slice(&(entries.len() as u32).to_be_bytes());
    for entry in entries {
        buf.push(entry.observer);
        buf.extend_from_slice(&len_prefix(entry.observation));
        buf.extend_from_slice(entry.observation);
        buf.extend_from_slice(&len_prefix(entry.signature));
        buf.extend_from_slice(entry.signature);
    }
    Hash::from_bytes(&buf)
}

/// Keccak-256 digest a report attestation signs.
///
/// `keccak(report ‖ config_digest ‖ epoch ‖ round)`: a contract holding the
/// report and its context can recompute it without the commitment hash.
pub fn report_message(ctx: &ReportContext, report: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(report);
    hasher.update(ctx.to_bytes());
    hasher.finalize().into()
}

/// Keccak-256 digest a skip vote signs, bound to the commitment hash.
pub fn skip_message(ctx: &ReportContext, commitment: &Hash) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(DOMAIN_SKIP);
    hasher.update(ctx.to_bytes());
    hasher.update(commitment.as_bytes());
    hasher.finalize().into()
}

fn certified_message(
    domain: &[u8],
    config_digest: &ConfigDigest,
    epoch: Epoch,
    seq_nr: SeqNr,
    outcome_digest: &Hash,
) -> Hash {
    Hash::from_parts(&[
        domain,
        config_digest.as_bytes(),
        &epoch.0.to_be_bytes(),
        &seq_nr.0.to_be_bytes(),
        outcome_digest.as_bytes(),
    ])
}

/// Payload of a prepare vote over `(epoch, seq_nr, outcome_digest)`.
pub fn prepare_message(
    config_digest: &ConfigDigest,
    epoch: Epoch,
    seq_nr: SeqNr,
    outcome_digest: &Hash,
) -> Hash {
    certified_message(DOMAIN_PREPARE, config_digest, epoch, seq_nr, outcome_digest)
}

/// Payload of a commit vote over `(epoch, seq_nr, outcome_digest)`.
pub fn commit_message(
    config_digest: &ConfigDigest,
    epoch: Epoch,
    seq_nr: SeqNr,
    outcome_digest: &Hash,
) -> Hash {
    certified_message(DOMAIN_COMMIT, config_digest, epoch, seq_nr, outcome_digest)
}

/// Payload of a signed highest certified timestamp for `new_epoch`.
pub fn highest_certified_message(
    config_digest: &ConfigDigest,
    new_epoch: Epoch,
    seq_nr: SeqNr,
    committed_else_prepared: bool,
) -> Hash {
    Hash::from_parts(&[
        DOMAIN_HIGHEST_CERTIFIED,
        config_digest.as_bytes(),
        &new_epoch.0.to_be_bytes(),
        &seq_nr.0.to_be_bytes(),
        &[committed_else_prepared as u8],
    ])
}
