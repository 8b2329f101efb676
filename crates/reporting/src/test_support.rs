//! Shared fixtures for report generation tests.

use crate::ReportGenerationState;
use attestor_messages::{ObserveMessage, ReportMessage};
use attestor_types::test_utils::{test_oracle_set, TestOracleSet};
use attestor_types::{
    AttestedReportOne, ConfigDigest, Epoch, OffchainKeyPair, OnchainKeyPair, OracleId, OracleKeys,
    ProtocolConfig, ReportContext, Round, SignedObservation,
};
use std::sync::Arc;

pub const QUERY: &[u8] = b"eth-usd";
pub const DIGEST: ConfigDigest = ConfigDigest([7; 32]);

pub fn make_test_state(local: u8) -> (ReportGenerationState, TestOracleSet) {
    make_test_state_with(local, |config| config)
}

/// Four oracles, `f = 1`, report quorum 2, seen from `local`.
pub fn make_test_state_with(
    local: u8,
    customize: impl FnOnce(ProtocolConfig) -> ProtocolConfig,
) -> (ReportGenerationState, TestOracleSet) {
    let set = test_oracle_set(4);
    let topology = set.topology(OracleId(local)).into_arc();
    let i = local as usize;
    // Same seeds as the set, so signatures verify against its topology.
    let keys = Arc::new(OracleKeys::new(
        OffchainKeyPair::from_seed([local + 1; 32]),
        OnchainKeyPair::from_secret([local + 1; 32]).unwrap(),
    ));
    assert_eq!(keys.offchain.public_key(), set.offchain[i].public_key());
    let config = customize(ProtocolConfig::new(1, 2).with_config_digest(DIGEST));
    (ReportGenerationState::new(topology, keys, config), set)
}

/// `Observe` from oracle `i`, signed for `(epoch, round, query)`.
pub fn observe_msg(
    set: &TestOracleSet,
    i: u8,
    epoch: Epoch,
    round: Round,
    query: &[u8],
    observation: &[u8],
) -> ObserveMessage {
    let ctx = ReportContext::new(DIGEST, epoch, round);
    let keys = &set.offchain[i as usize];
    ObserveMessage {
        epoch,
        round,
        signed_observation: SignedObservation::sign(&ctx, query, observation.to_vec(), |m| {
            keys.sign(m)
        }),
    }
}

/// `Report` from oracle `i` attesting to `report` in `ctx`.
pub fn report_msg(set: &TestOracleSet, i: u8, ctx: &ReportContext, report: &[u8]) -> ReportMessage {
    ReportMessage {
        epoch: ctx.epoch,
        round: ctx.round,
        report: AttestedReportOne::attest(ctx, report.to_vec(), &set.onchain[i as usize]),
    }
}
