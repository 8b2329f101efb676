//! Leader role: drives rounds, collects observations and attestations.

use crate::state::{commitment_of, ReportGenerationState};
use crate::tally::ReportTally;
use crate::MessageRejection;
use attestor_core::{Action, Event, PluginCall, PluginError, TimerId};
use attestor_messages::{
    FinalMessage, ObserveMessage, ObserveReqMessage, ProtocolMessage, ReportMessage,
    ReportReqMessage,
};
use attestor_types::{
    AttributedSignedObservation, Hash, OracleId, ReportContext, Round, SignedObservation,
};
use std::collections::BTreeMap;
use tracing::{debug, error, info, instrument, trace, warn};

/// Phase of the round the leader is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LeaderPhase {
    /// No round started yet this epoch.
    Idle,
    /// Waiting for the plugin's query.
    AwaitingQuery,
    /// Collecting observations.
    Observe,
    /// Quorum of observations reached; admitting stragglers until grace expiry.
    Grace,
    /// `ReportReq` sent; collecting attestations.
    Report,
    /// Certified report broadcast.
    Final,
    /// A plugin call failed; waiting for the next round.
    Abandoned,
}

impl LeaderPhase {
    pub fn name(self) -> &'static str {
        match self {
            LeaderPhase::Idle => "idle",
            LeaderPhase::AwaitingQuery => "awaiting_query",
            LeaderPhase::Observe => "observe",
            LeaderPhase::Grace => "grace",
            LeaderPhase::Report => "report",
            LeaderPhase::Final => "final",
            LeaderPhase::Abandoned => "abandoned",
        }
    }
}

/// Per-epoch leader state. Per-round collections are reset on every round start.
#[derive(Debug)]
pub(crate) struct LeaderState {
    pub round: Round,
    pub phase: LeaderPhase,
    /// Two-call guard: `start_round` with the flag clear only sets it.
    pub ready_to_start_round: bool,
    /// Set once `r_max` is exceeded; no further rounds this epoch.
    pub halted: bool,
    pub query: Vec<u8>,
    pub observations: BTreeMap<OracleId, SignedObservation>,
    pub commitment: Option<Hash>,
    pub tally: ReportTally,
    report_quorum: usize,
}

impl LeaderState {
    pub fn new(report_quorum: usize) -> Self {
        Self {
            round: Round::ZERO,
            phase: LeaderPhase::Idle,
            ready_to_start_round: false,
            halted: false,
            query: Vec::new(),
            observations: BTreeMap::new(),
            commitment: None,
            tally: ReportTally::new(report_quorum),
            report_quorum,
        }
    }

    fn reset_round(&mut self, round: Round) {
        self.round = round;
        self.phase = LeaderPhase::AwaitingQuery;
        self.query.clear();
        self.observations.clear();
        self.commitment = None;
        self.tally = ReportTally::new(self.report_quorum);
    }
}

impl ReportGenerationState {
    // ═══════════════════════════════════════════════════════════════════════════
    // Round lifecycle
    // ═══════════════════════════════════════════════════════════════════════════

    /// Try to start the next round.
    ///
    /// With the ready flag clear this only arms it; with it set the next round
    /// starts and the flag is cleared. Exceeding `r_max` halts the epoch and
    /// asks the pacemaker for a new leader.
    pub(crate) fn start_round(&mut self) -> Vec<Action> {
        let epoch = self.epoch;
        let r_max = self.config.r_max;
        let Some(leader) = self.leader_state.as_mut() else {
            return vec![];
        };
        if leader.halted {
            return vec![];
        }
        if !leader.ready_to_start_round {
            leader.ready_to_start_round = true;
            trace!(epoch = epoch.0, round = leader.round.0, "Armed ready-to-start-round");
            return vec![];
        }
        leader.ready_to_start_round = false;

        let Some(next) = leader.round.next().filter(|r| r.0 <= r_max) else {
            leader.halted = true;
            error!(
                epoch = epoch.0,
                round = leader.round.0,
                r_max,
                "Round limit reached, halting round initiation and requesting leader change"
            );
            return vec![
                Action::CancelTimer { id: TimerId::Round },
                Action::CancelTimer { id: TimerId::Grace },
                Action::EnqueueInternal {
                    event: Event::ChangeLeader,
                },
            ];
        };

        if !matches!(leader.phase, LeaderPhase::Idle | LeaderPhase::Final) {
            info!(
                epoch = epoch.0,
                round = leader.round.0,
                phase = leader.phase.name(),
                "Abandoning round that did not finalize in time"
            );
        }
        leader.reset_round(next);
        debug!(epoch = epoch.0, round = next.0, "Starting round");

        vec![
            Action::SetTimer {
                id: TimerId::Round,
                duration: self.config.delta_round,
            },
            Action::CancelTimer { id: TimerId::Grace },
            Action::InvokePlugin {
                call: PluginCall::Query {
                    ctx: self.context(next),
                },
            },
        ]
    }

    /// Round timer expiry: re-arm and try to start the next round.
    ///
    /// A round that has not finalized by the second expiry is abandoned.
    pub fn on_round_timer(&mut self) -> Vec<Action> {
        match &self.leader_state {
            Some(leader) if !leader.halted => {}
            _ => return vec![],
        }
        let mut actions = vec![Action::SetTimer {
            id: TimerId::Round,
            duration: self.config.delta_round,
        }];
        actions.extend(self.start_round());
        actions
    }

    /// The plugin produced (or failed to produce) the query for a round.
    pub fn on_query_completed(
        &mut self,
        ctx: ReportContext,
        result: Result<Vec<u8>, PluginError>,
    ) -> Vec<Action> {
        let current = match &self.leader_state {
            Some(leader) if leader.phase == LeaderPhase::AwaitingQuery => {
                self.context(leader.round)
            }
            _ => {
                debug!(%ctx, "Dropping query result outside of a round start");
                return vec![];
            }
        };
        if ctx != current {
            debug!(%ctx, current = %current, "Dropping stale query result");
            return vec![];
        }
        let max_query_length = self.config.max_query_length;
        let Some(leader) = self.leader_state.as_mut() else {
            return vec![];
        };

        let query = match result {
            Ok(query) if query.len() <= max_query_length => query,
            Ok(query) => {
                warn!(
                    epoch = ctx.epoch.0,
                    round = ctx.round.0,
                    len = query.len(),
                    max = max_query_length,
                    "Plugin query too long, abandoning round"
                );
                leader.phase = LeaderPhase::Abandoned;
                return vec![];
            }
            Err(e) => {
                warn!(
                    epoch = ctx.epoch.0,
                    round = ctx.round.0,
                    error = %e,
                    "Query failed, abandoning round"
                );
                leader.phase = LeaderPhase::Abandoned;
                return vec![];
            }
        };

        leader.query = query.clone();
        leader.phase = LeaderPhase::Observe;
        vec![Action::Broadcast {
            message: ProtocolMessage::ObserveReq(ObserveReqMessage {
                epoch: ctx.epoch,
                round: ctx.round,
                query,
            }),
        }]
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Observations
    // ═══════════════════════════════════════════════════════════════════════════

    /// Check whether the leader would admit `msg` from `sender`.
    ///
    /// Epoch and round are compared before any signature is verified, so a
    /// replayed observation is rejected without cryptographic work.
    pub fn check_observe(
        &self,
        sender: OracleId,
        msg: &ObserveMessage,
    ) -> Result<(), MessageRejection> {
        let leader = self
            .leader_state
            .as_ref()
            .ok_or(MessageRejection::NotLeader { epoch: self.epoch })?;
        if msg.epoch != self.epoch {
            return Err(MessageRejection::WrongEpoch {
                expected: self.epoch,
                got: msg.epoch,
            });
        }
        if msg.round != leader.round {
            return Err(MessageRejection::WrongRound {
                expected: leader.round,
                got: msg.round,
            });
        }
        if !matches!(leader.phase, LeaderPhase::Observe | LeaderPhase::Grace) {
            return Err(MessageRejection::WrongPhase {
                phase: leader.phase.name(),
            });
        }
        let public_key = self
            .topology
            .offchain_public_key(sender)
            .ok_or(MessageRejection::UnknownSender(sender))?;
        if leader.observations.contains_key(&sender) {
            return Err(MessageRejection::Duplicate(sender));
        }
        let len = msg.signed_observation.observation.len();
        if len > self.config.max_observation_length {
            return Err(MessageRejection::Oversize {
                field: "observation",
                len,
                max: self.config.max_observation_length,
            });
        }
        msg.signed_observation
            .verify(&self.context(msg.round), &leader.query, &public_key)
            .map_err(|source| MessageRejection::InvalidSignature {
                signer: sender,
                source,
            })
    }

    #[instrument(level = "trace", skip(self, msg), fields(epoch = self.epoch.0, sender = sender.0))]
    pub(crate) fn on_observe(
        &mut self,
        sender: OracleId,
        msg: ObserveMessage,
    ) -> Result<Vec<Action>, MessageRejection> {
        self.check_observe(sender, &msg)?;

        let threshold = 2 * self.topology.f();
        let delta_grace = self.config.delta_grace;
        let Some(leader) = self.leader_state.as_mut() else {
            return Ok(vec![]);
        };
        leader.observations.insert(sender, msg.signed_observation);
        trace!(
            round = leader.round.0,
            count = leader.observations.len(),
            "Recorded observation"
        );

        if leader.phase == LeaderPhase::Observe && leader.observations.len() > threshold {
            leader.phase = LeaderPhase::Grace;
            debug!(
                round = leader.round.0,
                count = leader.observations.len(),
                "Observation quorum reached, starting grace period"
            );
            return Ok(vec![Action::SetTimer {
                id: TimerId::Grace,
                duration: delta_grace,
            }]);
        }
        Ok(vec![])
    }

    /// Grace period over: collate observations and request attestations.
    pub fn on_grace_timer(&mut self) -> Vec<Action> {
        let epoch = self.epoch;
        let Some(leader) = self.leader_state.as_mut() else {
            return vec![];
        };
        if leader.phase != LeaderPhase::Grace {
            trace!(phase = leader.phase.name(), "Grace timer outside of grace phase");
            return vec![];
        }

        let observations: Vec<AttributedSignedObservation> = leader
            .observations
            .iter()
            .map(|(observer, signed)| AttributedSignedObservation {
                signed_observation: signed.clone(),
                observer: *observer,
            })
            .collect();
        let commitment = commitment_of(&leader.query, &observations);
        leader.commitment = Some(commitment);
        leader.phase = LeaderPhase::Report;

        debug!(
            epoch = epoch.0,
            round = leader.round.0,
            observations = observations.len(),
            commitment = %commitment,
            "Requesting reports"
        );

        vec![Action::Broadcast {
            message: ProtocolMessage::ReportReq(ReportReqMessage {
                epoch,
                round: leader.round,
                query: leader.query.clone(),
                attributed_signed_observations: observations,
            }),
        }]
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Attestations
    // ═══════════════════════════════════════════════════════════════════════════

    /// Check whether the leader would admit the attestation `msg` from `sender`.
    pub fn check_report(
        &self,
        sender: OracleId,
        msg: &ReportMessage,
    ) -> Result<(), MessageRejection> {
        let leader = self
            .leader_state
            .as_ref()
            .ok_or(MessageRejection::NotLeader { epoch: self.epoch })?;
        if msg.epoch != self.epoch {
            return Err(MessageRejection::WrongEpoch {
                expected: self.epoch,
                got: msg.epoch,
            });
        }
        if msg.round != leader.round {
            return Err(MessageRejection::WrongRound {
                expected: leader.round,
                got: msg.round,
            });
        }
        let commitment = match (leader.phase, leader.commitment) {
            (LeaderPhase::Report, Some(commitment)) => commitment,
            (phase, _) => return Err(MessageRejection::WrongPhase { phase: phase.name() }),
        };
        let public_key = self
            .topology
            .onchain_public_key(sender)
            .ok_or(MessageRejection::UnknownSender(sender))?;
        if leader.tally.contains(sender) {
            return Err(MessageRejection::Duplicate(sender));
        }
        let len = msg.report.report.len();
        if len > self.config.max_report_length {
            return Err(MessageRejection::Oversize {
                field: "report",
                len,
                max: self.config.max_report_length,
            });
        }
        msg.report
            .verify(&self.context(msg.round), &commitment, &public_key)
            .map_err(|source| MessageRejection::InvalidSignature {
                signer: sender,
                source,
            })
    }

    #[instrument(level = "trace", skip(self, msg), fields(epoch = self.epoch.0, sender = sender.0))]
    pub(crate) fn on_report(
        &mut self,
        sender: OracleId,
        msg: ReportMessage,
    ) -> Result<Vec<Action>, MessageRejection> {
        self.check_report(sender, &msg)?;

        let epoch = self.epoch;
        let Some(leader) = self.leader_state.as_mut() else {
            return Ok(vec![]);
        };
        let Some(report) = leader.tally.add(sender, msg.report) else {
            trace!(
                round = leader.round.0,
                received = leader.tally.total(),
                skips = leader.tally.skip_count(),
                variants = leader.tally.distinct_reports(),
                "Recorded attestation"
            );
            return Ok(vec![]);
        };
        let Some(commitment) = leader.commitment else {
            return Ok(vec![]);
        };

        leader.phase = LeaderPhase::Final;
        info!(
            epoch = epoch.0,
            round = leader.round.0,
            signers = report.attributed_signatures.len(),
            skips = leader.tally.skip_count(),
            "Report certified, broadcasting final"
        );

        let mut actions = vec![Action::Broadcast {
            message: ProtocolMessage::Final(FinalMessage {
                epoch,
                round: leader.round,
                commitment,
                report,
            }),
        }];
        actions.extend(self.start_round());
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use attestor_types::{AttestedReportOne, Epoch};
    use tracing_test::traced_test;

    /// Leader (oracle 1) in epoch 1 with the round-1 query already broadcast.
    fn leader_in_observe() -> (ReportGenerationState, attestor_types::test_utils::TestOracleSet) {
        let (mut state, set) = make_test_state(1);
        state.on_epoch_started(Epoch(1), OracleId(1));
        let ctx = state.context(Round(1));
        state.on_query_completed(ctx, Ok(QUERY.to_vec()));
        (state, set)
    }

    fn observe_all(state: &mut ReportGenerationState, set: &attestor_types::test_utils::TestOracleSet, oracles: &[u8]) {
        for &i in oracles {
            let msg = observe_msg(set, i, Epoch(1), Round(1), QUERY, format!("obs-{i}").as_bytes());
            state.on_observe(OracleId(i), msg).unwrap();
        }
    }

    fn leader_in_report() -> (ReportGenerationState, attestor_types::test_utils::TestOracleSet) {
        let (mut state, set) = leader_in_observe();
        observe_all(&mut state, &set, &[0, 1, 2]);
        state.on_grace_timer();
        (state, set)
    }

    fn leader_commitment(state: &ReportGenerationState) -> Hash {
        state.leader_state.as_ref().unwrap().commitment.unwrap()
    }

    #[test]
    fn test_query_broadcasts_observe_req() {
        let (mut state, _) = make_test_state(1);
        state.on_epoch_started(Epoch(1), OracleId(1));
        let ctx = state.context(Round(1));

        let actions = state.on_query_completed(ctx, Ok(QUERY.to_vec()));
        assert!(matches!(
            &actions[..],
            [Action::Broadcast {
                message: ProtocolMessage::ObserveReq(ObserveReqMessage { round: Round(1), query, .. })
            }] if query == QUERY
        ));
    }

    #[test]
    fn test_stale_query_result_dropped() {
        let (mut state, _) = make_test_state(1);
        state.on_epoch_started(Epoch(1), OracleId(1));
        let stale = state.context(Round(7));
        assert!(state.on_query_completed(stale, Ok(QUERY.to_vec())).is_empty());
    }

    #[traced_test]
    #[test]
    fn test_query_failure_abandons_round() {
        let (mut state, _) = make_test_state(1);
        state.on_epoch_started(Epoch(1), OracleId(1));
        let ctx = state.context(Round(1));

        let actions = state.on_query_completed(ctx, Err(PluginError::DeadlineExceeded(std::time::Duration::from_secs(1))));
        assert!(actions.is_empty());
        assert_eq!(state.leader_state.as_ref().unwrap().phase, LeaderPhase::Abandoned);
        assert!(logs_contain("Query failed, abandoning round"));
    }

    #[test]
    fn test_grace_starts_after_more_than_2f_observations() {
        let (mut state, set) = leader_in_observe();
        observe_all(&mut state, &set, &[0, 2]);
        assert_eq!(state.leader_state.as_ref().unwrap().phase, LeaderPhase::Observe);

        let msg = observe_msg(&set, 3, Epoch(1), Round(1), QUERY, b"obs-3");
        let actions = state.on_observe(OracleId(3), msg).unwrap();
        assert_eq!(state.leader_state.as_ref().unwrap().phase, LeaderPhase::Grace);
        assert!(matches!(
            &actions[..],
            [Action::SetTimer {
                id: TimerId::Grace,
                ..
            }]
        ));
    }

    #[test]
    fn test_observation_admitted_during_grace() {
        let (mut state, set) = leader_in_observe();
        observe_all(&mut state, &set, &[0, 2, 3]);
        observe_all(&mut state, &set, &[1]);
        assert_eq!(state.leader_state.as_ref().unwrap().observations.len(), 4);
    }

    #[test]
    fn test_duplicate_observation_rejected() {
        let (mut state, set) = leader_in_observe();
        observe_all(&mut state, &set, &[0]);
        let again = observe_msg(&set, 0, Epoch(1), Round(1), QUERY, b"other");
        assert_eq!(
            state.check_observe(OracleId(0), &again),
            Err(MessageRejection::Duplicate(OracleId(0)))
        );
    }

    #[test]
    fn test_replayed_observation_rejected_on_round_before_signature() {
        let (mut state, set) = leader_in_observe();
        // Signed for round 5, replayed into a message for round 6. The round
        // check fires first even though the signature is also wrong.
        let mut msg = observe_msg(&set, 0, Epoch(1), Round(5), QUERY, b"obs");
        msg.round = Round(6);
        assert_eq!(
            state.check_observe(OracleId(0), &msg),
            Err(MessageRejection::WrongRound {
                expected: Round(1),
                got: Round(6)
            })
        );

        // Same replay aimed at the right round still fails the signature check.
        msg.round = Round(1);
        assert!(matches!(
            state.check_observe(OracleId(0), &msg),
            Err(MessageRejection::InvalidSignature { signer: OracleId(0), .. })
        ));
        assert!(state.on_observe(OracleId(0), msg).is_err());
        assert!(state.leader_state.as_ref().unwrap().observations.is_empty());
    }

    #[test]
    fn test_observation_signed_by_someone_else_rejected() {
        let (state, set) = leader_in_observe();
        let msg = observe_msg(&set, 2, Epoch(1), Round(1), QUERY, b"obs");
        assert!(matches!(
            state.check_observe(OracleId(0), &msg),
            Err(MessageRejection::InvalidSignature { .. })
        ));
        assert_eq!(
            state.check_observe(OracleId(9), &msg),
            Err(MessageRejection::UnknownSender(OracleId(9)))
        );
    }

    #[test]
    fn test_follower_rejects_observations() {
        let (mut state, set) = make_test_state(0);
        state.on_epoch_started(Epoch(1), OracleId(1));
        let msg = observe_msg(&set, 2, Epoch(1), Round(1), QUERY, b"obs");
        assert_eq!(
            state.check_observe(OracleId(2), &msg),
            Err(MessageRejection::NotLeader { epoch: Epoch(1) })
        );
    }

    #[test]
    fn test_grace_expiry_sends_sorted_report_req() {
        let (mut state, set) = leader_in_observe();
        observe_all(&mut state, &set, &[3, 0, 2]);

        let actions = state.on_grace_timer();
        let [Action::Broadcast {
            message: ProtocolMessage::ReportReq(req),
        }] = &actions[..]
        else {
            panic!("expected a single ReportReq broadcast, got {actions:?}");
        };
        let observers: Vec<_> = req
            .attributed_signed_observations
            .iter()
            .map(|o| o.observer)
            .collect();
        assert_eq!(observers, vec![OracleId(0), OracleId(2), OracleId(3)]);
        assert_eq!(req.query, QUERY.to_vec());
        assert_eq!(
            leader_commitment(&state),
            commitment_of(&req.query, &req.attributed_signed_observations)
        );
    }

    #[test]
    fn test_report_quorum_broadcasts_final() {
        let (mut state, set) = leader_in_report();
        let commitment = leader_commitment(&state);
        let ctx = state.context(Round(1));

        let first = report_msg(&set, 0, &ctx, b"report");
        assert!(state.on_report(OracleId(0), first).unwrap().is_empty());

        let second = report_msg(&set, 2, &ctx, b"report");
        let actions = state.on_report(OracleId(2), second).unwrap();
        let final_msg = actions
            .iter()
            .find_map(|a| match a {
                Action::Broadcast {
                    message: ProtocolMessage::Final(f),
                } => Some(f.clone()),
                _ => None,
            })
            .expect("final broadcast");
        assert_eq!(final_msg.commitment, commitment);
        assert_eq!(final_msg.report.report, b"report".to_vec());
        assert_eq!(final_msg.report.signers(), vec![OracleId(0), OracleId(2)]);
        assert!(final_msg
            .report
            .verify(&ctx, state.topology.as_ref(), 2)
            .is_ok());
        assert_eq!(state.leader_state.as_ref().unwrap().phase, LeaderPhase::Final);
        // Sending final arms the ready flag; the round timer starts round 2.
        assert!(state.leader_state.as_ref().unwrap().ready_to_start_round);
    }

    #[test]
    fn test_skips_never_reach_quorum() {
        let (mut state, set) = leader_in_report();
        let commitment = leader_commitment(&state);
        let ctx = state.context(Round(1));

        for i in [0, 2] {
            let msg = ReportMessage {
                epoch: Epoch(1),
                round: Round(1),
                report: AttestedReportOne::skip(&ctx, &commitment, &set.onchain[i as usize]),
            };
            assert!(state.on_report(OracleId(i), msg).unwrap().is_empty());
        }
        let real = report_msg(&set, 3, &ctx, b"report");
        assert!(state.on_report(OracleId(3), real).unwrap().is_empty());
        assert_eq!(state.leader_state.as_ref().unwrap().phase, LeaderPhase::Report);
    }

    #[test]
    fn test_report_checks() {
        let (mut state, set) = leader_in_report();
        let ctx = state.context(Round(1));

        let msg = report_msg(&set, 0, &ctx, b"report");
        state.on_report(OracleId(0), msg.clone()).unwrap();
        assert_eq!(
            state.check_report(OracleId(0), &msg),
            Err(MessageRejection::Duplicate(OracleId(0)))
        );

        // Signed by oracle 3 but claimed by oracle 2.
        let forged = report_msg(&set, 3, &ctx, b"report");
        assert!(matches!(
            state.check_report(OracleId(2), &forged),
            Err(MessageRejection::InvalidSignature { signer: OracleId(2), .. })
        ));

        let mut stale = report_msg(&set, 2, &ctx, b"report");
        stale.round = Round(0);
        assert!(matches!(
            state.check_report(OracleId(2), &stale),
            Err(MessageRejection::WrongRound { .. })
        ));
    }

    #[test]
    fn test_report_before_report_req_rejected() {
        let (state, set) = leader_in_observe();
        let ctx = state.context(Round(1));
        let msg = report_msg(&set, 0, &ctx, b"report");
        assert_eq!(
            state.check_report(OracleId(0), &msg),
            Err(MessageRejection::WrongPhase { phase: "observe" })
        );
    }

    #[test]
    fn test_round_timer_starts_next_round_after_final() {
        let (mut state, set) = leader_in_report();
        let ctx = state.context(Round(1));
        state.on_report(OracleId(0), report_msg(&set, 0, &ctx, b"r")).unwrap();
        state.on_report(OracleId(2), report_msg(&set, 2, &ctx, b"r")).unwrap();

        let actions = state.on_round_timer();
        assert_eq!(state.leader_round(), Some(Round(2)));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::InvokePlugin {
                call: PluginCall::Query { ctx }
            } if ctx.round == Round(2)
        )));
    }

    #[test]
    fn test_final_after_timer_starts_next_round_immediately() {
        let (mut state, set) = leader_in_report();
        // Timer fired first: arms the flag, round 1 keeps going.
        state.on_round_timer();
        assert_eq!(state.leader_round(), Some(Round(1)));

        let ctx = state.context(Round(1));
        state.on_report(OracleId(0), report_msg(&set, 0, &ctx, b"r")).unwrap();
        let actions = state.on_report(OracleId(2), report_msg(&set, 2, &ctx, b"r")).unwrap();
        assert_eq!(state.leader_round(), Some(Round(2)));
        assert!(actions.iter().any(Action::is_delegated));
    }

    #[traced_test]
    #[test]
    fn test_stuck_round_abandoned_on_second_timer() {
        let (mut state, set) = leader_in_report();
        state.on_round_timer();
        assert_eq!(state.leader_round(), Some(Round(1)));
        state.on_round_timer();
        assert_eq!(state.leader_round(), Some(Round(2)));
        assert!(logs_contain("Abandoning round"));

        // Late attestations for the abandoned round are refused.
        let ctx = ReportContext::new(state.config.config_digest, Epoch(1), Round(1));
        let late = report_msg(&set, 0, &ctx, b"r");
        assert!(matches!(
            state.check_report(OracleId(0), &late),
            Err(MessageRejection::WrongRound { .. })
        ));
    }

    #[traced_test]
    #[test]
    fn test_r_max_halts_and_requests_leader_change() {
        let (mut state, _) = make_test_state_with(1, |c| c.with_r_max(2));
        state.on_epoch_started(Epoch(1), OracleId(1));
        assert_eq!(state.leader_round(), Some(Round(1)));

        state.on_round_timer();
        state.on_round_timer();
        assert_eq!(state.leader_round(), Some(Round(2)));

        state.on_round_timer();
        let actions = state.on_round_timer();
        assert!(state.is_halted());
        assert_eq!(state.leader_round(), Some(Round(2)));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::EnqueueInternal {
                event: Event::ChangeLeader
            }
        )));
        assert!(logs_contain("Round limit reached"));

        // Halted for the rest of the epoch.
        assert!(state.on_round_timer().is_empty());
    }
}
