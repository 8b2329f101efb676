//! Follower role: observe, attest, and accept finalized reports.

use crate::state::{commitment_of, ReportGenerationState};
use crate::MessageRejection;
use attestor_core::{Action, Event, PluginCall, PluginError};
use attestor_messages::{
    FinalEchoMessage, FinalMessage, ObserveMessage, ObserveReqMessage, ProtocolMessage,
    ReportMessage, ReportReqMessage,
};
use attestor_types::{
    AttestedReportOne, AttributedSignedObservation, Hash, OracleId, ReportContext, Round,
    SignedObservation,
};
use tracing::{debug, info, instrument, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum FollowerPhase {
    #[default]
    Idle,
    Observe,
    Report,
    Final,
}

impl FollowerPhase {
    pub fn name(self) -> &'static str {
        match self {
            FollowerPhase::Idle => "idle",
            FollowerPhase::Observe => "observe",
            FollowerPhase::Report => "report",
            FollowerPhase::Final => "final",
        }
    }
}

/// Per-epoch follower state.
#[derive(Debug, Default)]
pub(crate) struct FollowerState {
    /// Latest round we took part in. Strictly increasing within an epoch.
    pub round: Round,
    pub phase: FollowerPhase,
    /// Query of `round`, as sent by the leader.
    pub query: Vec<u8>,
    /// Commitment hash of `round`, once its `ReportReq` was validated.
    pub commitment: Option<Hash>,
    /// Highest finalized round. Each round is finalized at most once.
    pub finalized: Option<Round>,
}

impl ReportGenerationState {
    fn check_from_leader(&self, sender: OracleId) -> Result<(), MessageRejection> {
        if sender != self.leader {
            return Err(MessageRejection::NotFromLeader {
                sender,
                leader: self.leader,
            });
        }
        Ok(())
    }

    fn check_round_in_range(&self, round: Round) -> Result<(), MessageRejection> {
        if round == Round::ZERO || round.0 > self.config.r_max {
            return Err(MessageRejection::RoundOutOfRange {
                round,
                r_max: self.config.r_max,
            });
        }
        Ok(())
    }

    fn check_length(field: &'static str, len: usize, max: usize) -> Result<(), MessageRejection> {
        if len > max {
            return Err(MessageRejection::Oversize { field, len, max });
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Observe
    // ═══════════════════════════════════════════════════════════════════════════

    #[instrument(level = "trace", skip(self, msg), fields(epoch = self.epoch.0, sender = sender.0))]
    pub(crate) fn on_observe_req(
        &mut self,
        sender: OracleId,
        msg: ObserveReqMessage,
    ) -> Result<Vec<Action>, MessageRejection> {
        self.check_from_leader(sender)?;
        if msg.epoch != self.epoch {
            return Err(MessageRejection::WrongEpoch {
                expected: self.epoch,
                got: msg.epoch,
            });
        }
        self.check_round_in_range(msg.round)?;
        if msg.round <= self.follower.round {
            return Err(MessageRejection::StaleRound {
                current: self.follower.round,
                got: msg.round,
            });
        }
        Self::check_length("query", msg.query.len(), self.config.max_query_length)?;

        self.follower.round = msg.round;
        self.follower.phase = FollowerPhase::Observe;
        self.follower.query = msg.query.clone();
        self.follower.commitment = None;
        trace!(round = msg.round.0, "Observing");

        Ok(vec![Action::InvokePlugin {
            call: PluginCall::Observation {
                ctx: self.context(msg.round),
                query: msg.query,
            },
        }])
    }

    /// The plugin produced (or failed to produce) our observation.
    pub fn on_observation_completed(
        &mut self,
        ctx: ReportContext,
        result: Result<Vec<u8>, PluginError>,
    ) -> Vec<Action> {
        if ctx != self.context(self.follower.round) || self.follower.phase != FollowerPhase::Observe
        {
            debug!(%ctx, phase = self.follower.phase.name(), "Dropping stale observation result");
            return vec![];
        }

        let observation = match result {
            Ok(observation) if observation.len() <= self.config.max_observation_length => {
                observation
            }
            Ok(observation) => {
                warn!(
                    epoch = ctx.epoch.0,
                    round = ctx.round.0,
                    len = observation.len(),
                    max = self.config.max_observation_length,
                    "Plugin observation too long, skipping round"
                );
                self.follower.phase = FollowerPhase::Idle;
                return vec![];
            }
            Err(e) => {
                warn!(
                    epoch = ctx.epoch.0,
                    round = ctx.round.0,
                    error = %e,
                    "Observation failed, abandoning round"
                );
                self.follower.phase = FollowerPhase::Idle;
                return vec![];
            }
        };

        let keys = &self.keys;
        let signed = SignedObservation::sign(&ctx, &self.follower.query, observation, |message| {
            keys.offchain.sign(message)
        });
        vec![Action::SendTo {
            recipient: self.leader,
            message: ProtocolMessage::Observe(ObserveMessage {
                epoch: ctx.epoch,
                round: ctx.round,
                signed_observation: signed,
            }),
        }]
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Report
    // ═══════════════════════════════════════════════════════════════════════════

    /// Check a `ReportReq` from `sender` and return its commitment hash.
    ///
    /// Every embedded observation must come from a distinct known oracle, in
    /// ascending observer order, and verify against the leader's query.
    pub fn check_report_req(
        &self,
        sender: OracleId,
        msg: &ReportReqMessage,
    ) -> Result<Hash, MessageRejection> {
        self.check_from_leader(sender)?;
        if msg.epoch != self.epoch {
            return Err(MessageRejection::WrongEpoch {
                expected: self.epoch,
                got: msg.epoch,
            });
        }
        self.check_round_in_range(msg.round)?;
        if msg.round < self.follower.round {
            return Err(MessageRejection::StaleRound {
                current: self.follower.round,
                got: msg.round,
            });
        }
        if msg.round == self.follower.round
            && matches!(self.follower.phase, FollowerPhase::Report | FollowerPhase::Final)
        {
            return Err(MessageRejection::WrongPhase {
                phase: self.follower.phase.name(),
            });
        }
        Self::check_length("query", msg.query.len(), self.config.max_query_length)?;

        let observations = &msg.attributed_signed_observations;
        let min = 2 * self.topology.f();
        if observations.len() <= min {
            return Err(MessageRejection::InsufficientObservations {
                got: observations.len(),
                min,
            });
        }
        if observations.windows(2).any(|w| w[0].observer >= w[1].observer) {
            return Err(MessageRejection::UnorderedObservations);
        }

        let ctx = self.context(msg.round);
        for aso in observations {
            let public_key = self
                .topology
                .offchain_public_key(aso.observer)
                .ok_or(MessageRejection::UnknownSender(aso.observer))?;
            Self::check_length(
                "observation",
                aso.signed_observation.observation.len(),
                self.config.max_observation_length,
            )?;
            aso.signed_observation
                .verify(&ctx, &msg.query, &public_key)
                .map_err(|source| MessageRejection::InvalidSignature {
                    signer: aso.observer,
                    source,
                })?;
        }

        Ok(commitment_of(&msg.query, observations))
    }

    #[instrument(level = "trace", skip(self, msg), fields(epoch = self.epoch.0, sender = sender.0))]
    pub(crate) fn on_report_req(
        &mut self,
        sender: OracleId,
        msg: ReportReqMessage,
    ) -> Result<Vec<Action>, MessageRejection> {
        let commitment = self.check_report_req(sender, &msg)?;

        self.follower.round = msg.round;
        self.follower.phase = FollowerPhase::Report;
        self.follower.query = msg.query.clone();
        self.follower.commitment = Some(commitment);
        trace!(round = msg.round.0, commitment = %commitment, "Generating report");

        let observations = msg
            .attributed_signed_observations
            .iter()
            .map(AttributedSignedObservation::to_attributed)
            .collect();
        Ok(vec![Action::InvokePlugin {
            call: PluginCall::Report {
                ctx: self.context(msg.round),
                query: msg.query,
                observations,
            },
        }])
    }

    /// The plugin produced (or failed to produce) the report for a round.
    ///
    /// `Ok(None)` means the plugin declined to report; we answer with a skip
    /// vote bound to the commitment hash.
    pub fn on_report_completed(
        &mut self,
        ctx: ReportContext,
        result: Result<Option<Vec<u8>>, PluginError>,
    ) -> Vec<Action> {
        let commitment = match self.follower.commitment {
            Some(commitment)
                if ctx == self.context(self.follower.round)
                    && self.follower.phase == FollowerPhase::Report =>
            {
                commitment
            }
            _ => {
                debug!(%ctx, phase = self.follower.phase.name(), "Dropping stale report result");
                return vec![];
            }
        };

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                warn!(
                    epoch = ctx.epoch.0,
                    round = ctx.round.0,
                    error = %e,
                    "Report generation failed, abandoning round"
                );
                return vec![];
            }
        };

        match report {
            Some(report) if report.len() > self.config.max_report_length => {
                warn!(
                    epoch = ctx.epoch.0,
                    round = ctx.round.0,
                    len = report.len(),
                    max = self.config.max_report_length,
                    "Plugin report too long, not attesting"
                );
                vec![]
            }
            Some(report) => {
                trace!(round = ctx.round.0, "Attesting report");
                vec![Action::SendTo {
                    recipient: self.leader,
                    message: ProtocolMessage::Report(ReportMessage {
                        epoch: ctx.epoch,
                        round: ctx.round,
                        report: AttestedReportOne::attest(&ctx, report, &self.keys.onchain),
                    }),
                }]
            }
            None => {
                debug!(epoch = ctx.epoch.0, round = ctx.round.0, "Plugin declined, voting to skip");
                vec![
                    Action::SendTo {
                        recipient: self.leader,
                        message: ProtocolMessage::Report(ReportMessage {
                            epoch: ctx.epoch,
                            round: ctx.round,
                            report: AttestedReportOne::skip(&ctx, &commitment, &self.keys.onchain),
                        }),
                    },
                    Action::EnqueueInternal {
                        event: Event::Progress,
                    },
                ]
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Final
    // ═══════════════════════════════════════════════════════════════════════════

    /// Check a finalized report, whether sent by the leader or echoed.
    pub fn check_final(&self, msg: &FinalMessage) -> Result<(), MessageRejection> {
        if msg.epoch != self.epoch {
            return Err(MessageRejection::WrongEpoch {
                expected: self.epoch,
                got: msg.epoch,
            });
        }
        self.check_round_in_range(msg.round)?;
        if self.follower.finalized.is_some_and(|done| msg.round <= done) {
            return Err(MessageRejection::AlreadyFinalized(msg.round));
        }
        if msg.round == self.follower.round {
            if let Some(local) = self.follower.commitment {
                if local != msg.commitment {
                    return Err(MessageRejection::CommitmentMismatch);
                }
            }
        }
        Self::check_length("report", msg.report.report.len(), self.config.max_report_length)?;
        msg.report.verify(
            &self.context(msg.round),
            self.topology.as_ref(),
            self.config.report_quorum,
        )?;
        Ok(())
    }

    #[instrument(level = "trace", skip(self, msg), fields(epoch = self.epoch.0, sender = sender.0))]
    pub(crate) fn on_final(
        &mut self,
        sender: OracleId,
        msg: FinalMessage,
    ) -> Result<Vec<Action>, MessageRejection> {
        self.check_from_leader(sender)?;
        self.check_final(&msg)?;
        Ok(self.accept_final(msg, "leader"))
    }

    #[instrument(level = "trace", skip(self, msg), fields(epoch = self.epoch.0, sender = sender.0))]
    pub(crate) fn on_final_echo(
        &mut self,
        sender: OracleId,
        msg: FinalEchoMessage,
    ) -> Result<Vec<Action>, MessageRejection> {
        if !self.topology.contains(sender) {
            return Err(MessageRejection::UnknownSender(sender));
        }
        self.check_final(&msg.final_message)?;
        Ok(self.accept_final(msg.final_message, "echo"))
    }

    fn accept_final(&mut self, msg: FinalMessage, via: &'static str) -> Vec<Action> {
        self.follower.finalized = Some(msg.round);
        if msg.round >= self.follower.round {
            self.follower.round = msg.round;
            self.follower.phase = FollowerPhase::Final;
        }

        let ctx = self.context(msg.round);
        info!(
            epoch = ctx.epoch.0,
            round = ctx.round.0,
            signers = msg.report.attributed_signatures.len(),
            via,
            "Report finalized"
        );

        let report = msg.report.clone();
        vec![
            Action::Broadcast {
                message: ProtocolMessage::FinalEcho(FinalEchoMessage { final_message: msg }),
            },
            Action::EnqueueInternal {
                event: Event::Progress,
            },
            Action::EnqueueInternal {
                event: Event::ReportFinalized { ctx, report },
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use attestor_types::test_utils::TestOracleSet;
    use attestor_types::{AttestedReportMany, AttributedOnchainSignature, Epoch};
    use tracing_test::traced_test;

    /// Follower (oracle 0) in epoch 1, led by oracle 1.
    fn follower() -> (ReportGenerationState, TestOracleSet) {
        let (mut state, set) = make_test_state(0);
        state.on_epoch_started(Epoch(1), OracleId(1));
        (state, set)
    }

    fn observe_req(round: u8) -> ObserveReqMessage {
        ObserveReqMessage {
            epoch: Epoch(1),
            round: Round(round),
            query: QUERY.to_vec(),
        }
    }

    fn report_req(set: &TestOracleSet, round: u8, observers: &[u8]) -> ReportReqMessage {
        ReportReqMessage {
            epoch: Epoch(1),
            round: Round(round),
            query: QUERY.to_vec(),
            attributed_signed_observations: observers
                .iter()
                .map(|&i| AttributedSignedObservation {
                    signed_observation: observe_msg(set, i, Epoch(1), Round(round), QUERY, &[i])
                        .signed_observation,
                    observer: OracleId(i),
                })
                .collect(),
        }
    }

    fn certified(set: &TestOracleSet, ctx: &ReportContext, report: &[u8], signers: &[u8]) -> AttestedReportMany {
        AttestedReportMany {
            report: report.to_vec(),
            attributed_signatures: signers
                .iter()
                .map(|&i| AttributedOnchainSignature {
                    signer: OracleId(i),
                    signature: report_msg(set, i, ctx, report).report.signature,
                })
                .collect(),
        }
    }

    /// Follower that validated the round-1 `ReportReq`.
    fn follower_in_report() -> (ReportGenerationState, TestOracleSet, Hash) {
        let (mut state, set) = follower();
        state.on_observe_req(OracleId(1), observe_req(1)).unwrap();
        let req = report_req(&set, 1, &[0, 1, 2]);
        state.on_report_req(OracleId(1), req).unwrap();
        let commitment = state.follower.commitment.unwrap();
        (state, set, commitment)
    }

    #[test]
    fn test_observe_req_invokes_observation() {
        let (mut state, _) = follower();
        let actions = state.on_observe_req(OracleId(1), observe_req(1)).unwrap();
        assert!(matches!(
            &actions[..],
            [Action::InvokePlugin {
                call: PluginCall::Observation { ctx, query }
            }] if ctx.round == Round(1) && query == QUERY
        ));
        assert_eq!(state.follower_round(), Round(1));
    }

    #[test]
    fn test_observe_req_checks() {
        let (mut state, _) = follower();
        assert_eq!(
            state.on_observe_req(OracleId(2), observe_req(1)).unwrap_err(),
            MessageRejection::NotFromLeader {
                sender: OracleId(2),
                leader: OracleId(1)
            }
        );

        state.on_observe_req(OracleId(1), observe_req(3)).unwrap();
        assert_eq!(
            state.on_observe_req(OracleId(1), observe_req(3)).unwrap_err(),
            MessageRejection::StaleRound {
                current: Round(3),
                got: Round(3)
            }
        );
        assert!(matches!(
            state.on_observe_req(OracleId(1), observe_req(200)).unwrap_err(),
            MessageRejection::RoundOutOfRange { .. }
        ));
    }

    #[test]
    fn test_observation_is_signed_and_sent_to_leader() {
        let (mut state, set) = follower();
        state.on_observe_req(OracleId(1), observe_req(1)).unwrap();
        let ctx = state.context(Round(1));

        let actions = state.on_observation_completed(ctx, Ok(b"42".to_vec()));
        let [Action::SendTo {
            recipient,
            message: ProtocolMessage::Observe(observe),
        }] = &actions[..]
        else {
            panic!("expected Observe to leader, got {actions:?}");
        };
        assert_eq!(*recipient, OracleId(1));
        assert!(observe
            .signed_observation
            .verify(&ctx, QUERY, &set.offchain[0].public_key())
            .is_ok());
    }

    #[test]
    fn test_observation_for_old_round_dropped() {
        let (mut state, _) = follower();
        state.on_observe_req(OracleId(1), observe_req(1)).unwrap();
        let old = state.context(Round(1));
        state.on_observe_req(OracleId(1), observe_req(2)).unwrap();
        assert!(state.on_observation_completed(old, Ok(b"42".to_vec())).is_empty());
    }

    #[traced_test]
    #[test]
    fn test_observation_failure_logged() {
        let (mut state, _) = follower();
        state.on_observe_req(OracleId(1), observe_req(1)).unwrap();
        let ctx = state.context(Round(1));
        let actions =
            state.on_observation_completed(ctx, Err(PluginError::Failed("feed down".into())));
        assert!(actions.is_empty());
        assert!(logs_contain("Observation failed"));
    }

    #[test]
    fn test_report_req_invokes_report_with_observations() {
        let (mut state, set) = follower();
        let req = report_req(&set, 1, &[0, 1, 3]);
        let expected = commitment_of(&req.query, &req.attributed_signed_observations);

        // A follower that missed the ObserveReq can still attest.
        let actions = state.on_report_req(OracleId(1), req).unwrap();
        let [Action::InvokePlugin {
            call: PluginCall::Report { observations, .. },
        }] = &actions[..]
        else {
            panic!("expected report call, got {actions:?}");
        };
        let observers: Vec<_> = observations.iter().map(|o| o.observer).collect();
        assert_eq!(observers, vec![OracleId(0), OracleId(1), OracleId(3)]);
        assert_eq!(state.follower.commitment, Some(expected));
    }

    #[test]
    fn test_report_req_validation() {
        let (state, set) = follower();

        let too_few = report_req(&set, 1, &[0, 1]);
        assert_eq!(
            state.check_report_req(OracleId(1), &too_few),
            Err(MessageRejection::InsufficientObservations { got: 2, min: 2 })
        );

        let unordered = report_req(&set, 1, &[2, 0, 1]);
        assert_eq!(
            state.check_report_req(OracleId(1), &unordered),
            Err(MessageRejection::UnorderedObservations)
        );

        let duplicated = report_req(&set, 1, &[0, 0, 1]);
        assert_eq!(
            state.check_report_req(OracleId(1), &duplicated),
            Err(MessageRejection::UnorderedObservations)
        );

        let mut tampered = report_req(&set, 1, &[0, 1, 2]);
        tampered.attributed_signed_observations[1]
            .signed_observation
            .observation = b"tampered".to_vec();
        assert!(matches!(
            state.check_report_req(OracleId(1), &tampered),
            Err(MessageRejection::InvalidSignature { signer: OracleId(1), .. })
        ));

        let mut wrong_query = report_req(&set, 1, &[0, 1, 2]);
        wrong_query.query = b"other".to_vec();
        assert!(matches!(
            state.check_report_req(OracleId(1), &wrong_query),
            Err(MessageRejection::InvalidSignature { .. })
        ));

        let from_peer = report_req(&set, 1, &[0, 1, 2]);
        assert!(matches!(
            state.check_report_req(OracleId(3), &from_peer),
            Err(MessageRejection::NotFromLeader { .. })
        ));
    }

    #[test]
    fn test_attestation_signs_report() {
        let (mut state, set, commitment) = follower_in_report();
        let ctx = state.context(Round(1));

        let actions = state.on_report_completed(ctx, Ok(Some(b"price=42".to_vec())));
        let [Action::SendTo {
            recipient: OracleId(1),
            message: ProtocolMessage::Report(msg),
        }] = &actions[..]
        else {
            panic!("expected Report to leader, got {actions:?}");
        };
        assert!(!msg.report.skip);
        assert!(msg
            .report
            .verify(&ctx, &commitment, &set.onchain[0].public_key())
            .is_ok());
    }

    #[test]
    fn test_skip_vote_emits_progress() {
        let (mut state, set, commitment) = follower_in_report();
        let ctx = state.context(Round(1));

        let actions = state.on_report_completed(ctx, Ok(None));
        assert_eq!(actions.len(), 2);
        let Action::SendTo {
            message: ProtocolMessage::Report(msg),
            ..
        } = &actions[0]
        else {
            panic!("expected skip vote");
        };
        assert!(msg.report.skip);
        assert!(msg
            .report
            .verify(&ctx, &commitment, &set.onchain[0].public_key())
            .is_ok());
        assert!(matches!(
            actions[1],
            Action::EnqueueInternal {
                event: Event::Progress
            }
        ));
    }

    #[test]
    fn test_final_accepted_once() {
        let (mut state, set, commitment) = follower_in_report();
        let ctx = state.context(Round(1));
        let msg = FinalMessage {
            epoch: Epoch(1),
            round: Round(1),
            commitment,
            report: certified(&set, &ctx, b"r", &[0, 2]),
        };

        let actions = state.on_final(OracleId(1), msg.clone()).unwrap();
        assert!(matches!(
            &actions[..],
            [
                Action::Broadcast {
                    message: ProtocolMessage::FinalEcho(_)
                },
                Action::EnqueueInternal {
                    event: Event::Progress
                },
                Action::EnqueueInternal {
                    event: Event::ReportFinalized { .. }
                },
            ]
        ));
        assert_eq!(state.highest_finalized(), Some(Round(1)));

        // The echo of the same round is absorbed.
        let echo = FinalEchoMessage { final_message: msg };
        assert_eq!(
            state.on_final_echo(OracleId(2), echo).unwrap_err(),
            MessageRejection::AlreadyFinalized(Round(1))
        );
    }

    #[test]
    fn test_final_rejections() {
        let (state, set, commitment) = follower_in_report();
        let ctx = state.context(Round(1));

        let mismatch = FinalMessage {
            epoch: Epoch(1),
            round: Round(1),
            commitment: Hash::from_bytes(b"other"),
            report: certified(&set, &ctx, b"r", &[0, 2]),
        };
        assert_eq!(state.check_final(&mismatch), Err(MessageRejection::CommitmentMismatch));

        let short = FinalMessage {
            epoch: Epoch(1),
            round: Round(1),
            commitment,
            report: certified(&set, &ctx, b"r", &[2]),
        };
        assert!(matches!(
            state.check_final(&short),
            Err(MessageRejection::InvalidCertificate(_))
        ));

        // Signatures for a different report bytes do not certify this one.
        let mut swapped = certified(&set, &ctx, b"r", &[0, 2]);
        swapped.report = b"s".to_vec();
        let forged = FinalMessage {
            epoch: Epoch(1),
            round: Round(1),
            commitment,
            report: swapped,
        };
        assert!(matches!(
            state.check_final(&forged),
            Err(MessageRejection::InvalidCertificate(_))
        ));
    }

    #[test]
    fn test_final_echo_from_any_oracle_without_local_commitment() {
        let (mut state, set) = follower();
        // Never saw round 2 locally; the echo still finalizes it.
        let ctx = state.context(Round(2));
        let echo = FinalEchoMessage {
            final_message: FinalMessage {
                epoch: Epoch(1),
                round: Round(2),
                commitment: Hash::from_bytes(b"unknown"),
                report: certified(&set, &ctx, b"r", &[1, 2, 3]),
            },
        };
        let actions = state.on_final_echo(OracleId(3), echo).unwrap();
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::EnqueueInternal {
                event: Event::ReportFinalized { ctx, .. }
            } if ctx.round == Round(2)
        )));
        assert_eq!(state.highest_finalized(), Some(Round(2)));
        assert_eq!(state.follower_round(), Round(2));
    }

    #[test]
    fn test_final_not_from_leader_rejected() {
        let (mut state, set, commitment) = follower_in_report();
        let ctx = state.context(Round(1));
        let msg = FinalMessage {
            epoch: Epoch(1),
            round: Round(1),
            commitment,
            report: certified(&set, &ctx, b"r", &[0, 2]),
        };
        assert!(matches!(
            state.on_final(OracleId(3), msg).unwrap_err(),
            MessageRejection::NotFromLeader { .. }
        ));
    }
}
