//! Report generation state machine: epoch lifecycle and message dispatch.
//!
//! Leader and follower handlers live in `leader.rs` and `follower.rs`; this
//! file owns the shared state, future-epoch buffering and event routing.

use crate::buffer::MessageBuffer;
use crate::follower::FollowerState;
use crate::leader::LeaderState;
use crate::MessageRejection;
use attestor_core::{Action, Event, SubStateMachine, TimerId};
use attestor_messages::{ProtocolMessage, SubProtocol};
use attestor_types::signing::{commitment_hash, CommitmentEntry};
use attestor_types::{
    AttributedSignedObservation, Epoch, Hash, OracleId, OracleKeys, ProtocolConfig, ReportContext,
    Round, Topology,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, trace, warn};

/// Report generation for a single oracle.
///
/// Plays the follower role in every epoch and, additionally, the leader role
/// in epochs it leads. Single-threaded: owned by the node state machine and
/// driven only through events.
pub struct ReportGenerationState {
    // ═══════════════════════════════════════════════════════════════════════════
    // Identity
    // ═══════════════════════════════════════════════════════════════════════════
    /// Network topology (single source of truth for the oracle set).
    pub(crate) topology: Arc<dyn Topology>,

    /// Signing keys, shared read-only.
    pub(crate) keys: Arc<OracleKeys>,

    /// Protocol parameters.
    pub(crate) config: ProtocolConfig,

    // ═══════════════════════════════════════════════════════════════════════════
    // Epoch
    // ═══════════════════════════════════════════════════════════════════════════
    /// Current epoch. `Epoch(0)` until the pacemaker starts the first one.
    pub(crate) epoch: Epoch,

    /// Leader of the current epoch.
    pub(crate) leader: OracleId,

    /// Leader-role state; `Some` only in epochs we lead.
    pub(crate) leader_state: Option<LeaderState>,

    /// Follower-role state, reset every epoch.
    pub(crate) follower: FollowerState,

    // ═══════════════════════════════════════════════════════════════════════════
    // Early delivery
    // ═══════════════════════════════════════════════════════════════════════════
    /// Messages tagged with a future epoch, per sender.
    future: BTreeMap<OracleId, MessageBuffer<ProtocolMessage>>,

    /// Current time.
    now: Duration,
}

impl std::fmt::Debug for ReportGenerationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportGenerationState")
            .field("oracle", &self.topology.local_oracle_id())
            .field("epoch", &self.epoch)
            .field("leader", &self.leader)
            .field("leader_state", &self.leader_state)
            .field("follower", &self.follower)
            .field("buffered", &self.buffered_count())
            .finish()
    }
}

impl ReportGenerationState {
    /// Create report generation for the local oracle of `topology`.
    ///
    /// Nothing happens until the first `EpochStarted` event.
    pub fn new(topology: Arc<dyn Topology>, keys: Arc<OracleKeys>, config: ProtocolConfig) -> Self {
        let leader = topology.local_oracle_id();
        Self {
            topology,
            keys,
            config,
            epoch: Epoch(0),
            leader,
            leader_state: None,
            follower: FollowerState::default(),
            future: BTreeMap::new(),
            now: Duration::ZERO,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Public API
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn leader(&self) -> OracleId {
        self.leader
    }

    /// Check if the local oracle leads the current epoch.
    pub fn is_leader(&self) -> bool {
        self.leader_state.is_some()
    }

    /// The round the leader is running, if we lead this epoch.
    pub fn leader_round(&self) -> Option<Round> {
        self.leader_state.as_ref().map(|l| l.round)
    }

    /// Whether round initiation stopped because `r_max` was reached.
    pub fn is_halted(&self) -> bool {
        self.leader_state.as_ref().is_some_and(|l| l.halted)
    }

    /// The latest round this oracle participated in as a follower.
    pub fn follower_round(&self) -> Round {
        self.follower.round
    }

    /// Highest round finalized in the current epoch.
    pub fn highest_finalized(&self) -> Option<Round> {
        self.follower.finalized
    }

    /// Total messages held for future epochs.
    pub fn buffered_count(&self) -> usize {
        self.future.values().map(MessageBuffer::len).sum()
    }

    /// The context of `round` in the current epoch.
    pub fn context(&self, round: Round) -> ReportContext {
        ReportContext::new(self.config.config_digest, self.epoch, round)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Epoch lifecycle
    // ═══════════════════════════════════════════════════════════════════════════

    /// The pacemaker moved to `epoch` led by `leader`.
    ///
    /// Resets both roles, starts round 1 if we lead, and replays buffered
    /// messages for the new epoch.
    #[instrument(level = "debug", skip(self), fields(old_epoch = self.epoch.0))]
    pub fn on_epoch_started(&mut self, epoch: Epoch, leader: OracleId) -> Vec<Action> {
        if epoch <= self.epoch {
            trace!(epoch = epoch.0, "Ignoring start of an epoch we are already past");
            return vec![];
        }

        let is_leader = leader == self.topology.local_oracle_id();
        self.epoch = epoch;
        self.leader = leader;
        self.follower = FollowerState::default();
        self.leader_state = is_leader.then(|| LeaderState::new(self.config.report_quorum));

        info!(
            epoch = epoch.0,
            leader = leader.0,
            is_leader,
            "Report generation entering epoch"
        );

        let mut actions = vec![
            Action::CancelTimer { id: TimerId::Round },
            Action::CancelTimer { id: TimerId::Grace },
        ];

        if is_leader {
            actions.push(Action::SetTimer {
                id: TimerId::Round,
                duration: self.config.delta_round,
            });
            // First call arms the ready flag, second starts round 1.
            actions.extend(self.start_round());
            actions.extend(self.start_round());
        }

        actions.extend(self.replay_buffered());
        actions
    }

    fn replay_buffered(&mut self) -> Vec<Action> {
        let buffered = std::mem::take(&mut self.future);
        let mut actions = Vec::new();
        for (sender, mut buffer) in buffered {
            while let Some(message) = buffer.pop() {
                if message.epoch() < self.epoch {
                    trace!(sender = sender.0, msg_type = message.type_name(), "Dropping buffered message for skipped epoch");
                    continue;
                }
                actions.extend(self.on_message(sender, message));
            }
        }
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Message dispatch
    // ═══════════════════════════════════════════════════════════════════════════

    /// Handle a report generation message from `sender`.
    ///
    /// Future-epoch messages are buffered, past-epoch messages dropped, and
    /// every rejection is logged and absorbed here.
    pub fn on_message(&mut self, sender: OracleId, message: ProtocolMessage) -> Vec<Action> {
        let msg_epoch = message.epoch();
        if msg_epoch > self.epoch {
            self.buffer_future(sender, message);
            return vec![];
        }

        let msg_type = message.type_name();
        let round = message.round();
        let result = if msg_epoch < self.epoch {
            Err(MessageRejection::WrongEpoch {
                expected: self.epoch,
                got: msg_epoch,
            })
        } else {
            match message {
                ProtocolMessage::ObserveReq(msg) => self.on_observe_req(sender, msg),
                ProtocolMessage::Observe(msg) => self.on_observe(sender, msg),
                ProtocolMessage::ReportReq(msg) => self.on_report_req(sender, msg),
                ProtocolMessage::Report(msg) => self.on_report(sender, msg),
                ProtocolMessage::Final(msg) => self.on_final(sender, msg),
                ProtocolMessage::FinalEcho(msg) => self.on_final_echo(sender, msg),
                // Routed elsewhere.
                ProtocolMessage::NewEpoch(_)
                | ProtocolMessage::CommitVote(_)
                | ProtocolMessage::EpochStart(_)
                | ProtocolMessage::EpochStartProof(_) => Ok(vec![]),
            }
        };

        match result {
            Ok(actions) => actions,
            Err(rejection) => {
                self.log_rejection(sender, msg_type, msg_epoch, round, &rejection);
                vec![]
            }
        }
    }

    fn buffer_future(&mut self, sender: OracleId, message: ProtocolMessage) {
        if !self.topology.contains(sender) {
            warn!(
                sender = sender.0,
                msg_type = message.type_name(),
                "Dropping future-epoch message from unknown oracle"
            );
            return;
        }
        trace!(
            sender = sender.0,
            msg_type = message.type_name(),
            msg_epoch = message.epoch().0,
            epoch = self.epoch.0,
            "Buffering message for future epoch"
        );
        let capacity = self.config.message_buffer_capacity;
        let buffer = self
            .future
            .entry(sender)
            .or_insert_with(|| MessageBuffer::new(capacity));
        if let Some(evicted) = buffer.push(message) {
            debug!(
                sender = sender.0,
                evicted = evicted.type_name(),
                evicted_epoch = evicted.epoch().0,
                "Future-epoch buffer full, evicted oldest message"
            );
        }
    }

    fn log_rejection(
        &self,
        sender: OracleId,
        msg_type: &'static str,
        msg_epoch: Epoch,
        round: Option<Round>,
        rejection: &MessageRejection,
    ) {
        if rejection.is_suspicious() {
            warn!(
                sender = sender.0,
                msg_type,
                epoch = msg_epoch.0,
                round = ?round,
                reason = %rejection,
                "Rejected message"
            );
        } else {
            debug!(
                sender = sender.0,
                msg_type,
                epoch = msg_epoch.0,
                round = ?round,
                reason = %rejection,
                "Rejected message"
            );
        }
    }
}

/// Commitment hash over a round's query and its collated observations.
///
/// `observations` must be sorted by observer.
pub(crate) fn commitment_of(query: &[u8], observations: &[AttributedSignedObservation]) -> Hash {
    commitment_hash(
        query,
        observations.iter().map(|aso| CommitmentEntry {
            observer: aso.observer.0,
            observation: &aso.signed_observation.observation,
            signature: &aso.signed_observation.signature.0,
        }),
    )
}

impl SubStateMachine for ReportGenerationState {
    fn try_handle(&mut self, event: &Event) -> Option<Vec<Action>> {
        match event {
            Event::EpochStarted { epoch, leader } => Some(self.on_epoch_started(*epoch, *leader)),
            Event::RoundTimer => Some(self.on_round_timer()),
            Event::GraceTimer => Some(self.on_grace_timer()),
            Event::MessageReceived { sender, message }
                if message.destination() == SubProtocol::ReportGeneration =>
            {
                Some(self.on_message(*sender, message.clone()))
            }
            Event::QueryCompleted { ctx, result } => {
                Some(self.on_query_completed(*ctx, result.clone()))
            }
            Event::ObservationCompleted { ctx, result } => {
                Some(self.on_observation_completed(*ctx, result.clone()))
            }
            Event::ReportCompleted { ctx, result } => {
                Some(self.on_report_completed(*ctx, result.clone()))
            }
            _ => None,
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use attestor_core::PluginCall;
    use attestor_messages::{NewEpochMessage, ObserveReqMessage};
    use tracing_test::traced_test;

    #[test]
    fn test_leader_starts_round_one_on_epoch_start() {
        let (mut state, _) = make_test_state(1);
        let actions = state.on_epoch_started(Epoch(1), OracleId(1));

        assert!(state.is_leader());
        assert_eq!(state.leader_round(), Some(Round(1)));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::InvokePlugin {
                call: PluginCall::Query { ctx }
            } if ctx.round == Round(1) && ctx.epoch == Epoch(1)
        )));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::SetTimer {
                id: TimerId::Round,
                ..
            }
        )));
    }

    #[test]
    fn test_follower_does_not_start_rounds() {
        let (mut state, _) = make_test_state(0);
        let actions = state.on_epoch_started(Epoch(1), OracleId(1));
        assert!(!state.is_leader());
        assert!(!actions.iter().any(Action::is_delegated));
    }

    #[test]
    fn test_old_epoch_start_ignored() {
        let (mut state, _) = make_test_state(0);
        state.on_epoch_started(Epoch(3), OracleId(3));
        assert!(state.on_epoch_started(Epoch(2), OracleId(2)).is_empty());
        assert_eq!(state.epoch(), Epoch(3));
    }

    #[test]
    fn test_future_epoch_messages_buffered_and_replayed() {
        let (mut state, _) = make_test_state(0);
        state.on_epoch_started(Epoch(1), OracleId(1));

        let observe_req = ProtocolMessage::ObserveReq(ObserveReqMessage {
            epoch: Epoch(2),
            round: Round(1),
            query: b"q".to_vec(),
        });
        assert!(state.on_message(OracleId(2), observe_req).is_empty());
        assert_eq!(state.buffered_count(), 1);

        let actions = state.on_epoch_started(Epoch(2), OracleId(2));
        assert_eq!(state.buffered_count(), 0);
        assert_eq!(state.follower_round(), Round(1));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::InvokePlugin {
                call: PluginCall::Observation { .. }
            }
        )));
    }

    #[test]
    fn test_future_buffer_is_bounded_per_sender() {
        let (mut state, _) = make_test_state(0);
        state.on_epoch_started(Epoch(1), OracleId(1));

        let capacity = state.config.message_buffer_capacity;
        for round in 0..(capacity as u8 + 5) {
            state.on_message(
                OracleId(2),
                ProtocolMessage::ObserveReq(ObserveReqMessage {
                    epoch: Epoch(9),
                    round: Round(round),
                    query: vec![],
                }),
            );
        }
        assert_eq!(state.buffered_count(), capacity);

        // Unknown senders never get a buffer.
        state.on_message(
            OracleId(42),
            ProtocolMessage::ObserveReq(ObserveReqMessage {
                epoch: Epoch(9),
                round: Round(1),
                query: vec![],
            }),
        );
        assert_eq!(state.buffered_count(), capacity);
    }

    #[traced_test]
    #[test]
    fn test_past_epoch_messages_dropped() {
        let (mut state, _) = make_test_state(0);
        state.on_epoch_started(Epoch(3), OracleId(3));

        let actions = state.on_message(
            OracleId(1),
            ProtocolMessage::ObserveReq(ObserveReqMessage {
                epoch: Epoch(1),
                round: Round(1),
                query: vec![],
            }),
        );
        assert!(actions.is_empty());
        assert_eq!(state.buffered_count(), 0);
        assert!(logs_contain("Rejected message"));
    }

    #[test]
    fn test_new_epoch_is_not_ours() {
        let (mut state, _) = make_test_state(0);
        let event = Event::MessageReceived {
            sender: OracleId(1),
            message: ProtocolMessage::NewEpoch(NewEpochMessage { epoch: Epoch(2) }),
        };
        assert!(state.try_handle(&event).is_none());
    }
}
