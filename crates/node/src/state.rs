//! Oracle state machine.

use crate::certified::CertifiedState;
use attestor_core::{Action, Event, RecoveredState, StateMachine, SubStateMachine};
use attestor_messages::SubProtocol;
use attestor_pacemaker::PacemakerState;
use attestor_reporting::ReportGenerationState;
use attestor_transmission::TransmissionState;
use attestor_types::{
    ConfigError, MessageLimits, OracleId, OracleKeys, ProtocolConfig, Topology, TopologyError,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{instrument, warn};

/// Errors building an [`OracleStateMachine`].
#[derive(Debug, Error)]
pub enum NodeConfigError {
    #[error("invalid protocol config: {0}")]
    Protocol(#[from] ConfigError),

    #[error("invalid oracle set: {0}")]
    Topology(#[from] TopologyError),

    #[error("local offchain key does not match the oracle set entry for {0}")]
    OffchainKeyMismatch(OracleId),

    #[error("local on-chain key does not match the oracle set entry for {0}")]
    OnchainKeyMismatch(OracleId),

    #[error("oracle set tolerates {topology} faults but the config expects {config}")]
    FaultToleranceMismatch { topology: usize, config: usize },
}

/// Combined oracle state machine.
///
/// Composes the pacemaker, report generation, transmission and certified
/// state into a single state machine that processes events and returns
/// actions.
pub struct OracleStateMachine {
    /// Network topology (single source of truth).
    topology: Arc<dyn Topology>,

    /// Epoch and leader selection.
    pacemaker: PacemakerState,

    /// Per-epoch rounds, leader and follower roles.
    reporting: ReportGenerationState,

    /// Gating and staggering of finalized reports.
    transmission: TransmissionState,

    /// Commit certificates and their carry-over across epochs.
    certified: CertifiedState,

    /// Bounds checked on every inbound message before routing.
    limits: MessageLimits,

    /// Current time.
    now: Duration,
}

impl std::fmt::Debug for OracleStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleStateMachine")
            .field("oracle", &self.topology.local_oracle_id())
            .field("epoch", &self.pacemaker.epoch())
            .field("leader", &self.pacemaker.leader())
            .field("now", &self.now)
            .finish()
    }
}

impl OracleStateMachine {
    /// Create a new oracle state machine.
    ///
    /// Fails if `config` is invalid for the oracle set or if `keys` are not
    /// the local oracle's keys in `topology`. Pass
    /// `RecoveredState::default()` for a fresh start.
    pub fn new(
        topology: Arc<dyn Topology>,
        keys: Arc<OracleKeys>,
        config: ProtocolConfig,
        recovered: RecoveredState,
    ) -> Result<Self, NodeConfigError> {
        config.validate(topology.n())?;
        if topology.f() != config.f {
            return Err(NodeConfigError::FaultToleranceMismatch {
                topology: topology.f(),
                config: config.f,
            });
        }

        let local = topology.local_oracle_id();
        if topology.offchain_public_key(local) != Some(keys.offchain.public_key()) {
            return Err(NodeConfigError::OffchainKeyMismatch(local));
        }
        if topology.onchain_public_key(local) != Some(keys.onchain.public_key()) {
            return Err(NodeConfigError::OnchainKeyMismatch(local));
        }

        let limits = config.message_limits(topology.n());
        let pacemaker = PacemakerState::new(topology.clone(), &config, recovered.pacemaker);
        let transmission =
            TransmissionState::new(topology.clone(), &config, recovered.pending_transmissions);
        let certified = CertifiedState::new(
            topology.clone(),
            keys.clone(),
            config.config_digest,
            recovered.highest_certified,
        );
        let reporting = ReportGenerationState::new(topology.clone(), keys, config);

        Ok(Self {
            topology,
            pacemaker,
            reporting,
            transmission,
            certified,
            limits,
            now: Duration::ZERO,
        })
    }

    /// Actions to run once at startup: arms the pacemaker, starts the first
    /// epoch and reschedules recovered transmissions.
    pub fn initialize(&mut self) -> Vec<Action> {
        let mut actions = self.pacemaker.initialize();
        actions.extend(self.transmission.initialize());
        actions
    }

    pub fn oracle_id(&self) -> OracleId {
        self.topology.local_oracle_id()
    }

    pub fn topology(&self) -> &Arc<dyn Topology> {
        &self.topology
    }

    pub fn pacemaker(&self) -> &PacemakerState {
        &self.pacemaker
    }

    pub fn reporting(&self) -> &ReportGenerationState {
        &self.reporting
    }

    pub fn transmission(&self) -> &TransmissionState {
        &self.transmission
    }

    pub fn certified(&self) -> &CertifiedState {
        &self.certified
    }

    fn route_message(&mut self, event: &Event) -> Option<Vec<Action>> {
        let Event::MessageReceived { sender, message } = event else {
            return None;
        };
        if !message.check_size(&self.limits) {
            warn!(
                sender = %sender,
                msg_type = message.type_name(),
                "Dropping oversize message"
            );
            return Some(vec![]);
        }
        match message.destination() {
            SubProtocol::Pacemaker => self.pacemaker.try_handle(event),
            SubProtocol::ReportGeneration => self.reporting.try_handle(event),
            SubProtocol::Certified => self.certified.try_handle(event),
        }
    }
}

impl StateMachine for OracleStateMachine {
    #[instrument(skip(self, event), fields(
        oracle = %self.topology.local_oracle_id(),
        epoch = self.pacemaker.epoch().0,
        event_type = ?std::mem::discriminant(&event)
    ))]
    fn handle(&mut self, event: Event) -> Vec<Action> {
        if let Some(actions) = self.route_message(&event) {
            return actions;
        }

        // Epoch starts and finalized reports concern more than one
        // sub-state machine; actions follow in composition order.
        let mut handled = false;
        let mut actions = Vec::new();
        let subs: [&mut dyn SubStateMachine; 4] = [
            &mut self.pacemaker,
            &mut self.reporting,
            &mut self.transmission,
            &mut self.certified,
        ];
        for sub in subs {
            if let Some(sub_actions) = sub.try_handle(&event) {
                handled = true;
                actions.extend(sub_actions);
            }
        }

        if !handled {
            warn!(?event, "Unhandled event");
        }
        actions
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
        self.pacemaker.set_time(now);
        self.reporting.set_time(now);
        self.transmission.set_time(now);
        self.certified.set_time(now);
    }

    fn now(&self) -> Duration {
        self.now
    }
}
