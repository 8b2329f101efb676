//! Event types for the deterministic state machine.

use crate::PluginError;
use attestor_messages::ProtocolMessage;
use attestor_types::{AttestedReportMany, Epoch, OracleId, ReportContext, Round};

/// Priority levels for event ordering within the same timestamp.
///
/// Events at the same simulation time are processed in priority order.
/// Lower values = higher priority (processed first).
///
/// This ensures causality is preserved: internal events (consequences of
/// processing an event) are handled before new external inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EventPriority {
    /// Internal events: consequences of prior event processing.
    /// Processed first to maintain causality.
    Internal = 0,

    /// Timer events: scheduled by the oracle itself.
    Timer = 1,

    /// Network events: external inputs from other oracles.
    Network = 2,
}

/// All possible events an oracle can receive.
///
/// Events are **passive data** - they describe something that happened.
/// The state machine processes events and returns actions.
#[derive(Debug, Clone)]
pub enum Event {
    // ═══════════════════════════════════════════════════════════════════════
    // Timers (priority: Timer)
    // ═══════════════════════════════════════════════════════════════════════
    /// No progress within `delta_progress`; the leader is suspected.
    ProgressTimer,

    /// Re-broadcast the pending `NewEpoch` wish.
    ResendTimer,

    /// Leader may start the next round.
    RoundTimer,

    /// Grace period for slow observations has ended.
    GraceTimer,

    /// This oracle's transmission slot for an accepted report has come.
    TransmissionTimer { epoch: Epoch, round: Round },

    // ═══════════════════════════════════════════════════════════════════════
    // Network Messages (priority: Network)
    // ═══════════════════════════════════════════════════════════════════════
    /// A decoded message from another oracle (or from ourselves, for
    /// broadcasts).
    ///
    /// The sender is authenticated by the transport.
    MessageReceived {
        sender: OracleId,
        message: ProtocolMessage,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Internal Events (priority: Internal)
    // These replace channel sends between sub-protocols
    // ═══════════════════════════════════════════════════════════════════════
    /// The current round produced output (a final report or a skip).
    Progress,

    /// The local oracle suspects the current leader.
    ChangeLeader,

    /// The pacemaker switched to a new epoch.
    EpochStarted { epoch: Epoch, leader: OracleId },

    /// A quorum-certified report was finalized and should be considered for
    /// transmission.
    ReportFinalized {
        ctx: ReportContext,
        report: AttestedReportMany,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Plugin Callbacks (priority: Internal)
    // Returned by the runner after executing an InvokePlugin action.
    // A deadline expiry is delivered as an error.
    // ═══════════════════════════════════════════════════════════════════════
    /// Result of `ReportingPlugin::query`.
    QueryCompleted {
        ctx: ReportContext,
        result: Result<Vec<u8>, PluginError>,
    },

    /// Result of `ReportingPlugin::observation`.
    ObservationCompleted {
        ctx: ReportContext,
        result: Result<Vec<u8>, PluginError>,
    },

    /// Result of `ReportingPlugin::report`. `None` means the plugin decided
    /// not to report this round.
    ReportCompleted {
        ctx: ReportContext,
        result: Result<Option<Vec<u8>>, PluginError>,
    },

    /// Result of `ReportingPlugin::should_accept_finalized_report`.
    ShouldAcceptCompleted {
        ctx: ReportContext,
        report: AttestedReportMany,
        result: Result<bool, PluginError>,
    },

    /// Result of `ReportingPlugin::should_transmit_accepted_report`.
    ShouldTransmitCompleted {
        ctx: ReportContext,
        report: AttestedReportMany,
        result: Result<bool, PluginError>,
    },
}

impl Event {
    /// Get the priority for this event type.
    ///
    /// Events at the same timestamp are processed in priority order,
    /// ensuring causality is preserved.
    pub fn priority(&self) -> EventPriority {
        match self {
            Event::Progress
            | Event::ChangeLeader
            | Event::EpochStarted { .. }
            | Event::ReportFinalized { .. }
            | Event::QueryCompleted { .. }
            | Event::ObservationCompleted { .. }
            | Event::ReportCompleted { .. }
            | Event::ShouldAcceptCompleted { .. }
            | Event::ShouldTransmitCompleted { .. } => EventPriority::Internal,

            Event::ProgressTimer
            | Event::ResendTimer
            | Event::RoundTimer
            | Event::GraceTimer
            | Event::TransmissionTimer { .. } => EventPriority::Timer,

            Event::MessageReceived { .. } => EventPriority::Network,
        }
    }

    /// Check if this is an internal event (consequence of prior processing).
    pub fn is_internal(&self) -> bool {
        self.priority() == EventPriority::Internal
    }

    /// Check if this is a network event (from another oracle).
    pub fn is_network(&self) -> bool {
        self.priority() == EventPriority::Network
    }

    /// Get the event type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            // Timers
            Event::ProgressTimer => "ProgressTimer",
            Event::ResendTimer => "ResendTimer",
            Event::RoundTimer => "RoundTimer",
            Event::GraceTimer => "GraceTimer",
            Event::TransmissionTimer { .. } => "TransmissionTimer",

            // Network
            Event::MessageReceived { .. } => "MessageReceived",

            // Internal
            Event::Progress => "Progress",
            Event::ChangeLeader => "ChangeLeader",
            Event::EpochStarted { .. } => "EpochStarted",
            Event::ReportFinalized { .. } => "ReportFinalized",

            // Plugin callbacks
            Event::QueryCompleted { .. } => "QueryCompleted",
            Event::ObservationCompleted { .. } => "ObservationCompleted",
            Event::ReportCompleted { .. } => "ReportCompleted",
            Event::ShouldAcceptCompleted { .. } => "ShouldAcceptCompleted",
            Event::ShouldTransmitCompleted { .. } => "ShouldTransmitCompleted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priorities_preserve_causality() {
        assert!(Event::Progress.priority() < Event::RoundTimer.priority());
        assert!(Event::GraceTimer.priority() < EventPriority::Network);
        assert!(Event::ChangeLeader.is_internal());
    }
}
