//! Action types for the deterministic state machine.

use crate::{Event, PacemakerSnapshot, PendingTransmission, PluginCall, TimerId};
use attestor_messages::ProtocolMessage;
use attestor_types::{AttestedReportMany, CertifiedPrepareOrCommit, OracleId, ReportContext};
use std::time::Duration;

/// Actions the state machine wants to perform.
///
/// Actions are **commands** - they describe something to do.
/// The runner executes actions and may convert results back into events.
#[derive(Debug, Clone)]
pub enum Action {
    // ═══════════════════════════════════════════════════════════════════════
    // Network
    // ═══════════════════════════════════════════════════════════════════════
    /// Send a message to every oracle, including ourselves.
    Broadcast { message: ProtocolMessage },

    /// Send a message to one oracle.
    SendTo {
        recipient: OracleId,
        message: ProtocolMessage,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// Set a timer to fire after a duration. Replaces a pending timer with
    /// the same id.
    SetTimer { id: TimerId, duration: Duration },

    /// Cancel a previously set timer.
    CancelTimer { id: TimerId },

    // ═══════════════════════════════════════════════════════════════════════
    // Internal (fed back as events with Internal priority)
    // ═══════════════════════════════════════════════════════════════════════
    /// Enqueue an internal event for immediate processing.
    ///
    /// Internal events are processed at the same timestamp with higher
    /// priority than external events, preserving causality.
    EnqueueInternal { event: Event },

    // ═══════════════════════════════════════════════════════════════════════
    // Delegated Work (returns callback event)
    // ═══════════════════════════════════════════════════════════════════════
    /// Invoke the reporting plugin.
    ///
    /// Runs under the call's deadline on a blocking pool in production,
    /// instantly in simulation. Returns the matching `*Completed` event.
    InvokePlugin { call: PluginCall },

    // ═══════════════════════════════════════════════════════════════════════
    // Storage
    // Applied before the actions that follow them in the same batch.
    // ═══════════════════════════════════════════════════════════════════════
    /// Persist the pacemaker's epoch and `NewEpoch` wish.
    ///
    /// Emitted before the `NewEpoch` broadcast that announces the wish, so a
    /// restarted oracle never asks for an older epoch than it already did.
    PersistPacemakerState { snapshot: PacemakerSnapshot },

    /// Persist a newly certified (or carried-over) highest certificate.
    PersistHighestCertified {
        certificate: CertifiedPrepareOrCommit,
    },

    /// Persist an accepted report awaiting its transmission slot.
    PersistPendingTransmission { transmission: PendingTransmission },

    /// Forget a pending transmission: it was handed on or evicted.
    DeletePendingTransmission { ctx: ReportContext },

    // ═══════════════════════════════════════════════════════════════════════
    // External
    // ═══════════════════════════════════════════════════════════════════════
    /// Hand a certified report to the contract transmitter.
    TransmitReport {
        ctx: ReportContext,
        report: AttestedReportMany,
    },
}

impl Action {
    /// Check if this action sends something over the network.
    pub fn is_network(&self) -> bool {
        matches!(self, Action::Broadcast { .. } | Action::SendTo { .. })
    }

    /// Check if this action writes to storage.
    pub fn is_storage_write(&self) -> bool {
        matches!(
            self,
            Action::PersistPacemakerState { .. }
                | Action::PersistHighestCertified { .. }
                | Action::PersistPendingTransmission { .. }
                | Action::DeletePendingTransmission { .. }
        )
    }

    /// Check if this action is delegated work (returns a callback).
    pub fn is_delegated(&self) -> bool {
        matches!(self, Action::InvokePlugin { .. })
    }

    /// Check if this is an internal event action.
    pub fn is_internal(&self) -> bool {
        matches!(self, Action::EnqueueInternal { .. })
    }

    /// Get the action type name for telemetry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Broadcast { .. } => "Broadcast",
            Action::SendTo { .. } => "SendTo",
            Action::SetTimer { .. } => "SetTimer",
            Action::CancelTimer { .. } => "CancelTimer",
            Action::EnqueueInternal { .. } => "EnqueueInternal",
            Action::InvokePlugin { .. } => "InvokePlugin",
            Action::PersistPacemakerState { .. } => "PersistPacemakerState",
            Action::PersistHighestCertified { .. } => "PersistHighestCertified",
            Action::PersistPendingTransmission { .. } => "PersistPendingTransmission",
            Action::DeletePendingTransmission { .. } => "DeletePendingTransmission",
            Action::TransmitReport { .. } => "TransmitReport",
        }
    }
}
