//! Transmission state machine.

use attestor_core::{
    Action, Event, PendingTransmission, PluginCall, PluginError, SubStateMachine, TimerId,
};
use attestor_types::{AttestedReportMany, Epoch, ProtocolConfig, ReportContext, Round, Topology};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Gates finalized reports through the plugin and schedules their
/// transmission.
pub struct TransmissionState {
    topology: Arc<dyn Topology>,
    delta_stage: Duration,
    max_pending: usize,

    /// Newest `(epoch, round)` accepted for transmission. Anything not newer
    /// is dropped.
    latest_accepted: Option<(Epoch, Round)>,

    /// Accepted reports waiting for their stage timer, oldest first.
    scheduled: BTreeMap<(Epoch, Round), PendingTransmission>,

    now: Duration,
}

impl std::fmt::Debug for TransmissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransmissionState")
            .field("oracle", &self.topology.local_oracle_id())
            .field("latest_accepted", &self.latest_accepted)
            .field("scheduled", &self.scheduled.len())
            .finish()
    }
}

impl TransmissionState {
    /// Create the transmission stage, holding `recovered` reports that were
    /// accepted but not yet handed on before a restart.
    pub fn new(
        topology: Arc<dyn Topology>,
        config: &ProtocolConfig,
        recovered: Vec<PendingTransmission>,
    ) -> Self {
        let scheduled: BTreeMap<_, _> = recovered
            .into_iter()
            .map(|pending| (pending.ctx.timestamp(), pending))
            .collect();
        Self {
            topology,
            delta_stage: config.delta_stage,
            max_pending: config.max_pending_transmissions,
            latest_accepted: scheduled.keys().next_back().copied(),
            scheduled,
            now: Duration::ZERO,
        }
    }

    /// Re-arm the stage timers of recovered reports.
    pub fn initialize(&mut self) -> Vec<Action> {
        if self.scheduled.is_empty() {
            return vec![];
        }
        info!(
            pending = self.scheduled.len(),
            latest = ?self.latest_accepted,
            "Rescheduling recovered transmissions"
        );
        let mut actions: Vec<Action> = self
            .scheduled
            .keys()
            .map(|&(epoch, round)| Action::SetTimer {
                id: TimerId::Transmission { epoch, round },
                duration: self.transmission_delay(round),
            })
            .collect();
        actions.extend(self.evict_over_budget());
        actions
    }

    pub fn latest_accepted(&self) -> Option<(Epoch, Round)> {
        self.latest_accepted
    }

    /// Number of accepted reports waiting for their slot.
    pub fn pending_count(&self) -> usize {
        self.scheduled.len()
    }

    /// How long this oracle waits before transmitting a report of `round`.
    ///
    /// Position `(index − round) mod n`: the oracle at position 0 goes first.
    pub fn transmission_delay(&self, round: Round) -> Duration {
        let n = self.topology.n();
        let index = self.topology.local_oracle_id().index();
        let position = (index + n - (round.0 as usize % n)) % n;
        self.delta_stage * position as u32
    }

    fn is_newer(&self, ctx: &ReportContext) -> bool {
        self.latest_accepted
            .map_or(true, |latest| ctx.timestamp() > latest)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Event handlers
    // ═══════════════════════════════════════════════════════════════════════════

    /// Report generation finalized a report.
    pub fn on_report_finalized(
        &mut self,
        ctx: ReportContext,
        report: AttestedReportMany,
    ) -> Vec<Action> {
        if !self.is_newer(&ctx) {
            debug!(%ctx, latest = ?self.latest_accepted, "Dropping finalized report that is not newer");
            return vec![];
        }
        vec![Action::InvokePlugin {
            call: PluginCall::ShouldAccept { ctx, report },
        }]
    }

    /// The plugin decided whether to accept a finalized report.
    pub fn on_should_accept_completed(
        &mut self,
        ctx: ReportContext,
        report: AttestedReportMany,
        result: Result<bool, PluginError>,
    ) -> Vec<Action> {
        match result {
            Ok(true) => {}
            Ok(false) => {
                debug!(%ctx, "Plugin declined finalized report");
                return vec![];
            }
            Err(e) => {
                warn!(%ctx, error = %e, "should_accept_finalized_report failed, dropping report");
                return vec![];
            }
        }
        // Another report may have been accepted while the plugin ran.
        if !self.is_newer(&ctx) {
            debug!(%ctx, latest = ?self.latest_accepted, "Accepted report superseded");
            return vec![];
        }

        let key = ctx.timestamp();
        self.latest_accepted = Some(key);
        let pending = PendingTransmission { ctx, report };
        self.scheduled.insert(key, pending.clone());

        let delay = self.transmission_delay(ctx.round);
        debug!(%ctx, delay = ?delay, "Scheduled transmission");
        let mut actions = vec![
            Action::PersistPendingTransmission {
                transmission: pending,
            },
            Action::SetTimer {
                id: TimerId::Transmission {
                    epoch: ctx.epoch,
                    round: ctx.round,
                },
                duration: delay,
            },
        ];
        actions.extend(self.evict_over_budget());
        actions
    }

    fn evict_over_budget(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        while self.scheduled.len() > self.max_pending {
            let Some(((epoch, round), evicted)) = self.scheduled.pop_first() else {
                break;
            };
            warn!(
                epoch = epoch.0,
                round = round.0,
                "Too many pending transmissions, evicting oldest"
            );
            actions.push(Action::CancelTimer {
                id: TimerId::Transmission { epoch, round },
            });
            actions.push(Action::DeletePendingTransmission { ctx: evicted.ctx });
        }
        actions
    }

    /// Our stage timer for `(epoch, round)` fired.
    pub fn on_transmission_timer(&mut self, epoch: Epoch, round: Round) -> Vec<Action> {
        let Some(pending) = self.scheduled.remove(&(epoch, round)) else {
            trace!(epoch = epoch.0, round = round.0, "No pending transmission for timer");
            return vec![];
        };
        vec![Action::InvokePlugin {
            call: PluginCall::ShouldTransmit {
                ctx: pending.ctx,
                report: pending.report,
            },
        }]
    }

    /// The plugin decided whether to transmit an accepted report.
    ///
    /// The report is done with either way and leaves storage.
    pub fn on_should_transmit_completed(
        &mut self,
        ctx: ReportContext,
        report: AttestedReportMany,
        result: Result<bool, PluginError>,
    ) -> Vec<Action> {
        let mut actions = Vec::with_capacity(2);
        match result {
            Ok(true) => {
                info!(%ctx, signers = report.attributed_signatures.len(), "Transmitting report");
                actions.push(Action::TransmitReport { ctx, report });
            }
            Ok(false) => {
                debug!(%ctx, "Plugin declined transmission");
            }
            Err(e) => {
                warn!(%ctx, error = %e, "should_transmit_accepted_report failed, not transmitting");
            }
        }
        actions.push(Action::DeletePendingTransmission { ctx });
        actions
    }
}

impl SubStateMachine for TransmissionState {
    fn try_handle(&mut self, event: &Event) -> Option<Vec<Action>> {
        match event {
            Event::ReportFinalized { ctx, report } => {
                Some(self.on_report_finalized(*ctx, report.clone()))
            }
            Event::ShouldAcceptCompleted {
                ctx,
                report,
                result,
            } => Some(self.on_should_accept_completed(*ctx, report.clone(), result.clone())),
            Event::TransmissionTimer { epoch, round } => {
                Some(self.on_transmission_timer(*epoch, *round))
            }
            Event::ShouldTransmitCompleted {
                ctx,
                report,
                result,
            } => Some(self.on_should_transmit_completed(*ctx, report.clone(), result.clone())),
            _ => None,
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }
}
