//! The reporting plugin capability and the calls the protocol makes into it.

use crate::Event;
use attestor_types::{AttestedReportMany, AttributedObservation, ProtocolConfig, ReportContext};
use std::time::Duration;
use thiserror::Error;

/// Errors from plugin calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("plugin call failed: {0}")]
    Failed(String),

    #[error("plugin call exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("plugin task aborted: {0}")]
    Aborted(String),
}

/// Application logic deciding what observations and reports contain.
///
/// Calls are synchronous; runners enforce the configured deadlines.
pub trait ReportingPlugin: Send + Sync {
    /// Produce the leader's query for a round.
    fn query(&self, ctx: &ReportContext) -> Result<Vec<u8>, PluginError>;

    /// Produce this oracle's observation for `query`.
    fn observation(&self, ctx: &ReportContext, query: &[u8]) -> Result<Vec<u8>, PluginError>;

    /// Turn validated observations into a report.
    ///
    /// Returns `(should_report, report)`.
    fn report(
        &self,
        ctx: &ReportContext,
        query: &[u8],
        observations: &[AttributedObservation],
    ) -> Result<(bool, Vec<u8>), PluginError>;

    /// Decide whether a finalized report should be accepted for transmission.
    fn should_accept_finalized_report(
        &self,
        ctx: &ReportContext,
        report: &AttestedReportMany,
    ) -> Result<bool, PluginError>;

    /// Decide, at transmission time, whether an accepted report should still
    /// be sent.
    fn should_transmit_accepted_report(
        &self,
        ctx: &ReportContext,
        report: &AttestedReportMany,
    ) -> Result<bool, PluginError>;
}

/// One delegated plugin invocation.
///
/// Emitted inside `Action::InvokePlugin`; the runner executes it and feeds the
/// callback event back into the state machine.
#[derive(Debug, Clone)]
pub enum PluginCall {
    Query {
        ctx: ReportContext,
    },
    Observation {
        ctx: ReportContext,
        query: Vec<u8>,
    },
    Report {
        ctx: ReportContext,
        query: Vec<u8>,
        observations: Vec<AttributedObservation>,
    },
    ShouldAccept {
        ctx: ReportContext,
        report: AttestedReportMany,
    },
    ShouldTransmit {
        ctx: ReportContext,
        report: AttestedReportMany,
    },
}

impl PluginCall {
    /// Run the call against `plugin` and wrap the result in its callback event.
    pub fn execute(self, plugin: &dyn ReportingPlugin) -> Event {
        match self {
            PluginCall::Query { ctx } => {
                let result = plugin.query(&ctx);
                Event::QueryCompleted { ctx, result }
            }
            PluginCall::Observation { ctx, query } => {
                let result = plugin.observation(&ctx, &query);
                Event::ObservationCompleted { ctx, result }
            }
            PluginCall::Report {
                ctx,
                query,
                observations,
            } => {
                let result = plugin
                    .report(&ctx, &query, &observations)
                    .map(|(should_report, report)| should_report.then_some(report));
                Event::ReportCompleted { ctx, result }
            }
            PluginCall::ShouldAccept { ctx, report } => {
                let result = plugin.should_accept_finalized_report(&ctx, &report);
                Event::ShouldAcceptCompleted {
                    ctx,
                    report,
                    result,
                }
            }
            PluginCall::ShouldTransmit { ctx, report } => {
                let result = plugin.should_transmit_accepted_report(&ctx, &report);
                Event::ShouldTransmitCompleted {
                    ctx,
                    report,
                    result,
                }
            }
        }
    }

    /// The callback event reporting that this call failed with `error`.
    pub fn failed(self, error: PluginError) -> Event {
        match self {
            PluginCall::Query { ctx } => Event::QueryCompleted {
                ctx,
                result: Err(error),
            },
            PluginCall::Observation { ctx, .. } => Event::ObservationCompleted {
                ctx,
                result: Err(error),
            },
            PluginCall::Report { ctx, .. } => Event::ReportCompleted {
                ctx,
                result: Err(error),
            },
            PluginCall::ShouldAccept { ctx, report } => Event::ShouldAcceptCompleted {
                ctx,
                report,
                result: Err(error),
            },
            PluginCall::ShouldTransmit { ctx, report } => Event::ShouldTransmitCompleted {
                ctx,
                report,
                result: Err(error),
            },
        }
    }

    /// The configured deadline for this kind of call.
    pub fn deadline(&self, config: &ProtocolConfig) -> Duration {
        match self {
            PluginCall::Query { .. } => config.max_duration_query,
            PluginCall::Observation { .. } => config.max_duration_observation,
            PluginCall::Report { .. } => config.max_duration_report,
            PluginCall::ShouldAccept { .. } => config.max_duration_should_accept,
            PluginCall::ShouldTransmit { .. } => config.max_duration_should_transmit,
        }
    }

    pub fn ctx(&self) -> &ReportContext {
        match self {
            PluginCall::Query { ctx }
            | PluginCall::Observation { ctx, .. }
            | PluginCall::Report { ctx, .. }
            | PluginCall::ShouldAccept { ctx, .. }
            | PluginCall::ShouldTransmit { ctx, .. } => ctx,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PluginCall::Query { .. } => "query",
            PluginCall::Observation { .. } => "observation",
            PluginCall::Report { .. } => "report",
            PluginCall::ShouldAccept { .. } => "should_accept_finalized_report",
            PluginCall::ShouldTransmit { .. } => "should_transmit_accepted_report",
        }
    }
}
