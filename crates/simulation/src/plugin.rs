//! Deterministic reporting plugin for simulations.

use attestor_core::{PluginError, ReportingPlugin};
use attestor_types::{AttestedReportMany, AttributedObservation, ReportContext};

/// A price-feed style plugin.
///
/// Each oracle observes `value + round` as a big-endian `u64`; the report is
/// the median of the observations. Knobs switch individual oracles into
/// faulty or reluctant behaviour.
#[derive(Debug, Clone)]
pub struct SimPlugin {
    value: u64,
    skip_reports: bool,
    fail_observations: bool,
    accept_finalized: bool,
}

impl SimPlugin {
    pub fn new(value: u64) -> Self {
        Self {
            value,
            skip_reports: false,
            fail_observations: false,
            accept_finalized: true,
        }
    }

    /// Answer every report request with "do not report".
    pub fn skipping_reports(mut self) -> Self {
        self.skip_reports = true;
        self
    }

    /// Fail every observation call.
    pub fn failing_observations(mut self) -> Self {
        self.fail_observations = true;
        self
    }

    /// Decline every finalized report, so nothing is transmitted.
    pub fn declining_finalized(mut self) -> Self {
        self.accept_finalized = false;
        self
    }

    /// Decode a report produced by this plugin.
    pub fn decode_report(report: &[u8]) -> Option<u64> {
        Some(u64::from_be_bytes(report.try_into().ok()?))
    }
}

impl ReportingPlugin for SimPlugin {
    fn query(&self, ctx: &ReportContext) -> Result<Vec<u8>, PluginError> {
        Ok(format!("price/{}/{}", ctx.epoch.0, ctx.round.0).into_bytes())
    }

    fn observation(&self, ctx: &ReportContext, _query: &[u8]) -> Result<Vec<u8>, PluginError> {
        if self.fail_observations {
            return Err(PluginError::Failed("price source unavailable".into()));
        }
        let value = self.value.wrapping_add(u64::from(ctx.round.0));
        Ok(value.to_be_bytes().to_vec())
    }

    fn report(
        &self,
        _ctx: &ReportContext,
        _query: &[u8],
        observations: &[AttributedObservation],
    ) -> Result<(bool, Vec<u8>), PluginError> {
        if self.skip_reports {
            return Ok((false, vec![]));
        }
        let mut values: Vec<u64> = observations
            .iter()
            .filter_map(|o| Self::decode_report(&o.observation))
            .collect();
        if values.is_empty() {
            return Err(PluginError::Failed("no decodable observations".into()));
        }
        values.sort_unstable();
        let median = values[values.len() / 2];
        Ok((true, median.to_be_bytes().to_vec()))
    }

    fn should_accept_finalized_report(
        &self,
        _ctx: &ReportContext,
        _report: &AttestedReportMany,
    ) -> Result<bool, PluginError> {
        Ok(self.accept_finalized)
    }

    fn should_transmit_accepted_report(
        &self,
        _ctx: &ReportContext,
        _report: &AttestedReportMany,
    ) -> Result<bool, PluginError> {
        Ok(true)
    }
}
